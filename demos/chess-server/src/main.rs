use castle::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

/// Trusts tokens of the form `<id>:<name>`. Development only: anyone can
/// claim any id.
struct DevAuth;

impl Authenticator for DevAuth {
    async fn authenticate(&self, token: &str) -> Result<Identity, SessionError> {
        let (id, name) = token
            .split_once(':')
            .ok_or_else(|| SessionError::AuthFailed("token must look like <id>:<name>".into()))?;
        let id: i64 = id
            .parse()
            .map_err(|_| SessionError::AuthFailed("id must be a number".into()))?;
        if name.is_empty() {
            return Err(SessionError::AuthFailed("name must not be empty".into()));
        }
        Ok(Identity::new(UserId(id), name))
    }
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::default().with_env()?;
    info!(bind = %config.bind, db = %config.db_path.display(), "starting chess server");

    let server = CastleServerBuilder::new().config(config).build(DevAuth).await?;
    let handle = server.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            handle.shutdown();
        }
    });

    server.run().await?;
    Ok(())
}
