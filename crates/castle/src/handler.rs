//! Per-connection handler: hello, authentication, and forwarding.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive `Hello` → validate version
//!   2. Authenticate the token, if any
//!   3. Defer `on_open` to the reactor
//!   4. Loop: decode client messages → defer `on_message`
//!   5. On exit (including panic): defer `on_close`
//!
//! The handler never touches session state itself.

use std::sync::Arc;
use std::time::Duration;

use castle_exec::{CancelFlag, LoopMarshaler};
use castle_protocol::{ClientMessage, Codec, Hello, JsonCodec, PROTOCOL_VERSION, ProtocolError, ServerMessage};
use castle_session::Authenticator;
use castle_transport::{Connection, ConnectionId, Outbound, WebSocketConnection};
use tracing::{debug, info};

use crate::CastleError;
use crate::context::{Admission, Context};
use crate::error::code;

/// What every connection task needs, shared behind an `Arc`.
pub(crate) struct Shared<A: Authenticator> {
    pub(crate) auth: A,
    pub(crate) codec: JsonCodec,
    pub(crate) marshal: LoopMarshaler<Context>,
    pub(crate) handshake_timeout: Duration,
}

/// Drop guard that tells the reactor the connection is gone.
///
/// Runs on every exit path, panics included, so the reactor always sees
/// an `on_close` for a connection it saw an `on_open` for.
struct CloseGuard {
    conn: ConnectionId,
    cancel: CancelFlag,
    marshal: LoopMarshaler<Context>,
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.cancel.cancel();
        let conn = self.conn;
        self.marshal.defer(move |ctx: &mut Context| ctx.on_close(conn));
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A: Authenticator>(
    mut conn: WebSocketConnection,
    shared: Arc<Shared<A>>,
) -> Result<(), CastleError> {
    let conn_id = conn.id();
    debug!(%conn_id, "handling new connection");

    let admission = perform_hello(&mut conn, &shared).await?;

    let cancel = CancelFlag::new();
    let link = conn.outbound();
    let flag = cancel.clone();
    if !shared
        .marshal
        .defer(move |ctx: &mut Context| ctx.on_open(link, admission, flag))
    {
        conn.outbound().close();
        return Err(CastleError::ReactorStopped);
    }
    let _guard = CloseGuard {
        conn: conn_id,
        cancel,
        marshal: shared.marshal.clone(),
    };

    loop {
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                debug!(%conn_id, "connection closed cleanly");
                break;
            }
            Err(e) => {
                debug!(%conn_id, error = %e, "recv error");
                break;
            }
        };

        let message: ClientMessage = match shared.codec.decode(&data) {
            Ok(message) => message,
            Err(e) => {
                debug!(%conn_id, error = %e, "failed to decode client message");
                send_error(&conn.outbound(), &shared.codec, code::BAD_REQUEST, "malformed message");
                continue;
            }
        };
        if !shared
            .marshal
            .defer(move |ctx: &mut Context| ctx.on_message(conn_id, message))
        {
            break;
        }
    }

    // _guard drops here → on_close is deferred.
    Ok(())
}

/// Reads the `Hello`, checks the version, and authenticates.
///
/// Any failure is answered with an error frame and the connection closed.
async fn perform_hello<A: Authenticator>(
    conn: &mut WebSocketConnection,
    shared: &Shared<A>,
) -> Result<Admission, CastleError> {
    let out = conn.outbound();
    let data = match tokio::time::timeout(shared.handshake_timeout, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::NoHello("connection closed".into()).into());
        }
        Ok(Err(e)) => {
            return Err(ProtocolError::NoHello(format!("recv failed: {e}")).into());
        }
        Err(_) => {
            refuse(&out, &shared.codec, code::BAD_REQUEST, "hello timed out");
            return Err(ProtocolError::NoHello("timed out".into()).into());
        }
    };

    let hello: Hello = match shared.codec.decode(&data) {
        Ok(hello) => hello,
        Err(e) => {
            refuse(&out, &shared.codec, code::BAD_REQUEST, "expected hello");
            return Err(e.into());
        }
    };

    let version = hello.version();
    if version != PROTOCOL_VERSION {
        let err = ProtocolError::VersionMismatch {
            expected: PROTOCOL_VERSION,
            got: version,
        };
        refuse(&out, &shared.codec, code::BAD_REQUEST, &err.to_string());
        return Err(err.into());
    }

    let admission = match hello {
        Hello::Play { token, queue, .. } => {
            let identity = match token {
                Some(token) => match shared.auth.authenticate(&token).await {
                    Ok(identity) => Some(identity),
                    Err(e) => {
                        refuse(&out, &shared.codec, code::UNAUTHORIZED, &e.to_string());
                        return Err(e.into());
                    }
                },
                None => None,
            };
            info!(
                conn_id = %conn.id(),
                user_id = ?identity.as_ref().map(|i| i.user_id),
                %queue,
                "player connected"
            );
            Admission::Play { identity, queue }
        }
        Hello::Watch { game_id, .. } => Admission::Watch { game_id },
        Hello::Browse { .. } => Admission::Browse,
    };
    Ok(admission)
}

fn send_error(out: &Outbound, codec: &JsonCodec, code: u16, message: &str) {
    if let Ok(bytes) = codec.encode(&ServerMessage::error(code, message)) {
        out.send(bytes);
    }
}

fn refuse(out: &Outbound, codec: &JsonCodec, code: u16, message: &str) {
    send_error(out, codec, code, message);
    out.close();
}
