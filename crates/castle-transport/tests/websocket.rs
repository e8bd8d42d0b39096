//! Integration tests for the WebSocket transport.
//!
//! A real listener on an OS-assigned port and a real tungstenite client,
//! checking that frames flow both ways through the split read/write halves.

#[cfg(feature = "websocket")]
mod websocket {
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;

    use castle_transport::{Connection, Transport, WebSocketConnection, WebSocketTransport};

    type ClientWs = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn pair() -> (WebSocketConnection, ClientWs) {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("bound address");

        let server = tokio::spawn(async move { transport.accept().await.expect("should accept") });
        let (client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client should connect");
        let conn = server.await.expect("accept task");
        (conn, client)
    }

    #[tokio::test]
    async fn test_client_text_arrives_as_bytes() {
        let (mut conn, mut client) = pair().await;

        client
            .send(Message::Text(r#"{"type":"resign"}"#.into()))
            .await
            .unwrap();

        let data = conn.recv().await.unwrap().expect("a frame");
        assert_eq!(data, br#"{"type":"resign"}"#.to_vec());
    }

    #[tokio::test]
    async fn test_outbound_frames_reach_client_in_order() {
        let (conn, mut client) = pair().await;
        let link = conn.outbound();

        assert!(link.send(b"first".to_vec()));
        assert!(link.send(b"second".to_vec()));

        let first = client.next().await.unwrap().unwrap();
        let second = client.next().await.unwrap().unwrap();
        assert_eq!(first.into_text().unwrap().as_str(), "first");
        assert_eq!(second.into_text().unwrap().as_str(), "second");
    }

    #[tokio::test]
    async fn test_outbound_close_ends_client_stream() {
        let (conn, mut client) = pair().await;
        let link = conn.outbound();
        link.send(b"bye".to_vec());
        link.close();

        let msg = client.next().await.unwrap().unwrap();
        assert_eq!(msg.into_text().unwrap().as_str(), "bye");
        // Either a close frame or the end of the stream follows.
        match client.next().await {
            Some(Ok(Message::Close(_))) | None => {}
            other => panic!("expected close, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_client_close_yields_none() {
        let (mut conn, mut client) = pair().await;
        client.close(None).await.unwrap();
        assert!(conn.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_connection_ids_are_unique() {
        let (a, _ca) = pair().await;
        let (b, _cb) = pair().await;
        assert_ne!(a.id(), b.id());
    }
}
