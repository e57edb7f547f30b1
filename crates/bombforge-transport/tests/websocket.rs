//! Integration tests for the WebSocket transport.
//!
//! These spin up a real listener on an OS-assigned port and talk to it
//! with a plain `tokio-tungstenite` client.

#[cfg(feature = "websocket")]
mod websocket {
    use bombforge_transport::{Connection, Transport, WebSocketConnection, WebSocketTransport};
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;

    type ClientWs = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    /// Binds a transport, connects a client to `path`, and returns both ends.
    async fn pair(path: &str) -> (WebSocketConnection, ClientWs) {
        let transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        pair_on(transport, path).await
    }

    async fn pair_on(
        mut transport: WebSocketTransport,
        path: &str,
    ) -> (WebSocketConnection, ClientWs) {
        let addr = transport.local_addr().expect("local addr");

        let server = tokio::spawn(async move { transport.accept().await.expect("should accept") });

        let (client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}{path}"))
            .await
            .expect("client should connect");
        let conn = server.await.expect("accept task");
        (conn, client)
    }

    #[tokio::test]
    async fn test_websocket_send_receive_both_ways() {
        let (conn, mut client) = pair("/").await;
        assert!(conn.id().into_inner() > 0);

        conn.send(br#"{"type":"pong"}"#).await.expect("send");
        let msg = client.next().await.unwrap().unwrap();
        assert!(msg.is_text(), "JSON payloads go out as text frames");
        assert_eq!(msg.into_data().as_ref(), br#"{"type":"pong"}"#);

        client
            .send(Message::text(r#"{"type":"ping"}"#))
            .await
            .unwrap();
        let received = conn.recv().await.expect("recv").expect("data");
        assert_eq!(received, br#"{"type":"ping"}"#);

        conn.close().await.expect("close");
    }

    #[tokio::test]
    async fn test_websocket_captures_join_query() {
        let (conn, _client) = pair("/ws?name=ada&room=lobby").await;
        assert_eq!(conn.query(), "name=ada&room=lobby");
    }

    #[tokio::test]
    async fn test_websocket_query_empty_without_params() {
        let (conn, _client) = pair("/ws").await;
        assert_eq!(conn.query(), "");
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_client_close() {
        let (conn, mut client) = pair("/").await;
        client.send(Message::Close(None)).await.unwrap();

        let result = conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on client close");
    }

    #[tokio::test]
    async fn test_websocket_send_not_blocked_by_pending_recv() {
        use std::sync::Arc;
        use std::time::Duration;

        let (conn, mut client) = pair("/").await;
        let conn = Arc::new(conn);

        let reader = Arc::clone(&conn);
        let pending = tokio::spawn(async move { reader.recv().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(1), conn.send(b"tick"))
            .await
            .expect("send must not wait for the receiver")
            .expect("send");
        let msg = client.next().await.unwrap().unwrap();
        assert_eq!(msg.into_data().as_ref(), b"tick");

        client.send(Message::Close(None)).await.unwrap();
        let _ = pending.await;
    }

    #[tokio::test]
    async fn test_websocket_oversized_message_drops_the_client() {
        use std::time::Duration;

        let transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind")
            .with_max_message_size(64);
        let (conn, mut client) = pair_on(transport, "/").await;

        client.send(Message::text("x".repeat(32))).await.unwrap();
        assert_eq!(conn.recv().await.expect("recv").expect("data").len(), 32);

        // The client may already see the socket go away while sending.
        let _ = client.send(Message::text("x".repeat(1024))).await;
        assert!(conn.recv().await.is_err(), "oversized message is refused");
        drop(conn);

        let closed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match client.next().await {
                    None | Some(Err(_)) => return,
                    Some(Ok(msg)) if msg.is_close() => return,
                    Some(Ok(_)) => continue,
                }
            }
        })
        .await;
        assert!(closed.is_ok(), "client should see the connection close");
    }

    #[test]
    fn test_default_message_limit_is_small() {
        assert_eq!(bombforge_transport::DEFAULT_MAX_MESSAGE_SIZE, 512);
    }
}
