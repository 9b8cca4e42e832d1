//! Integration tests for the WebSocket client transport.
//!
//! Each test binds a throwaway `tokio-tungstenite` server on an
//! OS-assigned port, connects the client transport to it, and checks that
//! binary frames flow both ways.

#[cfg(feature = "websocket")]
mod websocket {
    use futures_util::{SinkExt, StreamExt};
    use terra_transport::{
        Connection, Connector, TransportError, WebSocketConnector,
    };
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    type ServerWs = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    /// Binds a listener on a random port and returns it with its `ws://` URL.
    async fn bind_server() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = listener.local_addr().expect("should have addr");
        (listener, format!("ws://{addr}"))
    }

    async fn accept(listener: &TcpListener) -> ServerWs {
        let (stream, _) = listener.accept().await.expect("should accept");
        tokio_tungstenite::accept_async(stream)
            .await
            .expect("handshake should succeed")
    }

    #[tokio::test]
    async fn test_websocket_connect_and_send_receive() {
        let (listener, url) = bind_server().await;
        let server = tokio::spawn(async move { accept(&listener).await });

        let conn = WebSocketConnector
            .connect(&url)
            .await
            .expect("client should connect");
        let mut server_ws = server.await.expect("task should complete");

        assert!(conn.id().into_inner() > 0);

        // --- Client sends, server receives ---
        conn.send(&[0x1a, 0x20, 0xd0, 0x00, 0x18])
            .await
            .expect("send should succeed");
        let msg = server_ws.next().await.unwrap().unwrap();
        assert_eq!(msg.into_data().as_ref(), &[0x1a, 0x20, 0xd0, 0x00, 0x18]);

        // --- Server sends, client receives ---
        server_ws
            .send(Message::Binary(vec![0x80, 0x06].into()))
            .await
            .unwrap();
        let received = conn
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have data");
        assert_eq!(received, vec![0x80, 0x06]);

        conn.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_server_close() {
        let (listener, url) = bind_server().await;
        let server = tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            ws.send(Message::Close(None)).await.unwrap();
        });

        let conn = WebSocketConnector.connect(&url).await.unwrap();
        server.await.unwrap();

        let result = conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on server close");
    }

    #[tokio::test]
    async fn test_websocket_text_frame_is_rejected() {
        let (listener, url) = bind_server().await;
        let server = tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            ws.send(Message::Text("hello".into())).await.unwrap();
            ws
        });

        let conn = WebSocketConnector.connect(&url).await.unwrap();
        let _server_ws = server.await.unwrap();

        let result = conn.recv().await;
        assert!(matches!(result, Err(TransportError::UnexpectedFrame("text"))));
    }

    #[tokio::test]
    async fn test_websocket_connect_failure_reports_url() {
        // Bind then drop so the port is almost certainly closed.
        let (listener, url) = bind_server().await;
        drop(listener);

        let err = WebSocketConnector
            .connect(&url)
            .await
            .err()
            .expect("connect should fail");
        assert!(matches!(err, TransportError::ConnectFailed { .. }));
        assert!(err.to_string().contains(&url));
    }

    #[cfg(feature = "tls")]
    #[tokio::test]
    async fn test_wss_handshake_failure_is_an_error() {
        // A plain TCP peer that hangs up cannot complete a TLS handshake.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("wss://{}/", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let err = WebSocketConnector
            .connect(&url)
            .await
            .err()
            .expect("TLS handshake should fail");
        server.await.unwrap();
        assert!(matches!(err, TransportError::ConnectFailed { .. }));
        assert!(err.to_string().contains(&url));
    }
}
