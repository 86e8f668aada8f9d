//! Integration tests for the WebSocket transport.
//!
//! These spin up real listeners on loopback and verify that two
//! endpoints can find each other by identity and exchange payloads.

#[cfg(feature = "websocket")]
mod websocket {
    use std::time::Duration;

    use duel_transport::{LinkEvent, OpenOptions, PeerId, Transport, TransportError, WebSocketTransport};

    #[tokio::test]
    async fn test_websocket_open_accept_and_exchange() {
        let host = WebSocketTransport::new("127.0.0.1:0");
        let guest = WebSocketTransport::new("127.0.0.1:0");
        let mut host_ep = host.bind().await.expect("host should bind");
        let guest_ep = guest.bind().await.expect("guest should bind");

        let mut outbound = guest
            .open(&host_ep.local_id, OpenOptions::default())
            .await
            .expect("guest should connect");
        let mut inbound = tokio::time::timeout(Duration::from_secs(5), host_ep.incoming.recv())
            .await
            .expect("host should accept in time")
            .expect("endpoint open");

        // The acceptor learns the dialer's identity from the hello frame.
        assert_eq!(inbound.remote(), &guest_ep.local_id);
        assert_eq!(outbound.remote(), &host_ep.local_id);

        outbound.send(br#"{"type":"ping"}"#.to_vec()).unwrap();
        assert_eq!(inbound.recv().await, LinkEvent::Data(br#"{"type":"ping"}"#.to_vec()));

        inbound.send(br#"{"type":"pong"}"#.to_vec()).unwrap();
        assert_eq!(outbound.recv().await, LinkEvent::Data(br#"{"type":"pong"}"#.to_vec()));

        // Dropping one end closes the other.
        outbound.close();
        let event = tokio::time::timeout(Duration::from_secs(5), inbound.recv())
            .await
            .expect("close should propagate");
        assert!(event.is_terminal());
    }

    #[tokio::test]
    async fn test_websocket_open_before_bind_fails() {
        let transport = WebSocketTransport::new("127.0.0.1:0");
        let err = transport
            .open(&PeerId::new("127.0.0.1:1"), OpenOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NotBound));
    }

    #[tokio::test]
    async fn test_websocket_open_to_dead_address_fails() {
        // Grab a free port, then release it so nothing listens there.
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let transport = WebSocketTransport::new("127.0.0.1:0");
        transport.bind().await.unwrap();

        let err = transport
            .open(&PeerId::new(format!("127.0.0.1:{port}")), OpenOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::ConnectFailed { .. }));
    }

    #[tokio::test]
    async fn test_websocket_bind_twice_fails() {
        let transport = WebSocketTransport::new("127.0.0.1:0");
        transport.bind().await.unwrap();
        assert!(matches!(
            transport.bind().await.unwrap_err(),
            TransportError::AlreadyBound
        ));
    }

    #[tokio::test]
    async fn test_websocket_socket_without_hello_is_dropped() {
        use futures_util::SinkExt;
        use tokio_tungstenite::tungstenite::Message;

        let host = WebSocketTransport::new("127.0.0.1:0");
        let mut ep = host.bind().await.unwrap();

        let url = format!("ws://{}", ep.local_id);
        let (mut raw, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        raw.send(Message::Text("who dis".into())).await.unwrap();

        let accepted = tokio::time::timeout(Duration::from_millis(500), ep.incoming.recv()).await;
        assert!(accepted.is_err(), "socket without hello must not become a link");
    }
}
