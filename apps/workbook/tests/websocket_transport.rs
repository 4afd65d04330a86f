mod support;

use futures_util::{SinkExt, StreamExt};
use support::{accept, bind, event_channel, next_envelope, next_event, send_envelope};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use url::Url;
use workbook_client_core::protocol::{Category, Envelope};
use workbook_client_core::transport::websocket::{WebSocketOptions, WebSocketTransport};
use workbook_client_core::transport::{LinkState, Transport, TransportError, TransportEvent};

#[tokio::test]
async fn frames_keep_order_and_malformed_input_is_skipped() {
    let (listener, url) = bind().await;
    let server = tokio::spawn(async move {
        let mut socket = accept(&listener).await;
        let mut received = Vec::new();
        for _ in 0..3 {
            received.push(next_envelope(&mut socket).await.expect("envelope"));
        }
        send_envelope(&mut socket, "stdout", "one\n").await;
        socket
            .send(Message::Text("not an envelope".into()))
            .await
            .expect("raw send");
        send_envelope(&mut socket, "stderr", "two").await;
        socket.close(None).await.expect("close");
        received
    });

    let (events, mut rx) = event_channel();
    let transport = WebSocketTransport::open(&url, &WebSocketOptions::default(), events);
    assert!(matches!(
        transport.send(&Envelope::code("early")),
        Err(TransportError::SendFailed(LinkState::Pending))
    ));

    assert_eq!(next_event(&mut rx).await, TransportEvent::Ready);
    assert_eq!(transport.state(), LinkState::Ready);
    transport.send(&Envelope::code("a")).expect("send a");
    transport.send(&Envelope::code("b")).expect("send b");
    transport.send(&Envelope::program_eof()).expect("send eof");

    assert_eq!(
        next_event(&mut rx).await,
        TransportEvent::Message(Envelope::new(Category::Stdout, "one\n"))
    );
    assert!(matches!(
        next_event(&mut rx).await,
        TransportEvent::Malformed { .. }
    ));
    assert_eq!(
        next_event(&mut rx).await,
        TransportEvent::Message(Envelope::new(Category::Stderr, "two"))
    );
    assert!(matches!(
        next_event(&mut rx).await,
        TransportEvent::Closed { .. }
    ));
    assert_eq!(transport.state(), LinkState::Closed);

    let received = server.await.expect("server");
    assert_eq!(
        received,
        vec![
            ("code".to_string(), "a".to_string()),
            ("code".to_string(), "b".to_string()),
            ("EOF".to_string(), "program".to_string()),
        ]
    );
}

#[tokio::test]
async fn refused_connection_reports_connect_failed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    let url = Url::parse(&format!("ws://{addr}/echo")).expect("url");

    let (events, mut rx) = event_channel();
    let transport = WebSocketTransport::open(&url, &WebSocketOptions::default(), events);
    assert!(matches!(
        next_event(&mut rx).await,
        TransportEvent::ConnectFailed { .. }
    ));
    assert_eq!(transport.state(), LinkState::Closed);
    assert!(transport.send(&Envelope::stdin("x")).is_err());
}

#[tokio::test]
async fn local_close_finishes_the_handshake() {
    let (listener, url) = bind().await;
    let server = tokio::spawn(async move {
        let mut socket = accept(&listener).await;
        let mut frames = 0;
        while let Some(Ok(_)) = socket.next().await {
            frames += 1;
        }
        frames
    });

    let (events, mut rx) = event_channel();
    let transport = WebSocketTransport::open(&url, &WebSocketOptions::default(), events);
    assert_eq!(next_event(&mut rx).await, TransportEvent::Ready);

    transport.send(&Envelope::stdin_eof()).expect("send");
    transport.close();
    transport.close();
    assert_eq!(transport.state(), LinkState::Closing);
    assert!(transport.send(&Envelope::stdin("late")).is_err());

    assert!(matches!(
        next_event(&mut rx).await,
        TransportEvent::Closed { .. }
    ));
    assert!(server.await.expect("server") >= 1);
}

#[tokio::test]
async fn closing_before_connect_abandons_the_attempt() {
    let (_listener, url) = bind().await;
    let (events, mut rx) = event_channel();
    let transport = WebSocketTransport::open(&url, &WebSocketOptions::default(), events);
    transport.close();
    assert_eq!(transport.state(), LinkState::Closed);
    assert!(matches!(
        next_event(&mut rx).await,
        TransportEvent::Closed { .. }
    ));
}
