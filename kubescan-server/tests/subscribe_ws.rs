mod common;

use std::{net::SocketAddr, time::Duration};

use axum::{Router, http::StatusCode};
use common::{IMAGE, REPORT, payload, put_request, setup};
use futures_util::{SinkExt, StreamExt};
use kubescan_core::Services;
use tokio::{
    net::{TcpListener, TcpStream},
    time::{sleep, timeout},
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tower::ServiceExt;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    addr
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _) = connect_async(format!("ws://{addr}/subscribe")).await.unwrap();
    client
}

async fn wait_for_subscribers(services: &Services, expected: usize) {
    let settled = timeout(Duration::from_secs(2), async {
        while services.hub.subscriber_count() != expected {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(
        settled.is_ok(),
        "expected {expected} subscribers, found {}",
        services.hub.subscriber_count()
    );
}

async fn next_text(client: &mut Client) -> String {
    loop {
        let frame = timeout(Duration::from_secs(2), client.next())
            .await
            .expect("no frame within 2s")
            .expect("socket closed")
            .expect("socket error");
        match frame {
            Message::Text(text) => return text.as_str().to_string(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

#[tokio::test]
async fn stored_image_ids_arrive_as_json_strings() {
    let (app, services) = setup().await;
    let addr = serve(app.clone()).await;
    let mut client = connect(addr).await;
    wait_for_subscribers(&services, 1).await;

    // Client frames carry no meaning and must not disturb delivery
    client.send(Message::text("hello")).await.unwrap();

    let response = app.clone().oneshot(put_request(payload(IMAGE, REPORT))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(next_text(&mut client).await, format!("\"{IMAGE}\""));

    let quoted = r#"registry.local/odd"name@sha256:01"#;
    let response = app.oneshot(put_request(payload(quoted, REPORT))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let frame = next_text(&mut client).await;
    assert_eq!(frame, r#""registry.local/odd\"name@sha256:01""#);
    assert_eq!(serde_json::from_str::<String>(&frame).unwrap(), quoted);
}

#[tokio::test]
async fn close_frame_ends_subscription() {
    let (app, services) = setup().await;
    let addr = serve(app).await;

    let mut client = connect(addr).await;
    wait_for_subscribers(&services, 1).await;

    client.close(None).await.unwrap();
    wait_for_subscribers(&services, 0).await;
}

#[tokio::test]
async fn dropped_connection_ends_subscription() {
    let (app, services) = setup().await;
    let addr = serve(app).await;

    let first = connect(addr).await;
    let mut second = connect(addr).await;
    wait_for_subscribers(&services, 2).await;

    drop(first);
    wait_for_subscribers(&services, 1).await;

    // The remaining subscriber still receives announcements
    services.scans.submit_report(IMAGE, REPORT).await.unwrap();
    assert_eq!(next_text(&mut second).await, format!("\"{IMAGE}\""));
}
