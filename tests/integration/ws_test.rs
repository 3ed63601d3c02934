//! End-to-end WebSocket tests against a bound server.

mod helpers;

use std::time::Duration;

use futures::SinkExt;
use serde_json::json;

use billhub_core::types::id::{BookingId, UserId};
use billhub_entity::booking::Booking;
use billhub_entity::message::Message;

use helpers::{TestApp, expect_silence, next_event, send_event, wait_until};

#[tokio::test]
async fn test_message_reaches_all_receiver_devices() {
    let app = TestApp::new();
    let addr = app.spawn().await;
    let (alice, bob) = (UserId::new(), UserId::new());

    let mut a = app.connect(addr, alice).await;
    let mut b1 = app.connect(addr, bob).await;
    let mut b2 = app.connect(addr, bob).await;
    app.wait_for_connections(3).await;

    send_event(
        &mut a,
        "message:send",
        json!({ "receiverId": bob, "content": "Is the Main St. board free in May?" }),
    )
    .await;

    let mut ids = Vec::new();
    for client in [&mut b1, &mut b2] {
        let new = next_event(client).await;
        assert_eq!(new["event"], "message:new");
        let message: Message = serde_json::from_value(new["data"].clone()).unwrap();
        assert_eq!(message.sender_id, alice);
        assert!(!message.is_read);
        ids.push(message.id);

        let count = next_event(client).await;
        assert_eq!(count, json!({ "event": "unread:count", "data": { "count": 1 } }));
    }
    assert_eq!(ids[0], ids[1]);

    let ack = next_event(&mut a).await;
    assert_eq!(ack["event"], "message:sent");
    assert_eq!(ack["data"]["id"], json!(ids[0]));
}

#[tokio::test]
async fn test_conversation_read_resets_unread_count() {
    let app = TestApp::new();
    let addr = app.spawn().await;
    let (alice, bob) = (UserId::new(), UserId::new());

    let mut a = app.connect(addr, alice).await;
    let mut b = app.connect(addr, bob).await;
    app.wait_for_connections(2).await;

    send_event(&mut a, "message:send", json!({ "receiverId": bob, "content": "hi" })).await;
    assert_eq!(next_event(&mut b).await["event"], "message:new");
    assert_eq!(next_event(&mut b).await["data"]["count"], 1);

    send_event(&mut b, "conversation:read", json!({ "partnerId": alice })).await;
    assert_eq!(
        next_event(&mut b).await,
        json!({ "event": "unread:count", "data": { "count": 0 } })
    );
}

#[tokio::test]
async fn test_typing_start_and_expiry() {
    let app = TestApp::new();
    let addr = app.spawn().await;
    let (alice, bob) = (UserId::new(), UserId::new());

    let mut a = app.connect(addr, alice).await;
    let mut b = app.connect(addr, bob).await;
    app.wait_for_connections(2).await;

    send_event(&mut a, "typing:start", json!({ "receiverId": bob })).await;
    send_event(&mut a, "typing:start", json!({ "receiverId": bob })).await;

    assert_eq!(
        next_event(&mut b).await,
        json!({ "event": "typing:update", "data": { "userId": alice, "isTyping": true } })
    );
    assert_eq!(
        next_event(&mut b).await,
        json!({ "event": "typing:update", "data": { "userId": alice, "isTyping": false } })
    );
    expect_silence(&mut b, Duration::from_millis(500)).await;
}

#[tokio::test]
async fn test_presence_watch_sees_online_and_offline() {
    let app = TestApp::new();
    let addr = app.spawn().await;
    let (watcher_user, target) = (UserId::new(), UserId::new());

    let mut watcher = app.connect(addr, watcher_user).await;
    app.wait_for_connections(1).await;

    send_event(&mut watcher, "presence:check", json!({ "userIds": [target] })).await;
    assert_eq!(
        next_event(&mut watcher).await,
        json!({
            "event": "presence:status",
            "data": { "statuses": [{ "userId": target, "status": "offline", "lastSeen": null }] }
        })
    );

    let mut t = app.connect(addr, target).await;
    let online = next_event(&mut watcher).await;
    assert_eq!(
        online,
        json!({ "event": "user:status", "data": { "userId": target, "status": "online" } })
    );

    t.close(None).await.unwrap();
    let offline = next_event(&mut watcher).await;
    assert_eq!(offline["event"], "user:status");
    assert_eq!(offline["data"]["status"], "offline");
    assert!(offline["data"]["lastSeen"].is_string());
    assert!(!app.realtime.registry.is_online(target));
}

#[tokio::test]
async fn test_closed_watcher_is_cleaned_up() {
    let app = TestApp::new();
    let addr = app.spawn().await;
    let target = UserId::new();

    let mut watcher = app.connect(addr, UserId::new()).await;
    app.wait_for_connections(1).await;
    send_event(&mut watcher, "presence:check", json!({ "userIds": [target] })).await;
    next_event(&mut watcher).await;
    assert_eq!(app.realtime.presence.watcher_count(target), 1);

    watcher.close(None).await.unwrap();
    wait_until(|| app.realtime.presence.watcher_count(target) == 0).await;
    app.wait_for_connections(0).await;
}

#[tokio::test]
async fn test_unauthorized_booking_errors_sender_only() {
    let app = TestApp::new();
    let addr = app.spawn().await;
    let (alice, bob) = (UserId::new(), UserId::new());
    let booking = Booking {
        id: BookingId::new(),
        advertiser_id: UserId::new(),
        owner_id: bob,
    };
    app.store.add_booking(booking.clone());

    let mut a = app.connect(addr, alice).await;
    let mut b = app.connect(addr, bob).await;
    app.wait_for_connections(2).await;

    send_event(
        &mut a,
        "message:send",
        json!({ "receiverId": bob, "content": "Can I get a discount?", "bookingId": booking.id }),
    )
    .await;

    let err = next_event(&mut a).await;
    assert_eq!(err["event"], "error");
    assert_eq!(err["data"]["code"], "AUTHORIZATION");
    assert_eq!(err["data"]["event"], "message:send");
    expect_silence(&mut b, Duration::from_millis(300)).await;
    assert_eq!(app.store.message_count(), 0);
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection_open() {
    let app = TestApp::new();
    let addr = app.spawn().await;
    let user = UserId::new();

    let mut client = app.connect(addr, user).await;
    app.wait_for_connections(1).await;

    client
        .send(tokio_tungstenite::tungstenite::Message::Text("{oops".into()))
        .await
        .unwrap();
    let err = next_event(&mut client).await;
    assert_eq!(err["event"], "error");
    assert_eq!(err["data"]["code"], "VALIDATION");

    send_event(&mut client, "presence:check", json!({ "userIds": [user] })).await;
    let status = next_event(&mut client).await;
    assert_eq!(status["data"]["statuses"][0]["status"], "online");
}

#[tokio::test]
async fn test_oversized_frame_reports_error_and_stays_open() {
    let app = TestApp::new();
    let addr = app.spawn().await;
    let user = UserId::new();

    let mut client = app.connect(addr, user).await;
    app.wait_for_connections(1).await;

    let padding = "x".repeat(200 * 1024);
    let frame = json!({ "event": "pong", "data": { "padding": padding } }).to_string();
    client
        .send(tokio_tungstenite::tungstenite::Message::Text(frame.into()))
        .await
        .unwrap();

    let err = next_event(&mut client).await;
    assert_eq!(err["event"], "error");
    assert_eq!(err["data"]["code"], "VALIDATION");
    assert_eq!(app.realtime.registry.connection_count(), 1);

    send_event(&mut client, "presence:check", json!({ "userIds": [user] })).await;
    let status = next_event(&mut client).await;
    assert_eq!(status["data"]["statuses"][0]["status"], "online");
}

#[tokio::test]
async fn test_binary_frame_reports_error() {
    let app = TestApp::new();
    let addr = app.spawn().await;

    let mut client = app.connect(addr, UserId::new()).await;
    app.wait_for_connections(1).await;

    client
        .send(tokio_tungstenite::tungstenite::Message::Binary(vec![1u8, 2, 3].into()))
        .await
        .unwrap();

    let err = next_event(&mut client).await;
    assert_eq!(err["event"], "error");
    assert_eq!(err["data"]["code"], "VALIDATION");
    assert_eq!(app.realtime.registry.connection_count(), 1);
}

#[tokio::test]
async fn test_shutdown_closes_sockets() {
    let app = TestApp::new();
    let addr = app.spawn().await;

    let _client = app.connect(addr, UserId::new()).await;
    app.wait_for_connections(1).await;

    app.realtime.shutdown();
    app.wait_for_connections(0).await;
    assert!(!app.realtime.registry.is_online(UserId::new()));
}
