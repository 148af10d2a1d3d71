//! Messaging API client tests against a mock HTTP server

use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ClassChat::config::{BotConfig, Settings};
use ClassChat::transport::{HttpMessenger, Messenger, OutboundMessage};
use ClassChat::ClassChatError;

fn bot_config(server: &MockServer) -> BotConfig {
    BotConfig {
        channel_access_token: "test-token".to_string(),
        api_base_url: server.uri(),
        ..Settings::default().bot
    }
}

async fn request_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

#[tokio::test]
async fn test_reply_posts_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/bot/message/reply"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let messenger = HttpMessenger::new(&bot_config(&server)).unwrap();
    messenger
        .reply("rt-1", vec![OutboundMessage::text("hello")])
        .await
        .unwrap();

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies[0]["replyToken"], "rt-1");
    assert_eq!(bodies[0]["messages"][0], json!({ "type": "text", "text": "hello" }));
}

#[tokio::test]
async fn test_reply_is_capped_on_the_wire() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/bot/message/reply"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let messenger = HttpMessenger::new(&bot_config(&server)).unwrap();
    let messages = (0..7).map(|i| OutboundMessage::text(format!("m{}", i))).collect();
    messenger.reply("rt-1", messages).await.unwrap();

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies[0]["messages"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_push_targets_user() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/bot/message/push"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let messenger = HttpMessenger::new(&bot_config(&server)).unwrap();
    messenger
        .push("U1", vec![OutboundMessage::text("Reminder: sports day on Friday")])
        .await
        .unwrap();

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies[0]["to"], "U1");
}

#[tokio::test]
async fn test_multicast_is_chunked() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/bot/message/multicast"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let messenger = HttpMessenger::new(&bot_config(&server)).unwrap();
    let recipients: Vec<String> = (0..600).map(|i| format!("U{}", i)).collect();
    messenger
        .multicast(&recipients, vec![OutboundMessage::text("School closed tomorrow")])
        .await
        .unwrap();

    let bodies = request_bodies(&server).await;
    let sizes: Vec<usize> = bodies.iter().map(|b| b["to"].as_array().unwrap().len()).collect();
    assert_eq!(sizes, vec![500, 100]);
}

#[tokio::test]
async fn test_empty_multicast_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let messenger = HttpMessenger::new(&bot_config(&server)).unwrap();
    messenger
        .multicast(&[], vec![OutboundMessage::text("nobody")])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_error_status_becomes_messaging_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/bot/message/reply"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Invalid reply token"))
        .mount(&server)
        .await;

    let messenger = HttpMessenger::new(&bot_config(&server)).unwrap();
    let result = messenger.reply("expired", vec![OutboundMessage::text("late")]).await;

    match result {
        Err(ClassChatError::Messaging(message)) => {
            assert!(message.contains("400"));
            assert!(message.contains("Invalid reply token"));
        }
        other => panic!("expected a messaging error, got {:?}", other),
    }
}
