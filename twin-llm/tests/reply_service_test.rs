//! HttpReplyProvider against a local mock of the reply service

use mockito::{Matcher, Server};
use serde_json::json;
use twin_llm::{HttpReplyProvider, LLMError, ReplyConfig, ReplyProvider, ReplyRequest};

fn provider_for(server: &Server, config: ReplyConfig) -> HttpReplyProvider {
    HttpReplyProvider::new(ReplyConfig {
        endpoint: server.url(),
        ..config
    })
    .unwrap()
}

#[tokio::test]
async fn test_reply_posts_content_and_type() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/conversation/message")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(json!({"content": "How are you?", "type": "chat"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"content":"Doing well.","emotional_tone":"warm","confidence":0.9}"#)
        .create_async()
        .await;

    let provider = provider_for(&server, ReplyConfig::default());
    let reply = provider
        .reply(ReplyRequest::new("How are you?", "chat"))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(reply.content, "Doing well.");
    assert_eq!(reply.emotional_tone.as_deref(), Some("warm"));
    assert_eq!(reply.confidence, Some(0.9));
}

#[tokio::test]
async fn test_reply_uses_configured_path() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v2/agent/reply")
        .with_status(200)
        .with_body(r#"{"content":"Hi"}"#)
        .create_async()
        .await;

    let provider = provider_for(
        &server,
        ReplyConfig {
            message_path: "/v2/agent/reply".to_string(),
            ..ReplyConfig::default()
        },
    );
    let reply = provider.reply(ReplyRequest::new("Hello", "text")).await.unwrap();

    mock.assert_async().await;
    assert_eq!(reply.content, "Hi");
    assert_eq!(reply.emotional_tone, None);
}

#[tokio::test]
async fn test_unavailable_service_is_provider_error() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/conversation/message")
        .with_status(503)
        .with_body("agent overloaded")
        .create_async()
        .await;

    let provider = provider_for(&server, ReplyConfig::default());
    let err = provider
        .reply(ReplyRequest::new("Hello", "text"))
        .await
        .unwrap_err();
    match err {
        LLMError::Provider(message) => {
            assert!(message.contains("503"));
            assert!(message.contains("agent overloaded"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_replies_rejected() {
    let mut server = Server::new_async().await;
    let _blank = server
        .mock("POST", "/conversation/message")
        .match_body(Matcher::PartialJson(json!({"content": "blank"})))
        .with_status(200)
        .with_body(r#"{"content":"   "}"#)
        .create_async()
        .await;
    let _garbled = server
        .mock("POST", "/conversation/message")
        .match_body(Matcher::PartialJson(json!({"content": "garbled"})))
        .with_status(200)
        .with_body("not json")
        .create_async()
        .await;

    let provider = provider_for(&server, ReplyConfig::default());
    let err = provider
        .reply(ReplyRequest::new("blank", "text"))
        .await
        .unwrap_err();
    assert!(matches!(err, LLMError::InvalidResponse(_)));

    let err = provider
        .reply(ReplyRequest::new("garbled", "text"))
        .await
        .unwrap_err();
    assert!(matches!(err, LLMError::Json(_)));
}
