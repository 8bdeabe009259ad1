//! Chat commands end to end: the teloxide transport against a wiremock Bot API.

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use feedrelay::bot::{BotIdentity, CommandHandler, Incoming};
use feedrelay::config::Config;
use feedrelay::context::AppContext;
use feedrelay::feed::{http_client, HttpFeedFetcher};
use feedrelay::scheduler::Poller;
use feedrelay::storage::{ChatId, MemoryStore};
use feedrelay::transport::{connect, TelegramTransport};

const TOKEN: &str = "7:bot";
const ADMIN: i64 = 1000;
const BOT_ID: u64 = 7;

const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
<title>Tech &amp; Things</title>
<link>https://tech.example.com/</link>
<item><guid>t1</guid><title>Latest</title><link>https://tech.example.com/t1</link></item>
</channel></rss>"#;

fn api_method(name: &str) -> wiremock::matchers::PathRegexMatcher {
    path_regex(format!("(?i)^/bot{TOKEN}/{name}$"))
}

async fn setup() -> (MockServer, Arc<AppContext>, CommandHandler) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
        .mount(&server)
        .await;
    Mock::given(api_method("sendMessage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": {
                "message_id": 1,
                "date": 1700000000,
                "chat": { "id": ADMIN, "type": "private", "first_name": "Ada" },
                "text": "ok",
            },
        })))
        .mount(&server)
        .await;
    Mock::given(api_method("sendChatAction"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": true })),
        )
        .mount(&server)
        .await;

    let config = Config {
        bot_token: Some(TOKEN.to_string()),
        admins: vec![ADMIN],
        api_url: server.uri(),
        allow_private_hosts: true,
        ..Config::default()
    };
    let client = http_client(true).unwrap();
    let telegram = TelegramTransport::new(connect(&config.bot_token(), &config.api_url).unwrap());
    let ctx = Arc::new(AppContext::new(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(HttpFeedFetcher::new(client).with_max_retries(0)),
        Arc::new(telegram),
    ));
    let handler = CommandHandler::new(
        ctx.clone(),
        Poller::new(ctx.clone()),
        BotIdentity {
            id: BOT_ID,
            username: "relay_bot".to_string(),
        },
    );
    (server, ctx, handler)
}

fn message(text: &str) -> Incoming {
    Incoming {
        chat: ChatId(ADMIN),
        chat_name: "Ada".to_string(),
        sender: Some(ADMIN),
        text: Some(text.to_string()),
    }
}

/// Texts of every sendMessage request, in arrival order
async fn replies(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path().to_ascii_lowercase().ends_with("/sendmessage"))
        .map(|r| {
            let body: Value = serde_json::from_slice(&r.body).unwrap();
            body["text"].as_str().unwrap().to_string()
        })
        .collect()
}

#[tokio::test]
async fn test_sub_rss_del_conversation() {
    let (server, ctx, handler) = setup().await;
    let url = format!("{}/feed.xml", server.uri());

    handler.handle(message(&format!("/sub@relay_bot {url}"))).await;
    handler.handle(message("/rss")).await;
    handler.handle(message("/del 1")).await;
    handler.handle(message("/rss")).await;

    assert_eq!(
        replies(&server).await,
        vec![
            "✅ <b>Tech &amp; Things</b> added!".to_string(),
            format!("<b>Ada</b> is subscribed to:\n<b>1)</b> {url}\n"),
            format!("✅ <b>{url}</b> removed!"),
            "❌ There are no feeds.".to_string(),
        ]
    );
    assert!(ctx.list(ChatId(ADMIN)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_channel_is_reported() {
    let (server, ctx, handler) = setup().await;
    let url = format!("{}/feed.xml", server.uri());
    Mock::given(api_method("getChat"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: chat not found",
        })))
        .mount(&server)
        .await;

    handler.handle(message(&format!("/sub {url} @nowhere"))).await;

    assert_eq!(
        replies(&server).await,
        vec!["❌ This channel does not exist.".to_string()]
    );
    assert!(ctx.store.feeds_with_subscribers().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_strangers_get_no_answer() {
    let (server, _ctx, handler) = setup().await;
    let mut stranger = message("/start");
    stranger.sender = Some(42);

    handler.handle(stranger).await;

    assert!(replies(&server).await.is_empty());
}
