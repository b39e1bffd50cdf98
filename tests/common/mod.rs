#![allow(dead_code)]

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub authorization: Option<String>,
    pub body: Value,
}

pub type RequestLog = Arc<Mutex<Vec<SeenRequest>>>;

#[derive(Clone)]
struct Stub {
    log: RequestLog,
    delay: Duration,
}

fn translations() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        ("The", "その"),
        ("the", "その"),
        ("cat", "猫"),
        ("dog", "犬"),
        ("and", "と"),
    ])
}

fn readings() -> HashMap<&'static str, &'static str> {
    HashMap::from([("その", "その"), ("猫", "ねこ"), ("犬", "いぬ")])
}

pub fn prompt_words(prompt: &str) -> Vec<String> {
    prompt
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix("Words: "))
        .map(|words| words.split(", ").map(str::to_string).collect())
        .unwrap_or_default()
}

// Mimics the chat-completion endpoint: answers with prose around a JSON list,
// stops giving readings at the first word it does not know, and fails with 500
// whenever the batch contains "explode".
async fn chat_completions(
    State(stub): State<Stub>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    stub.log.lock().unwrap().push(SeenRequest {
        authorization: headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        body: body.clone(),
    });
    if !stub.delay.is_zero() {
        tokio::time::sleep(stub.delay).await;
    }

    let prompt = body["messages"][1]["content"].as_str().unwrap_or_default();
    let words = prompt_words(prompt);
    if words.iter().any(|word| word == "explode") {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": {"message": "model exploded", "type": "server_error"}})),
        );
    }

    let list = if prompt.starts_with("Translate") {
        let dictionary = translations();
        words
            .iter()
            .map(|word| {
                let japanese = dictionary.get(word.as_str()).copied().unwrap_or("不明");
                json!({"english": word, "japanese": japanese})
            })
            .collect::<Vec<_>>()
    } else {
        let dictionary = readings();
        words
            .iter()
            .map_while(|word| {
                dictionary
                    .get(word.as_str())
                    .map(|reading| json!({"japanese": word, "furigana": reading}))
            })
            .collect::<Vec<_>>()
    };
    let content = format!(
        "Here you go!\n{}\nLet me know if you need more.",
        serde_json::to_string(&list).unwrap()
    );
    (
        StatusCode::OK,
        Json(json!({
            "model": "stub-model",
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })),
    )
}

/// Serves the stub on an ephemeral port; returns its `/v1` base URL.
pub async fn spawn_stub() -> (String, RequestLog) {
    spawn_slow_stub(Duration::ZERO).await
}

/// Like [`spawn_stub`], but every request takes at least `delay`.
pub async fn spawn_slow_stub(delay: Duration) -> (String, RequestLog) {
    let log: RequestLog = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(Stub {
            log: log.clone(),
            delay,
        });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/v1", addr), log)
}
