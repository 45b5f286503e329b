//! Shared harness: a served router on a random port, cookie-carrying clients
//! and a tiny event-stream reader.

#![allow(dead_code)]

use std::{pin::Pin, time::Duration};

use futures_util::{Stream, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use uuid::Uuid;
use whisperline::{app, db, AppState, Config};

pub struct TestServer {
    pub base_url: String,
    pub state: AppState,
}

pub async fn start_test_server() -> TestServer {
    let config = Config::from_lookup(|key| match key {
        "DATABASE_URL" => Some("sqlite::memory:".to_owned()),
        "DB_MAX_CONNECTIONS" => Some("1".to_owned()),
        "KEEP_ALIVE_SECS" => Some("1".to_owned()),
        "SESSION_QUEUE_CAPACITY" => Some("16".to_owned()),
        _ => None,
    })
    .expect("test config");

    let db_pool = db::connect(&config).await.expect("Failed to init DB");
    let state = AppState::new(db_pool, config);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{addr}"),
        state,
    }
}

pub struct TestUser {
    pub id: Uuid,
    pub username: String,
    pub client: reqwest::Client,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn login(&self, username: &str) -> TestUser {
        let client = reqwest::Client::builder().cookie_store(true).build().unwrap();
        let resp = client
            .post(self.url("/api/login"))
            .json(&json!({ "username": username }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200, "login failed for {username}");

        let body: Value = resp.json().await.unwrap();
        TestUser {
            id: body["authUser"]["id"].as_str().unwrap().parse().unwrap(),
            username: username.to_owned(),
            client,
        }
    }

    /// Starts a conversation from `from` with `to` and returns its id.
    pub async fn conversation(&self, from: &TestUser, to: &TestUser) -> Uuid {
        let resp = from
            .client
            .post(self.url("/api/conversations"))
            .json(&json!({ "username": to.username }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        let body: Value = resp.json().await.unwrap();
        body["id"].as_str().unwrap().parse().unwrap()
    }

    pub async fn send(&self, from: &TestUser, conversation_id: Uuid, content: &str) -> reqwest::Response {
        from.client
            .post(self.url(&format!("/api/conversations/{conversation_id}/messages")))
            .json(&json!({ "content": content }))
            .send()
            .await
            .unwrap()
    }

    pub async fn history(&self, user: &TestUser, conversation_id: Uuid) -> Vec<Value> {
        let resp = user
            .client
            .get(self.url(&format!("/api/conversations/{conversation_id}/messages")))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        resp.json().await.unwrap()
    }

    pub async fn open_stream(&self, user: &TestUser) -> EventStream {
        let resp = user
            .client
            .get(self.url("/api/messages"))
            .header("Accept", "text/event-stream")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        EventStream::new(resp)
    }

    /// Polls until the hub shows `count` sessions for `user_id`.
    pub async fn wait_for_sessions(&self, user_id: Uuid, count: usize) -> bool {
        for _ in 0..100 {
            if self.state.hub.sessions_for(user_id).len() == count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        false
    }
}

pub struct EventStream {
    body: Pin<Box<dyn Stream<Item = reqwest::Result<Vec<u8>>> + Send>>,
    buf: String,
}

impl EventStream {
    fn new(resp: reqwest::Response) -> Self {
        EventStream {
            body: Box::pin(resp.bytes_stream().map(|chunk| chunk.map(|bytes| bytes.to_vec()))),
            buf: String::new(),
        }
    }

    /// The next raw frame, without its trailing blank line. `None` once the
    /// server ends the stream.
    pub async fn next_frame(&mut self) -> Option<String> {
        loop {
            if let Some(end) = self.buf.find("\n\n") {
                let frame = self.buf[..end].to_owned();
                self.buf.drain(..end + 2);
                return Some(frame);
            }
            let chunk = self.body.next().await?.ok()?;
            self.buf.push_str(&String::from_utf8_lossy(&chunk));
        }
    }

    /// The next `data:` payload, skipping keep-alive comments.
    pub async fn next_data(&mut self, within: Duration) -> Option<Value> {
        tokio::time::timeout(within, async {
            loop {
                let frame = self.next_frame().await?;
                let data: Vec<&str> = frame
                    .lines()
                    .filter_map(|line| line.strip_prefix("data:"))
                    .map(str::trim_start)
                    .collect();
                if data.is_empty() {
                    continue;
                }
                return Some(serde_json::from_str(&data.join("\n")).expect("event data is json"));
            }
        })
        .await
        .ok()
        .flatten()
    }
}
