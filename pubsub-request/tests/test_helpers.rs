//! Test helpers for integration testing.
//!
//! Provides a minimal HTTP server that replies with scripted responses and
//! records the request targets it received, plus a router for exercising
//! sessions against it.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use pubsub_error::{EndpointCategory, PubSubError};
use pubsub_request::{Router, RouterConfiguration};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

/// What the server does with one incoming request.
#[derive(Debug, Clone)]
pub enum Reply {
    Respond { status: u16, body: String },
    /// Keep the connection open without answering
    Hang,
}

impl Reply {
    pub fn ok(body: &str) -> Self {
        Reply::Respond {
            status: 200,
            body: body.to_string(),
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Reply::Respond {
            status,
            body: body.to_string(),
        }
    }
}

/// Simple HTTP mock server for testing
pub struct MockHttpServer {
    port: u16,
    replies: Arc<Mutex<VecDeque<Reply>>>,
    received: Arc<Mutex<Vec<String>>>,
}

impl MockHttpServer {
    pub async fn start(replies: Vec<Reply>) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();

        let server = Self {
            port,
            replies: Arc::new(Mutex::new(replies.into())),
            received: Arc::new(Mutex::new(Vec::new())),
        };

        let replies = Arc::clone(&server.replies);
        let received = Arc::clone(&server.received);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let replies = Arc::clone(&replies);
                let received = Arc::clone(&received);
                tokio::spawn(async move {
                    let _ = handle_connection(stream, replies, received).await;
                });
            }
        });

        Ok(server)
    }

    /// Host and port, usable as a router origin.
    pub fn origin(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    /// Request targets (path and query) received so far.
    pub async fn received(&self) -> Vec<String> {
        self.received.lock().await.clone()
    }

    /// Wait until `count` requests arrived; `false` on timeout.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            while self.received.lock().await.len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .is_ok()
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    replies: Arc<Mutex<VecDeque<Reply>>>,
    received: Arc<Mutex<Vec<String>>>,
) -> std::io::Result<()> {
    let mut head = Vec::new();
    let mut buffer = [0u8; 1024];
    while !head.windows(4).any(|window| window == b"\r\n\r\n") {
        let read = stream.read(&mut buffer).await?;
        if read == 0 {
            return Ok(());
        }
        head.extend_from_slice(&buffer[..read]);
    }

    let head = String::from_utf8_lossy(&head);
    let target = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or_default()
        .to_string();
    received.lock().await.push(target);

    let reply = replies.lock().await.pop_front().unwrap_or(Reply::Hang);
    match reply {
        Reply::Respond { status, body } => {
            let response = format!(
                "HTTP/1.1 {status} Scripted\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await?;
            stream.shutdown().await
        }
        Reply::Hang => {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }
}

/// Router for `GET /time/0` on the mock server.
#[derive(Debug)]
pub struct TimeRouter {
    pub config: RouterConfiguration,
    pub category: EndpointCategory,
}

impl TimeRouter {
    pub fn new(origin: String) -> Self {
        let mut config = RouterConfiguration::new("sub-key", "test-user");
        config.origin = origin;
        config.use_secure_connections = false;
        Self {
            config,
            category: EndpointCategory::Time,
        }
    }
}

impl Router for TimeRouter {
    fn endpoint(&self) -> EndpointCategory {
        self.category
    }

    fn configuration(&self) -> &RouterConfiguration {
        &self.config
    }

    fn path_segments(&self) -> Result<Vec<String>, PubSubError> {
        Ok(vec!["time".to_string(), "0".to_string()])
    }
}
