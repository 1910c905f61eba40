#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub use vault_ssl_bundle_core::testdata::{TestCa, fields, self_signed};

#[derive(Clone)]
struct Canned {
    status: u16,
    body: String,
}

#[derive(Default)]
struct MockState {
    responses: Mutex<HashMap<String, Canned>>,
    requests: Mutex<Vec<(String, HashMap<String, String>)>>,
    hits: AtomicUsize,
}

/// Minimal Vault stand-in: answers `GET /v1/<path>` with canned JSON.
/// Unknown paths get 404.
pub struct MockVault {
    addr: SocketAddr,
    state: Arc<MockState>,
    delay: Duration,
    task: JoinHandle<()>,
}

impl MockVault {
    pub async fn start() -> Self {
        Self::start_with_delay(Duration::ZERO).await
    }

    pub async fn start_with_delay(delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(MockState::default());

        let task = {
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                while let Ok((socket, _)) = listener.accept().await {
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        let _ = serve(socket, state, delay).await;
                    });
                }
            })
        };

        Self {
            addr,
            state,
            delay,
            task,
        }
    }

    pub fn address(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn respond(&self, path: &str, status: u16, body: serde_json::Value) {
        self.state.responses.lock().unwrap().insert(
            format!("/v1/{path}"),
            Canned {
                status,
                body: body.to_string(),
            },
        );
    }

    /// Serve `fields` the way a KV-v1 mount does
    pub fn put_kv1(&self, path: &str, fields: serde_json::Value) {
        self.respond(path, 200, json!({ "data": fields, "lease_duration": 2764800 }));
    }

    /// Serve `fields` the way a KV-v2 mount does
    pub fn put_kv2(&self, path: &str, fields: serde_json::Value) {
        self.respond(
            path,
            200,
            json!({
                "data": {
                    "data": fields,
                    "metadata": { "version": 1, "destroyed": false }
                }
            }),
        );
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    /// Header map of the most recent request, keys lowercased
    pub fn last_headers(&self) -> Option<HashMap<String, String>> {
        self.state
            .requests
            .lock()
            .unwrap()
            .last()
            .map(|(_, headers)| headers.clone())
    }
}

impl Drop for MockVault {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(mut socket: TcpStream, state: Arc<MockState>, delay: Duration) -> std::io::Result<()> {
    let mut head = Vec::new();
    let mut buf = [0u8; 2048];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        head.extend_from_slice(&buf[..n]);
    }

    let head = String::from_utf8_lossy(&head).to_string();
    let mut lines = head.split("\r\n");
    let path = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    state.hits.fetch_add(1, Ordering::SeqCst);
    state.requests.lock().unwrap().push((path.clone(), headers));

    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let canned = state
        .responses
        .lock()
        .unwrap()
        .get(&path)
        .cloned()
        .unwrap_or(Canned {
            status: 404,
            body: r#"{"errors":[]}"#.to_string(),
        });

    let response = format!(
        "HTTP/1.1 {} {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        canned.status,
        reason(canned.status),
        canned.body.len(),
        canned.body
    );
    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
