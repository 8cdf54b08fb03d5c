// Common test utilities for integration tests
// Scripted transport, raw message builders and a minimal HTTP responder

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use log::LevelFilter;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use smsdeck::transport::{MessageTransport, PhoneNumber, RawMessage, TransportError, WireDirection};

// Initialize logging once
static INIT_LOGGER: Once = Once::new();

/// Set up the logger for the tests
pub fn setup_logging() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::Builder::new()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .try_init();
    });
}

/// Build a raw message as the read endpoint would return it
pub fn raw(id: &str, phone: &str, direction: WireDirection, body: &str, hk_time: &str) -> RawMessage {
    RawMessage {
        id: id.to_string(),
        phone_number: PhoneNumber::Text(phone.to_string()),
        direction,
        last_message: body.to_string(),
        last_message_hk: hk_time.to_string(),
        last_message_sl: hk_time.to_string(),
    }
}

pub fn inbound(id: &str, phone: &str, body: &str, hk_time: &str) -> RawMessage {
    raw(id, phone, WireDirection::Inbound, body, hk_time)
}

pub fn outbound(id: &str, phone: &str, body: &str, hk_time: &str) -> RawMessage {
    raw(id, phone, WireDirection::Outbound, body, hk_time)
}

/// In-process transport that replays scripted results
pub struct ScriptedTransport {
    fetch_script: Mutex<VecDeque<Result<Vec<RawMessage>, TransportError>>>,
    fetch_default: Mutex<Result<Vec<RawMessage>, TransportError>>,
    send_result: Mutex<Result<(), TransportError>>,
    fetch_calls: AtomicUsize,
    sent: Mutex<Vec<(String, String)>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fetch_script: Mutex::new(VecDeque::new()),
            fetch_default: Mutex::new(Ok(Vec::new())),
            send_result: Mutex::new(Ok(())),
            fetch_calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        })
    }

    /// Queue a result for the next unscripted fetch
    pub fn push_fetch(&self, result: Result<Vec<RawMessage>, TransportError>) {
        self.fetch_script.lock().unwrap().push_back(result);
    }

    /// Result returned once the script is exhausted
    pub fn set_fetch_default(&self, result: Result<Vec<RawMessage>, TransportError>) {
        *self.fetch_default.lock().unwrap() = result;
    }

    pub fn set_send_result(&self, result: Result<(), TransportError>) {
        *self.send_result.lock().unwrap() = result;
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageTransport for ScriptedTransport {
    async fn fetch_all(&self) -> Result<Vec<RawMessage>, TransportError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.fetch_script.lock().unwrap().pop_front();
        match scripted {
            Some(result) => result,
            None => self.fetch_default.lock().unwrap().clone(),
        }
    }

    async fn send_one(&self, to: &str, body: &str) -> Result<(), TransportError> {
        let result = self.send_result.lock().unwrap().clone();
        if result.is_ok() {
            self.sent.lock().unwrap().push((to.to_string(), body.to_string()));
        }
        result
    }
}

/// A request captured by `TestServer`
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

/// Minimal HTTP/1.1 responder: answers every request with one canned response
pub struct TestServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl TestServer {
    pub async fn start(status: u16, body: &str) -> Self {
        Self::start_inner(Some((status, body.to_string()))).await
    }

    /// Accepts connections but never answers
    pub async fn start_silent() -> Self {
        Self::start_inner(None).await
    }

    async fn start_inner(response: Option<(u16, String)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let captured = requests.clone();
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                let captured = captured.clone();
                let response = response.clone();
                tokio::spawn(async move {
                    let request = match read_request(&mut socket).await {
                        Some(request) => request,
                        None => return,
                    };
                    captured.lock().unwrap().push(request);

                    match response {
                        Some((status, body)) => {
                            let reply = format!(
                                "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                                status,
                                body.len(),
                                body
                            );
                            let _ = socket.write_all(reply.as_bytes()).await;
                            let _ = socket.shutdown().await;
                        }
                        None => {
                            // Hold the connection open without answering
                            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
                        }
                    }
                });
            }
        });

        TestServer { base_url, requests }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<CapturedRequest> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buffer.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
    let body_end = buffer.len().min(header_end + content_length);
    let body = String::from_utf8_lossy(&buffer[header_end..body_end]).to_string();

    Some(CapturedRequest { method, path, body })
}
