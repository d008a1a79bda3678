//! Test doubles: a canned-response HTTP server for exercising the backend
//! adapters offline, and an in-process backend stub for the pipeline.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::backend::domain::backend_client::{BackendClient, Candidate, Classification};
use crate::dataset::domain::batch_builder::Batch;
use crate::shared::image_item::ImageItem;
use crate::shared::outcome::{FailureKind, Outcome};

pub enum MockResponse {
    Json(u16, String),
    /// Accept the connection and never answer within the client's timeout.
    Hang(Duration),
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Serves each canned response to one incoming connection, in order.
pub struct MockServer {
    url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockServer {
    pub fn start(responses: Vec<MockResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();

        thread::spawn(move || {
            for response in responses {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                let request = read_request(&mut stream);
                recorded.lock().unwrap().push(request);
                match response {
                    MockResponse::Json(status, body) => {
                        let reply = format!(
                            "HTTP/1.1 {status} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                            body.len()
                        );
                        let _ = stream.write_all(reply.as_bytes());
                        let _ = stream.flush();
                    }
                    MockResponse::Hang(duration) => thread::sleep(duration),
                }
            }
        });

        Self { url, requests }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// Address on which nothing is listening.
pub fn closed_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn read_request(stream: &mut TcpStream) -> RecordedRequest {
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 8192];

    let header_end = loop {
        if let Some(pos) = find(&buffer, b"\r\n\r\n") {
            break pos + 4;
        }
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => break buffer.len(),
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_lowercase(), value.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(key, _)| key == "content-length")
        .and_then(|(_, value)| value.parse::<usize>().ok());
    let chunked = headers
        .iter()
        .any(|(key, value)| key == "transfer-encoding" && value.contains("chunked"));

    loop {
        let body_len = buffer.len() - header_end;
        let complete = match content_length {
            Some(len) => body_len >= len,
            None if chunked => buffer.ends_with(b"0\r\n\r\n"),
            None => true,
        };
        if complete {
            break;
        }
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
        }
    }

    RecordedRequest {
        request_line,
        headers,
        body: buffer[header_end..].to_vec(),
    }
}

/// Backend stub answering from a table keyed by file name.
///
/// Unlisted files are classified as their own label at 0.99; files listed
/// in `transport_failures` fail with `Transport`.
#[derive(Default)]
pub struct StubClient {
    pub answers: HashMap<String, Option<Candidate>>,
    pub transport_failures: Vec<String>,
    pub enroll_supported: bool,
    /// Sleep per backend call, to keep batches in flight.
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl StubClient {
    pub fn trainable() -> Self {
        Self {
            enroll_supported: true,
            ..Self::default()
        }
    }

    pub fn answer(mut self, file: &str, candidate: Option<Candidate>) -> Self {
        self.answers.insert(file.to_string(), candidate);
        self
    }

    pub fn failing(mut self, file: &str) -> Self {
        self.transport_failures.push(file.to_string());
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
    }

    fn fails(&self, item: &ImageItem) -> bool {
        self.transport_failures.contains(&item.file_name())
    }
}

impl BackendClient for StubClient {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn supports_enroll(&self) -> bool {
        self.enroll_supported
    }

    fn enroll(&self, batch: &Batch) -> Vec<Outcome> {
        self.call();
        batch
            .items()
            .iter()
            .map(|item| {
                if self.fails(item) {
                    Outcome::failed(item.clone(), FailureKind::Transport("refused".into()))
                } else {
                    Outcome::success(item.clone())
                }
            })
            .collect()
    }

    fn classify(&self, batch: &Batch) -> Vec<Classification> {
        self.call();
        batch
            .items()
            .iter()
            .map(|item| {
                if self.fails(item) {
                    return Classification::failed(
                        item.clone(),
                        FailureKind::Transport("refused".into()),
                    );
                }
                match self.answers.get(&item.file_name()) {
                    Some(Some(c)) => Classification::matched(item.clone(), c.clone()),
                    Some(None) => Classification::no_match(item.clone()),
                    None => Classification::matched(
                        item.clone(),
                        Candidate::new(item.label.clone(), 0.99),
                    ),
                }
            })
            .collect()
    }
}
