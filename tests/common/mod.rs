//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use settings_cache::clock::ManualClock;
use settings_cache::service::{Feedback, SettingsService};
use settings_cache::transport::{SettingsTransport, TransportError};
use settings_cache::{ClientConfig, Settings, SettingsPatch};

/// Epoch milliseconds the manual clock starts at.
pub const START_MILLIS: u64 = 1_760_000_000_000;

/// The document the mock server starts with.
pub fn sample_settings() -> Settings {
    Settings {
        cost_per_certificate: "110.00".into(),
        cost_per_bag: "15.00".into(),
        call_out_fee: "250.00".into(),
        cost_per_forensic_hour: "95.00".into(),
        cost_per_kilometer_fuel: "1.750".into(),
        tax_percentage: "15.00".into(),
        forward_certificate_emails_to: "certs@forensics.example.org".into(),
        send_emails_to_self: false,
        version: 7,
        updated_at: None,
        updated_by: None,
    }
}

pub fn status_error(status: u16, body: &str) -> TransportError {
    TransportError::Status {
        status,
        body: body.into(),
        retry_after: None,
    }
}

pub fn network_error() -> TransportError {
    TransportError::Network("connection refused".into())
}

/// In-memory settings endpoint.
///
/// Reads answer with the server document as it stood when the request
/// arrived, unless a scripted response is queued; writes merge the patch into the document (bumping `version`) unless a
/// scripted failure is queued.
pub struct MockTransport {
    server: Mutex<Settings>,
    fetch_script: Mutex<VecDeque<Result<Settings, TransportError>>>,
    patch_script: Mutex<VecDeque<TransportError>>,
    latency: Mutex<Duration>,
    fetch_calls: AtomicUsize,
    patch_calls: AtomicUsize,
    patches_in_flight: AtomicUsize,
    max_patches_in_flight: AtomicUsize,
    expected_versions: Mutex<Vec<Option<u64>>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            server: Mutex::new(sample_settings()),
            fetch_script: Mutex::new(VecDeque::new()),
            patch_script: Mutex::new(VecDeque::new()),
            latency: Mutex::new(Duration::ZERO),
            fetch_calls: AtomicUsize::new(0),
            patch_calls: AtomicUsize::new(0),
            patches_in_flight: AtomicUsize::new(0),
            max_patches_in_flight: AtomicUsize::new(0),
            expected_versions: Mutex::new(Vec::new()),
        })
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn fail_fetch(&self, error: TransportError) {
        self.fetch_script.lock().unwrap().push_back(Err(error));
    }

    pub fn fail_fetches(&self, error: TransportError, times: usize) {
        for _ in 0..times {
            self.fail_fetch(error.clone());
        }
    }

    pub fn fail_patch(&self, error: TransportError) {
        self.patch_script.lock().unwrap().push_back(error);
    }

    /// Change the document behind the cache's back.
    pub fn edit_server<F: FnOnce(&mut Settings)>(&self, edit: F) {
        let mut server = self.server.lock().unwrap();
        edit(&mut server);
        server.version += 1;
    }

    pub fn server_settings(&self) -> Settings {
        self.server.lock().unwrap().clone()
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn patch_calls(&self) -> usize {
        self.patch_calls.load(Ordering::SeqCst)
    }

    pub fn max_patches_in_flight(&self) -> usize {
        self.max_patches_in_flight.load(Ordering::SeqCst)
    }

    pub fn expected_versions(&self) -> Vec<Option<u64>> {
        self.expected_versions.lock().unwrap().clone()
    }

    async fn delay(&self) {
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl SettingsTransport for MockTransport {
    async fn fetch_settings(&self) -> Result<Settings, TransportError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.fetch_script.lock().unwrap().pop_front();
        let response = match scripted {
            Some(response) => response,
            None => Ok(self.server_settings()),
        };
        self.delay().await;
        response
    }

    async fn patch_settings(
        &self,
        patch: &SettingsPatch,
        expected_version: Option<u64>,
    ) -> Result<Settings, TransportError> {
        self.patch_calls.fetch_add(1, Ordering::SeqCst);
        self.expected_versions.lock().unwrap().push(expected_version);
        let now = self.patches_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_patches_in_flight.fetch_max(now, Ordering::SeqCst);

        self.delay().await;

        let scripted = self.patch_script.lock().unwrap().pop_front();
        let result = match scripted {
            Some(error) => Err(error),
            None => {
                let mut server = self.server.lock().unwrap();
                match server.apply(patch) {
                    Ok(mut next) => {
                        next.version = server.version + 1;
                        next.updated_at = Some("2026-10-17T09:30:00Z".into());
                        next.updated_by = Some("records-admin".into());
                        *server = next.clone();
                        Ok(next)
                    }
                    Err(e) => Err(status_error(422, &e.to_string())),
                }
            }
        };
        self.patches_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Feedback sink that keeps every message.
#[derive(Debug, Default)]
pub struct RecordingFeedback {
    pub infos: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<(String, bool)>>,
}

impl Feedback for RecordingFeedback {
    fn info(&self, message: &str) {
        self.infos.lock().unwrap().push(message.to_string());
    }

    fn error(&self, message: &str, retryable: bool) {
        self.errors
            .lock()
            .unwrap()
            .push((message.to_string(), retryable));
    }
}

pub struct Harness {
    pub service: SettingsService,
    pub transport: Arc<MockTransport>,
    pub clock: Arc<ManualClock>,
    pub feedback: Arc<RecordingFeedback>,
}

pub fn harness() -> Harness {
    harness_with(ClientConfig::default())
}

pub fn harness_with(config: ClientConfig) -> Harness {
    let transport = MockTransport::new();
    let clock = Arc::new(ManualClock::new(START_MILLIS));
    let feedback = Arc::new(RecordingFeedback::default());
    let service = SettingsService::with_parts(
        &config,
        transport.clone(),
        clock.clone(),
        feedback.clone(),
    );
    Harness {
        service,
        transport,
        clock,
        feedback,
    }
}

/// Poll `condition` until it holds or a second passes.
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// One-request-per-connection HTTP stub. Every request received is forwarded
/// (head and body as text) on the returned channel.
pub async fn start_http_stub(
    responses: Vec<String>,
) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for response in responses {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let request = read_request(&mut socket).await;
            let _ = tx.send(request);
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (addr, rx)
}

/// Build a raw HTTP/1.1 response.
pub fn http_response(status_line: &str, extra_headers: &[(&str, &str)], body: &str) -> String {
    let mut response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
        status_line,
        body.len()
    );
    for (name, value) in extra_headers {
        response.push_str(&format!("{}: {}\r\n", name, value));
    }
    response.push_str("\r\n");
    response.push_str(body);
    response
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(head_end) = text.find("\r\n\r\n") {
            let content_length = text[..head_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
