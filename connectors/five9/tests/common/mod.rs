//! Shared fakes for the Five9 connector integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use fcp_five9::config::{
    CALL_VARIABLES_RESOURCE, Five9Config, METADATA_RESOURCE, ResourceDescriptor,
    WEB_SOCKET_RESOURCE,
};
use fcp_five9::http::ResourceFetcher;
use fcp_five9::transport::{
    SocketConnector, SocketEvent, SocketPair, SocketReader, SocketWriter, WsCloseFrame,
};
use fcp_five9::{
    ChannelSink, ConnectionSupervisor, Five9Error, Five9Result, Settings, SinkMessage,
    SupervisorContext, SupervisorStatus,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::Instant;

pub const DISCOVERY_HOST: &str = "discovery.five9.test";
pub const API_HOST: &str = "api.five9.test";
pub const USER_ID: &str = "agent-1";

pub fn config() -> Five9Config {
    let mut config = Five9Config {
        is_eligible: true,
        ..Five9Config::default()
    };
    for descriptor in [
        ResourceDescriptor::new(METADATA_RESOURCE, DISCOVERY_HOST, "appsvcs/rs/svc/auth/metadata"),
        ResourceDescriptor::new(
            CALL_VARIABLES_RESOURCE,
            "",
            "appsvcs/rs/svc/orgs/{five9OrgId}/call_variables",
        ),
        ResourceDescriptor::new(WEB_SOCKET_RESOURCE, "", "appsvcs/ws"),
    ] {
        config
            .resources
            .insert(descriptor.developer_name.clone(), descriptor);
    }
    config
}

pub fn ready_metadata() -> Value {
    json!({
        "orgId": "131313",
        "userId": USER_ID,
        "metadata": {
            "dataCenters": [
                { "name": "US", "apiUrls": [ { "host": API_HOST, "port": "443" } ] }
            ]
        }
    })
}

pub fn not_ready() -> Value {
    json!({ "five9ExceptionDetail": { "errorCode": 0, "message": "Not logged in" } })
}

pub fn schema() -> Value {
    json!([
        { "id": "v1", "group": "Call", "name": "Type" },
        { "id": "v2", "group": "Call", "name": "session_id" },
        { "id": "v3", "group": "Customer", "name": "Name" }
    ])
}

pub fn call_frame(event_id: &str, variables: Value) -> String {
    json!({
        "context": { "eventId": event_id, "eventReason": "EVENT" },
        "payLoad": { "state": "TALKING", "variables": variables }
    })
    .to_string()
}

pub fn ack_frame() -> String {
    json!({ "context": { "eventId": "1202", "eventReason": "PONG" } }).to_string()
}

/// Scripted REST endpoints.
#[derive(Default)]
pub struct FakeFetcher {
    inner: Mutex<FetcherState>,
}

#[derive(Default)]
struct FetcherState {
    discovery_queue: VecDeque<Value>,
    discovery_default: Option<Value>,
    schema: Option<Result<Value, String>>,
    discovery_requests: Vec<Instant>,
    schema_requests: Vec<String>,
}

impl FakeFetcher {
    /// Discovery answers ready metadata, schema answers [`schema`].
    pub fn ready() -> Arc<Self> {
        let fetcher = Self::default();
        fetcher.set_discovery(ready_metadata());
        fetcher.set_schema(Ok(schema()));
        Arc::new(fetcher)
    }

    /// Answer subsequent discovery requests with `body` once queued answers
    /// run out.
    pub fn set_discovery(&self, body: Value) {
        self.inner.lock().discovery_default = Some(body);
    }

    /// Answer the next discovery request with `body`.
    pub fn queue_discovery(&self, body: Value) {
        self.inner.lock().discovery_queue.push_back(body);
    }

    pub fn set_schema(&self, body: Result<Value, String>) {
        self.inner.lock().schema = Some(body);
    }

    pub fn discovery_requests(&self) -> Vec<Instant> {
        self.inner.lock().discovery_requests.clone()
    }

    pub fn schema_requests(&self) -> Vec<String> {
        self.inner.lock().schema_requests.clone()
    }
}

#[async_trait]
impl ResourceFetcher for FakeFetcher {
    async fn get_json(&self, url: &str) -> Five9Result<Value> {
        let mut state = self.inner.lock();
        if url.contains(DISCOVERY_HOST) {
            state.discovery_requests.push(Instant::now());
            let body = state
                .discovery_queue
                .pop_front()
                .or_else(|| state.discovery_default.clone())
                .unwrap_or(Value::Null);
            return Ok(body);
        }
        if url.contains("call_variables") {
            state.schema_requests.push(url.to_string());
            return match state.schema.clone() {
                Some(Ok(body)) => Ok(body),
                Some(Err(message)) => Err(Five9Error::upstream(url, message)),
                None => Err(Five9Error::upstream(url, "no schema scripted")),
            };
        }
        Err(Five9Error::upstream(url, "unexpected URL"))
    }
}

/// Server side of a fake socket.
#[derive(Clone)]
pub struct FakeSocket {
    pub url: String,
    inbound: mpsc::UnboundedSender<SocketEvent>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl FakeSocket {
    /// Deliver a text frame to the client.
    pub fn push_text(&self, text: impl Into<String>) {
        let _ = self.inbound.send(SocketEvent::Text(text.into()));
    }

    /// Close from the server side with a close code.
    pub fn close_with(&self, code: u16) {
        let _ = self.inbound.send(SocketEvent::Closed {
            frame: Some(WsCloseFrame::new(code, "server close")),
            detail: "close frame received".into(),
        });
    }

    /// Drop the connection without a close frame.
    pub fn drop_connection(&self) {
        let _ = self.inbound.send(SocketEvent::Closed {
            frame: None,
            detail: "stream ended".into(),
        });
    }

    /// Frames the client sent.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Whether the client closed or released its end.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct FakeWriter {
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl SocketWriter for FakeWriter {
    async fn send_text(&mut self, text: &str) -> Five9Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Five9Error::Socket("socket closed".into()));
        }
        self.sent.lock().push(text.to_string());
        Ok(())
    }

    async fn close(&mut self) -> Five9Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for FakeWriter {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct FakeReader {
    inbound: mpsc::UnboundedReceiver<SocketEvent>,
}

#[async_trait]
impl SocketReader for FakeReader {
    async fn next_event(&mut self) -> SocketEvent {
        self.inbound.recv().await.unwrap_or(SocketEvent::Closed {
            frame: None,
            detail: "server gone".into(),
        })
    }
}

/// Records every socket the supervisor opens.
#[derive(Default)]
pub struct FakeConnector {
    sockets: Mutex<Vec<FakeSocket>>,
    failures: Mutex<u32>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next `count` connection attempts.
    pub fn fail_next(&self, count: u32) {
        *self.failures.lock() = count;
    }

    pub fn connects(&self) -> usize {
        self.sockets.lock().len()
    }

    pub fn socket(&self, index: usize) -> FakeSocket {
        self.sockets.lock()[index].clone()
    }

    pub fn live_sockets(&self) -> usize {
        self.sockets
            .lock()
            .iter()
            .filter(|socket| !socket.is_closed())
            .count()
    }
}

#[async_trait]
impl SocketConnector for FakeConnector {
    async fn connect(&self, url: &str) -> Five9Result<SocketPair> {
        {
            let mut failures = self.failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(Five9Error::Socket("connection refused".into()));
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        self.sockets.lock().push(FakeSocket {
            url: url.to_string(),
            inbound: tx,
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        });

        Ok(SocketPair {
            writer: Box::new(FakeWriter { sent, closed }),
            reader: Box::new(FakeReader { inbound: rx }),
        })
    }
}

pub fn context(
    fetcher: Arc<FakeFetcher>,
    connector: Arc<FakeConnector>,
    sink: ChannelSink,
) -> SupervisorContext {
    context_with(fetcher, connector, sink, config(), Settings::default())
}

pub fn context_with(
    fetcher: Arc<FakeFetcher>,
    connector: Arc<FakeConnector>,
    sink: ChannelSink,
    config: Five9Config,
    settings: Settings,
) -> SupervisorContext {
    SupervisorContext {
        config,
        settings,
        user_id: USER_ID.to_string(),
        fetcher,
        connector,
        sink: Arc::new(sink),
    }
}

/// Wait (in virtual time) until the supervisor status satisfies `predicate`.
pub async fn wait_for(
    supervisor: &ConnectionSupervisor,
    predicate: impl FnMut(&SupervisorStatus) -> bool,
) -> SupervisorStatus {
    let mut status = supervisor.status();
    tokio::time::timeout(Duration::from_secs(600), status.wait_for(predicate))
        .await
        .expect("timed out waiting for supervisor status")
        .expect("supervisor status channel closed")
        .clone()
}

/// Next message delivered to the sink.
pub async fn next_message(messages: &mut mpsc::UnboundedReceiver<SinkMessage>) -> SinkMessage {
    tokio::time::timeout(Duration::from_secs(600), messages.recv())
        .await
        .expect("timed out waiting for sink message")
        .expect("sink channel closed")
}
