use super::events::InputEvent;
use super::validators::YearMonth;
use crate::config::{Configuration, Gateway};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One raw HTTP exchange as the transport driver sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    pub url: String,
    pub method: Method,
    pub data: Value,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

/// Outcome of a transport call. A status of `-1` or `0` means the request timed
/// out or never reached the server.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: i32,
    pub body: Value,
    pub error: Option<String>,
}

impl TransportResponse {
    pub fn ok(body: Value) -> Self {
        Self {
            status: 200,
            body,
            error: None,
        }
    }

    pub fn status(status: i32, body: Value) -> Self {
        Self {
            status,
            body,
            error: None,
        }
    }

    pub fn timed_out() -> Self {
        Self {
            status: 0,
            body: Value::Null,
            error: Some("timeout".to_string()),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, options: RequestOptions) -> TransportResponse;
}

/// A request addressed to a gateway endpoint rather than a URL.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayRequest {
    pub api: Gateway,
    pub method: Method,
    pub endpoint: String,
    pub data: Value,
    pub timeout: Option<Duration>,
}

/// A configured client able to talk to the gateways.
#[async_trait]
pub trait Client: Send + Sync {
    fn configuration(&self) -> &Configuration;
    async fn request(&self, request: GatewayRequest) -> Result<Value>;
}

/// Receives the sanitized, merchant-facing input events of a card form.
pub trait InputEventSink: Send + Sync {
    fn publish(&self, event: InputEvent);
}

impl InputEventSink for broadcast::Sender<InputEvent> {
    fn publish(&self, event: InputEvent) {
        // No subscribers is fine.
        let _ = self.send(event);
    }
}

impl InputEventSink for mpsc::UnboundedSender<InputEvent> {
    fn publish(&self, event: InputEvent) {
        let _ = self.send(event);
    }
}

/// Fans each event out to every sink in order.
impl InputEventSink for Vec<Arc<dyn InputEventSink>> {
    fn publish(&self, event: InputEvent) {
        for sink in self {
            sink.publish(event.clone());
        }
    }
}

/// Source of the current month for expiration checks.
pub trait Clock: Send + Sync {
    fn today(&self) -> YearMonth;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> YearMonth {
        YearMonth::today()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub YearMonth);

impl Clock for FixedClock {
    fn today(&self) -> YearMonth {
        self.0
    }
}
