use crate::domain::ports::{RequestOptions, Transport, TransportResponse};
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// A canned response served to every request whose URL contains `url`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptedRoute {
    pub url: String,
    #[serde(default = "default_status")]
    pub status: i32,
    #[serde(default)]
    pub body: Value,
    #[serde(default)]
    pub delay_ms: u64,
}

fn default_status() -> i32 {
    200
}

impl ScriptedRoute {
    pub fn new(url: impl Into<String>, status: i32, body: Value) -> Self {
        Self {
            url: url.into(),
            status,
            body,
            delay_ms: 0,
        }
    }
}

/// A thread-safe scripted [`Transport`].
///
/// Routes are matched in insertion order; the first one whose `url` is a
/// substring of the request URL answers. Unmatched requests get a 404. Every
/// request is recorded so tests can count gateway calls.
#[derive(Default, Clone)]
pub struct InMemoryTransport {
    routes: Arc<Vec<ScriptedRoute>>,
    calls: Arc<RwLock<Vec<RequestOptions>>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_routes(routes: Vec<ScriptedRoute>) -> Self {
        Self {
            routes: Arc::new(routes),
            calls: Arc::default(),
        }
    }

    /// Loads a JSON array of routes.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(Self::with_routes(serde_json::from_str(text)?))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().len()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn request(&self, options: RequestOptions) -> TransportResponse {
        let matched = self
            .routes
            .iter()
            .find(|route| options.url.contains(&route.url))
            .cloned();
        self.calls.write().push(options);

        match matched {
            Some(route) => {
                if route.delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(route.delay_ms)).await;
                }
                TransportResponse::status(route.status, route.body)
            }
            None => TransportResponse::status(404, Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::Method;
    use serde_json::json;

    fn options(url: &str) -> RequestOptions {
        RequestOptions {
            url: url.to_string(),
            method: Method::Post,
            data: json!({}),
            headers: Vec::new(),
            timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_first_matching_route_answers() {
        let transport = InMemoryTransport::with_routes(vec![
            ScriptedRoute::new("credit_cards", 201, json!({ "creditCards": [] })),
            ScriptedRoute::new("cards", 500, Value::Null),
        ]);

        let response = transport.request(options("https://x/v1/payment_methods/credit_cards")).await;
        assert_eq!(response.status, 201);

        let response = transport.request(options("https://x/tokens")).await;
        assert_eq!(response.status, 404);
        assert_eq!(transport.call_count(), 2);
    }

    #[test]
    fn test_routes_from_json() {
        let transport = InMemoryTransport::from_json(
            r#"[{ "url": "credit_cards", "body": { "ok": true } }, { "url": "tokens", "status": 503, "delayMs": 5 }]"#,
        )
        .unwrap();
        let routes = &transport.routes;
        assert_eq!(routes[0].status, 200);
        assert_eq!(routes[1].delay_ms, 5);
    }
}
