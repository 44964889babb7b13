//! Asynchronous message bus crossing the merchant/field boundary.
//!
//! Endpoints share a [`Wire`] that only carries JSON text, so nothing but
//! serializable payloads can cross it. Each envelope names the session channel
//! it belongs to; endpoints ignore other sessions and their own messages.
//! Requests carry a correlation id and are answered through a [`ReplyOnce`].

use super::reply::ReplyOnce;
use crate::error::{ErrorCode, HostedFieldsError, Result};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

pub const DEFAULT_WIRE_CAPACITY: usize = 1024;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared transport between bus endpoints.
#[derive(Clone)]
pub struct Wire {
    sender: broadcast::Sender<String>,
}

impl Wire {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_WIRE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for Wire {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    channel: String,
    sender: Uuid,
    id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reply_to: Option<Uuid>,
    #[serde(default)]
    expects_reply: bool,
    payload: Value,
}

/// A message delivered to an endpoint. `reply` is set when the sender awaits an answer.
#[derive(Debug)]
pub struct Incoming<M> {
    pub message: M,
    pub reply: Option<ReplyOnce<Value>>,
}

type Pending = Arc<Mutex<HashMap<Uuid, oneshot::Sender<Value>>>>;

/// One endpoint on the bus.
pub struct Bus<M> {
    channel: String,
    endpoint: Uuid,
    wire: broadcast::Sender<String>,
    pending: Pending,
    request_timeout: Duration,
    router: JoinHandle<()>,
    _message: PhantomData<fn() -> M>,
}

impl<M> Bus<M>
where
    M: Serialize + DeserializeOwned + Send + 'static,
{
    /// Joins `wire` under session `channel`. Must be called inside a tokio runtime.
    pub fn connect(wire: &Wire, channel: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<Incoming<M>>) {
        let channel = channel.into();
        let endpoint = Uuid::new_v4();
        let pending: Pending = Arc::default();
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();

        let router = tokio::spawn(route::<M>(
            wire.sender.subscribe(),
            wire.sender.clone(),
            channel.clone(),
            endpoint,
            pending.clone(),
            inbox_tx,
        ));

        let bus = Self {
            channel,
            endpoint,
            wire: wire.sender.clone(),
            pending,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            router,
            _message: PhantomData,
        };
        (bus, inbox_rx)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Fire-and-forget broadcast to the other endpoints of this session.
    pub fn emit(&self, message: &M) -> Result<()> {
        self.send(Uuid::new_v4(), None, false, serde_json::to_value(message)?)
    }

    /// Sends `message` and waits for the first correlated reply.
    pub async fn request<R: DeserializeOwned>(&self, message: &M) -> Result<R> {
        let payload = serde_json::to_value(message)?;
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        if let Err(err) = self.send(id, None, true, payload) {
            self.pending.lock().remove(&id);
            return Err(err);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(reply)) => Ok(serde_json::from_value(reply)?),
            Ok(Err(_)) => Err(HostedFieldsError::new(ErrorCode::BusClosed)),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(HostedFieldsError::new(ErrorCode::ClientRequestTimeout)
                    .with_message("Timed out waiting for a reply over the bus."))
            }
        }
    }

    fn send(&self, id: Uuid, reply_to: Option<Uuid>, expects_reply: bool, payload: Value) -> Result<()> {
        let envelope = Envelope {
            channel: self.channel.clone(),
            sender: self.endpoint,
            id,
            reply_to,
            expects_reply,
            payload,
        };
        transmit(&self.wire, &envelope)
    }
}

impl<M> Drop for Bus<M> {
    fn drop(&mut self) {
        self.router.abort();
    }
}

fn transmit(wire: &broadcast::Sender<String>, envelope: &Envelope) -> Result<()> {
    let text = serde_json::to_string(envelope)?;
    wire.send(text)
        .map(|_| ())
        .map_err(|_| HostedFieldsError::new(ErrorCode::BusClosed))
}

async fn route<M>(
    mut receiver: broadcast::Receiver<String>,
    wire: broadcast::Sender<String>,
    channel: String,
    endpoint: Uuid,
    pending: Pending,
    inbox: mpsc::UnboundedSender<Incoming<M>>,
) where
    M: DeserializeOwned + Send + 'static,
{
    loop {
        let text = match receiver.recv().await {
            Ok(text) => text,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Bus endpoint lagged behind the wire");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let envelope: Envelope = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(err) => {
                debug!(%err, "Ignoring malformed bus envelope");
                continue;
            }
        };
        if envelope.channel != channel || envelope.sender == endpoint {
            continue;
        }

        if let Some(request_id) = envelope.reply_to {
            match pending.lock().remove(&request_id) {
                Some(waiter) => {
                    let _ = waiter.send(envelope.payload);
                }
                None => debug!(%request_id, "Dropping reply with no pending request"),
            }
            continue;
        }

        let message: M = match serde_json::from_value(envelope.payload) {
            Ok(message) => message,
            Err(err) => {
                warn!(%err, "Ignoring bus message with unexpected payload");
                continue;
            }
        };

        let reply = envelope.expects_reply.then(|| {
            let wire = wire.clone();
            let channel = channel.clone();
            let request_id = envelope.id;
            ReplyOnce::new(move |payload: Value| {
                let answer = Envelope {
                    channel,
                    sender: endpoint,
                    id: Uuid::new_v4(),
                    reply_to: Some(request_id),
                    expects_reply: false,
                    payload,
                };
                if let Err(err) = transmit(&wire, &answer) {
                    warn!(%err, "Could not send bus reply");
                }
            })
        });

        // A closed inbox still lets this endpoint receive replies.
        let _ = inbox.send(Incoming { message, reply });
    }
}
