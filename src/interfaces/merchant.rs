//! The merchant side of a hosted fields session.
//!
//! Runs in the merchant context and only ever talks to the frames over the bus.

use crate::application::orchestrator::{self, TokenizeOptions, TokenizePayload};
use crate::config::{FieldOptions, HostedFieldsConfig};
use crate::domain::events::InputEvent;
use crate::domain::field::FieldKey;
use crate::error::{ErrorCode, HostedFieldsError, Result};
use crate::infrastructure::bus::{Bus, Incoming, Wire};
use crate::interfaces::protocol::FrameMessage;
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub const EVENT_CAPACITY: usize = 256;
/// Extra time the merchant waits for a tokenization reply beyond the gateway timeout.
const REPLY_GRACE: Duration = Duration::from_secs(5);

pub struct HostedFields {
    bus: Bus<FrameMessage>,
    config: HostedFieldsConfig,
    ready: watch::Receiver<BTreeSet<FieldKey>>,
    events: broadcast::Sender<InputEvent>,
    listener: JoinHandle<()>,
}

impl HostedFields {
    /// Joins session `channel` and starts answering frame handshakes.
    /// Must be called inside a tokio runtime.
    pub fn connect(wire: &Wire, channel: &str, config: HostedFieldsConfig) -> Self {
        let (bus, inbox) = Bus::connect(wire, channel);
        let bus = bus.with_request_timeout(config.tokenize_timeout() + REPLY_GRACE);
        let (ready_tx, ready) = watch::channel(BTreeSet::new());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let listener = tokio::spawn(listen(inbox, config.clone(), ready_tx, events.clone()));
        Self {
            bus,
            config,
            ready,
            events,
            listener,
        }
    }

    /// Field keys whose frames have announced themselves.
    pub fn ready_fields(&self) -> BTreeSet<FieldKey> {
        self.ready.borrow().clone()
    }

    /// Waits until every configured frame has announced itself.
    pub async fn wait_ready(&self) -> Result<()> {
        let expected: BTreeSet<FieldKey> = self.config.field_keys().into_iter().collect();
        let mut ready = self.ready.clone();
        let wait = ready.wait_for(|fields| expected.is_subset(fields));
        match tokio::time::timeout(self.config.frame_ready_timeout(), wait).await {
            Ok(Ok(_)) => {
                info!(fields = expected.len(), "Hosted fields ready");
                Ok(())
            }
            Ok(Err(_)) => Err(HostedFieldsError::new(ErrorCode::BusClosed)),
            Err(_) => Err(HostedFieldsError::new(ErrorCode::HostedFieldsTimeout)),
        }
    }

    /// Resolves a merchant-supplied field name to a configured field.
    pub fn field(&self, name: &str) -> Result<FieldKey> {
        let key: FieldKey = name.parse().map_err(|_| {
            HostedFieldsError::new(ErrorCode::HostedFieldsInvalidFieldKey)
                .with_message(format!("\"{name}\" is not a valid field."))
        })?;
        self.present(key)?;
        Ok(key)
    }

    fn present(&self, key: FieldKey) -> Result<()> {
        if self.config.field_options(key).is_none() {
            return Err(HostedFieldsError::new(ErrorCode::HostedFieldsFieldNotPresent)
                .with_message(format!("Cannot act on \"{key}\": the field is not present.")));
        }
        Ok(())
    }

    pub async fn tokenize(&self, options: TokenizeOptions) -> Result<TokenizePayload> {
        if let Some(fields) = &options.fields_to_tokenize {
            for &key in fields {
                self.present(key)?;
            }
        }
        let reply: Value = self
            .bus
            .request(&FrameMessage::TokenizationRequest { options })
            .await?;
        orchestrator::from_reply(reply)
    }

    pub fn focus(&self, field: &str) -> Result<()> {
        let field = self.field(field)?;
        self.bus.emit(&FrameMessage::TriggerInputFocus { field })
    }

    pub fn set_placeholder(&self, field: &str, text: &str) -> Result<()> {
        let field = self.field(field)?;
        self.bus.emit(&FrameMessage::SetPlaceholder {
            field,
            text: text.to_string(),
        })
    }

    pub fn add_class(&self, field: &str, class: &str) -> Result<()> {
        let field = self.field(field)?;
        self.bus.emit(&FrameMessage::AddClass {
            field,
            class: class.to_string(),
        })
    }

    pub fn remove_class(&self, field: &str, class: &str) -> Result<()> {
        let field = self.field(field)?;
        self.bus.emit(&FrameMessage::RemoveClass {
            field,
            class: class.to_string(),
        })
    }

    pub fn clear(&self, field: &str) -> Result<()> {
        let field = self.field(field)?;
        self.bus.emit(&FrameMessage::ClearField { field })
    }

    /// Merchant-facing input events received after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<InputEvent> {
        self.events.subscribe()
    }
}

impl Drop for HostedFields {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

async fn listen(
    mut inbox: mpsc::UnboundedReceiver<Incoming<FrameMessage>>,
    config: HostedFieldsConfig,
    ready: watch::Sender<BTreeSet<FieldKey>>,
    events: broadcast::Sender<InputEvent>,
) {
    while let Some(Incoming { message, reply }) = inbox.recv().await {
        match message {
            FrameMessage::FrameReady { field } => {
                match (reply, serde_json::to_value(frame_options(&config, field))) {
                    (Some(reply), Ok(options)) => {
                        reply.settle(options);
                    }
                    (_, Err(err)) => debug!(%err, "Could not encode field options"),
                    (None, _) => {}
                }
                ready.send_modify(|fields| {
                    fields.insert(field);
                });
            }
            FrameMessage::InputEvent { event } => {
                let _ = events.send(event);
            }
            _ => {}
        }
    }
}

/// Options a frame gets when it announces itself.
pub fn frame_options(config: &HostedFieldsConfig, field: FieldKey) -> FieldOptions {
    config.field_options(field).cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosted(keys: &[FieldKey]) -> (Wire, HostedFields) {
        let wire = Wire::new();
        let hosted = HostedFields::connect(&wire, "merchant", HostedFieldsConfig::with_fields(keys));
        (wire, hosted)
    }

    #[tokio::test]
    async fn test_field_names_are_checked_before_sending() {
        let (_wire, hosted) = hosted(&[FieldKey::Number, FieldKey::Cvv]);

        let err = hosted.focus("cardNumber").unwrap_err();
        assert_eq!(err.code, ErrorCode::HostedFieldsInvalidFieldKey);

        let err = hosted.add_class("postalCode", "invalid").unwrap_err();
        assert_eq!(err.code, ErrorCode::HostedFieldsFieldNotPresent);

        assert!(hosted.set_placeholder("cvv", "CVC").is_ok());
    }

    #[tokio::test]
    async fn test_tokenize_rejects_fields_not_present() {
        let (_wire, hosted) = hosted(&[FieldKey::Number]);
        let options = TokenizeOptions {
            fields_to_tokenize: Some(vec![FieldKey::Cvv]),
            ..TokenizeOptions::default()
        };
        let err = hosted.tokenize(options).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::HostedFieldsFieldNotPresent);
    }

    #[tokio::test]
    async fn test_frame_ready_is_answered_with_field_options() {
        let wire = Wire::new();
        let mut config = HostedFieldsConfig::with_fields(&[FieldKey::Cvv]);
        config.frame_ready_timeout_ms = 1_000;
        if let Some(options) = config.fields.get_mut("cvv") {
            options.placeholder = Some("CVC".into());
        }
        let hosted = HostedFields::connect(&wire, "ready", config);

        let (frame_bus, _inbox) = Bus::<FrameMessage>::connect(&wire, "ready");
        let options: FieldOptions = frame_bus
            .request(&FrameMessage::FrameReady { field: FieldKey::Cvv })
            .await
            .unwrap();
        assert_eq!(options.placeholder.as_deref(), Some("CVC"));

        hosted.wait_ready().await.unwrap();
        assert!(hosted.ready_fields().contains(&FieldKey::Cvv));
    }

    #[tokio::test]
    async fn test_wait_ready_times_out_without_frames() {
        let wire = Wire::new();
        let mut config = HostedFieldsConfig::with_fields(&[FieldKey::Number]);
        config.frame_ready_timeout_ms = 20;
        let hosted = HostedFields::connect(&wire, "lonely", config);
        let err = hosted.wait_ready().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::HostedFieldsTimeout);
    }
}
