//! State owner for the card form.
//!
//! The service holds the one authoritative [`CardForm`]. Code running next to
//! it uses the `Arc` directly; everything else goes through a [`FormHandle`],
//! whose commands are applied one at a time by the service task.

use crate::domain::card_form::{CardForm, FormSettings};
use crate::domain::events::{CardSummary, FieldSnapshot, InputEvent};
use crate::domain::field::FieldKey;
use crate::domain::ports::InputEventSink;
use crate::error::{HostedFieldsError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

pub const EVENT_CAPACITY: usize = 256;

/// Value-free view of the whole form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSummary {
    pub is_empty: bool,
    pub invalid_field_keys: Vec<FieldKey>,
    pub cards: Vec<CardSummary>,
    pub fields: BTreeMap<FieldKey, FieldSnapshot>,
}

enum Command {
    SetValue {
        key: FieldKey,
        value: String,
        done: oneshot::Sender<()>,
    },
    SetFocus {
        key: FieldKey,
        is_focused: bool,
        done: oneshot::Sender<()>,
    },
    Clear {
        key: FieldKey,
        done: oneshot::Sender<()>,
    },
    Summary {
        reply: oneshot::Sender<FormSummary>,
    },
}

pub struct FormService {
    form: Arc<CardForm>,
    events: broadcast::Sender<InputEvent>,
}

impl FormService {
    pub fn new(settings: FormSettings) -> Self {
        Self::with_sinks(settings, Vec::new())
    }

    /// Also forwards every input event to `sinks`, after the local subscribers.
    pub fn with_sinks(settings: FormSettings, sinks: Vec<Arc<dyn InputEventSink>>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let mut tee: Vec<Arc<dyn InputEventSink>> = vec![Arc::new(events.clone())];
        tee.extend(sinks);
        Self {
            form: CardForm::new(settings, Arc::new(tee)),
            events,
        }
    }

    pub fn form(&self) -> Arc<CardForm> {
        self.form.clone()
    }

    /// Starts the service task. It stops once every handle is dropped.
    pub fn spawn(self) -> (FormHandle, JoinHandle<()>) {
        let (commands, mut inbox) = mpsc::unbounded_channel();
        let handle = FormHandle {
            commands,
            events: self.events.clone(),
        };
        let form = self.form;

        let task = tokio::spawn(async move {
            while let Some(command) = inbox.recv().await {
                match command {
                    Command::SetValue { key, value, done } => {
                        form.set_value(key, &value);
                        let _ = done.send(());
                    }
                    Command::SetFocus {
                        key,
                        is_focused,
                        done,
                    } => {
                        form.set_focus(key, is_focused);
                        let _ = done.send(());
                    }
                    Command::Clear { key, done } => {
                        form.clear_field(key);
                        let _ = done.send(());
                    }
                    Command::Summary { reply } => {
                        let _ = reply.send(summarize(&form));
                    }
                }
            }
            debug!("Form service stopped");
        });
        (handle, task)
    }
}

fn summarize(form: &CardForm) -> FormSummary {
    FormSummary {
        is_empty: form.is_empty(None),
        invalid_field_keys: form.invalid_field_keys(None),
        cards: form.card_summaries(),
        fields: form.field_snapshots(),
    }
}

/// Cloneable remote access to a running [`FormService`].
#[derive(Clone)]
pub struct FormHandle {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<InputEvent>,
}

impl FormHandle {
    async fn call<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        let stopped = || HostedFieldsError::internal("The form service has stopped.");
        self.commands.send(command(tx)).map_err(|_| stopped())?;
        rx.await.map_err(|_| stopped())
    }

    pub async fn set_value(&self, key: FieldKey, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        self.call(|done| Command::SetValue { key, value, done }).await
    }

    pub async fn set_focus(&self, key: FieldKey, is_focused: bool) -> Result<()> {
        self.call(|done| Command::SetFocus {
            key,
            is_focused,
            done,
        })
        .await
    }

    pub async fn clear(&self, key: FieldKey) -> Result<()> {
        self.call(|done| Command::Clear { key, done }).await
    }

    pub async fn summary(&self) -> Result<FormSummary> {
        self.call(|reply| Command::Summary { reply }).await
    }

    pub async fn fields(&self) -> Result<BTreeMap<FieldKey, FieldSnapshot>> {
        Ok(self.summary().await?.fields)
    }

    pub async fn card_types(&self) -> Result<Vec<CardSummary>> {
        Ok(self.summary().await?.cards)
    }

    /// Input events raised after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<InputEvent> {
        self.events.subscribe()
    }
}
