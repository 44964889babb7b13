//! Brings up the field frames of one hosted fields session.

use super::{BusEventSink, FieldFrame};
use crate::application::form_service::{FormHandle, FormService};
use crate::application::orchestrator::TokenizationOrchestrator;
use crate::config::HostedFieldsConfig;
use crate::domain::card_form::{CardForm, FormSettings};
use crate::domain::field::FieldKey;
use crate::domain::ports::{Client, Clock, InputEventSink};
use crate::error::Result;
use crate::infrastructure::bus::{Bus, Wire};
use crate::infrastructure::shared_state::{SharedStateChannel, SiblingFrame};
use crate::interfaces::protocol::FrameMessage;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Location every field frame of a session is served from.
pub const FRAME_LOCATION: &str = "hosted-fields/frame.html";

/// The frames of one session plus the state owner they share.
///
/// The first configured field's frame coordinates: it owns the bus endpoint
/// that input events leave through and answers tokenization requests.
pub struct FrameGroup {
    frames: Vec<Arc<FieldFrame>>,
    form: Arc<CardForm>,
    handle: FormHandle,
    orchestrator: Arc<TokenizationOrchestrator>,
    tasks: Vec<JoinHandle<()>>,
}

impl FrameGroup {
    /// Must be called inside a tokio runtime.
    pub fn launch(
        wire: &Wire,
        channel: &str,
        config: &HostedFieldsConfig,
        client: Arc<dyn Client>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let connect = || {
            let (bus, inbox) = Bus::<FrameMessage>::connect(wire, channel);
            (Arc::new(bus.with_request_timeout(config.frame_ready_timeout())), inbox)
        };
        let (coordinator_bus, coordinator_inbox) = connect();

        let settings = FormSettings::from_config(config, Some(client.configuration())).with_clock(clock);
        let sinks: Vec<Arc<dyn InputEventSink>> =
            vec![Arc::new(BusEventSink::new(coordinator_bus.clone()))];
        let service = FormService::with_sinks(settings, sinks);
        let form = service.form();
        let (handle, service_task) = service.spawn();

        let frames: Vec<Arc<FieldFrame>> = config
            .field_keys()
            .into_iter()
            .map(|key| FieldFrame::new(key, FRAME_LOCATION))
            .collect();
        let siblings: Vec<Arc<dyn SiblingFrame>> = frames
            .iter()
            .map(|frame| frame.clone() as Arc<dyn SiblingFrame>)
            .collect();
        let shared = SharedStateChannel::new(form.clone(), FRAME_LOCATION).share(&siblings);
        info!(channel, frames = frames.len(), shared, "Launched field frames");

        let orchestrator = Arc::new(TokenizationOrchestrator::new(
            form.clone(),
            client,
            config.clone(),
        ));

        let mut tasks = vec![service_task];
        let mut coordinator = Some((coordinator_bus, coordinator_inbox));
        for frame in &frames {
            let task = match coordinator.take() {
                Some((bus, inbox)) => frame.clone().run(bus, inbox, Some(orchestrator.clone())),
                None => {
                    let (bus, inbox) = connect();
                    frame.clone().run(bus, inbox, None)
                }
            };
            tasks.push(tokio::spawn(task));
        }

        Ok(Self {
            frames,
            form,
            handle,
            orchestrator,
            tasks,
        })
    }

    pub fn frames(&self) -> &[Arc<FieldFrame>] {
        &self.frames
    }

    pub fn frame(&self, key: FieldKey) -> Option<&Arc<FieldFrame>> {
        self.frames.iter().find(|frame| frame.key() == key)
    }

    pub fn form(&self) -> &Arc<CardForm> {
        &self.form
    }

    pub fn handle(&self) -> &FormHandle {
        &self.handle
    }

    pub fn orchestrator(&self) -> &Arc<TokenizationOrchestrator> {
        &self.orchestrator
    }
}

impl Drop for FrameGroup {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
