//! GEM equipment role

use crate::config::EquipmentConfig;
use crate::emitter::{run_emitter, Emission};
use crate::handlers::{build_dispatcher, EquipmentCore};
use parking_lot::Mutex;
use secs_core::{GemId, SecsError, SecsResult};
use secs_gem::messages::Identity;
use secs_gem::{AlarmReport, CommunicationLink, CommunicationState, ControlState, GemModel};
use secs_hsms::HsmsConnection;
use secs_transport::Connector;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Equipment side of a SECS/GEM link.
///
/// Owns the GEM model, serves the host's S1/S2/S5/S6/S7 primaries and
/// reports events (S6F11) and alarms (S5F1) through a single emitter task.
/// Populate [`model`](Self::model) before calling [`start`](Self::start);
/// application hooks for constants, the clock and process programs are
/// installed there as well.
pub struct GemEquipment {
    core: Arc<EquipmentCore>,
    connection: HsmsConnection,
    queue: Mutex<Option<mpsc::UnboundedReceiver<Emission>>>,
    emitter: Mutex<Option<JoinHandle<()>>>,
}

impl GemEquipment {
    /// Equipment using the TCP connector described by `config.hsms`
    pub fn new(config: EquipmentConfig) -> Self {
        let connector = config.hsms.connector();
        Self::with_connector(config, connector)
    }

    pub fn with_connector(config: EquipmentConfig, connector: Box<dyn Connector>) -> Self {
        let (emissions, queue) = mpsc::unbounded_channel();
        let identity = Identity::new(config.mdln.clone(), config.softrev.clone());
        let link =
            CommunicationLink::new(identity.to_item(), config.establish_communications_delay);
        let model = Arc::new(GemModel::with_program_limit(config.max_program_size));
        let hsms = config.hsms.clone();

        let core = Arc::new(EquipmentCore {
            config,
            model,
            control: Mutex::new(ControlState::default()),
            link,
            emissions,
        });
        let dispatcher = build_dispatcher(&core);
        let connection = HsmsConnection::new(hsms, connector, dispatcher);

        Self {
            core,
            connection,
            queue: Mutex::new(Some(queue)),
            emitter: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EquipmentConfig {
        &self.core.config
    }

    pub fn model(&self) -> &Arc<GemModel> {
        &self.core.model
    }

    pub fn connection(&self) -> &HsmsConnection {
        &self.connection
    }

    /// Start the HSMS session, the communication link and the emitter.
    ///
    /// An equipment can be started once.
    pub fn start(&self) -> SecsResult<()> {
        let queue = self
            .queue
            .lock()
            .take()
            .ok_or_else(|| SecsError::InvalidState("Equipment already started".to_string()))?;
        self.connection.start()?;
        self.core.link.attach(self.connection.clone());

        let handle = tokio::spawn(run_emitter(self.core.clone(), self.connection.clone(), queue));
        *self.emitter.lock() = Some(handle);
        log::info!(
            "Equipment {} {} started on {}",
            self.core.config.mdln,
            self.core.config.softrev,
            self.core.config.hsms.address
        );
        Ok(())
    }

    /// Stop the session; queued emissions are discarded
    pub async fn stop(&self) {
        self.connection.stop().await;
        self.core.link.detach();
        if let Some(handle) = self.emitter.lock().take() {
            handle.abort();
        }
        log::info!("Equipment {} stopped", self.core.config.mdln);
    }

    // Communication state

    pub fn communication_state(&self) -> CommunicationState {
        self.core.link.state()
    }

    pub async fn wait_for_communicating(&self, timeout: Duration) -> SecsResult<()> {
        self.core.link.wait_for_communicating(timeout).await
    }

    pub fn enable_communication(&self) {
        self.core.link.enable();
    }

    pub fn disable_communication(&self) {
        self.core.link.disable();
    }

    // Control state

    pub fn control_state(&self) -> ControlState {
        self.core.control_state()
    }

    /// Operator switch, e.g. to OnlineLocal or EquipmentOffline
    pub fn set_control_state(&self, state: ControlState) {
        let mut control = self.core.control.lock();
        if *control != state {
            log::info!("Control state {} -> {}", control.as_str(), state.as_str());
            *control = state;
        }
    }

    // Reporting

    /// Queue an S6F11 for `ceid`.
    ///
    /// Returns `false` when the event is disabled or has no linked reports.
    pub fn trigger_event(&self, ceid: &GemId) -> SecsResult<bool> {
        match self.core.model.trigger_event(ceid)? {
            Some(report) => {
                self.core.emit(Emission::Event(report));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Set an alarm; returns whether an S5F1 was queued
    pub fn set_alarm(&self, id: &GemId) -> SecsResult<bool> {
        let report = self.core.model.set_alarm(id)?;
        Ok(self.queue_alarm(report))
    }

    /// Clear an alarm; returns whether an S5F1 was queued
    pub fn clear_alarm(&self, id: &GemId) -> SecsResult<bool> {
        let report = self.core.model.clear_alarm(id)?;
        Ok(self.queue_alarm(report))
    }

    fn queue_alarm(&self, report: Option<AlarmReport>) -> bool {
        match report {
            Some(report) => {
                self.core.emit(Emission::Alarm(report));
                true
            }
            None => false,
        }
    }

    /// S1F1 to the host; hosts usually answer with an empty identity
    pub async fn are_you_there(&self) -> SecsResult<Option<Identity>> {
        let reply = self.connection.request(1, 1, None).await?;
        Identity::from_item(reply.require_body()?)
    }
}
