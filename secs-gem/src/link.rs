//! Establish-communications driver (S1F13/S1F14)

use crate::ack::CommAck;
use crate::communication::CommunicationState;
use crate::messages::parse_establish_reply;
use parking_lot::Mutex;
use secs_core::{Item, SecsError, SecsResult};
use secs_hsms::{ConnectionState, HsmsConnection};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

struct LinkInner {
    state: watch::Sender<CommunicationState>,
    /// S1F13 body sent by this side
    hello: Item,
    establish_delay: Duration,
    initiate: bool,
    kick: Notify,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// GEM communication state tracking for one HSMS connection.
///
/// When attached, the link follows the HSMS session state. On each select it
/// sends S1F13 and retries every `establish_delay` until accepted; on
/// deselect or disconnect it drops back to NOT COMMUNICATING at once, even
/// in the middle of a retry wait. The follower task holds a
/// clone of the link, so call [`detach`](Self::detach) to end it.
#[derive(Clone)]
pub struct CommunicationLink {
    inner: Arc<LinkInner>,
}

impl CommunicationLink {
    /// Enabled link that initiates the handshake with `hello` as S1F13 body
    pub fn new(hello: Item, establish_delay: Duration) -> Self {
        Self::build(hello, establish_delay, true)
    }

    /// Enabled link that only answers the peer's S1F13
    pub fn passive(hello: Item, establish_delay: Duration) -> Self {
        Self::build(hello, establish_delay, false)
    }

    fn build(hello: Item, establish_delay: Duration, initiate: bool) -> Self {
        let (state, _) = watch::channel(CommunicationState::NotCommunicating);
        Self {
            inner: Arc::new(LinkInner {
                state,
                hello,
                establish_delay,
                initiate,
                kick: Notify::new(),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> CommunicationState {
        *self.inner.state.borrow()
    }

    pub fn is_communicating(&self) -> bool {
        self.state().is_communicating()
    }

    pub fn subscribe(&self) -> watch::Receiver<CommunicationState> {
        self.inner.state.subscribe()
    }

    pub async fn wait_for_communicating(&self, timeout: Duration) -> SecsResult<()> {
        let mut receiver = self.inner.state.subscribe();
        tokio::time::timeout(timeout, receiver.wait_for(|state| state.is_communicating()))
            .await
            .map_err(|_| SecsError::Timeout)?
            .map_err(|_| SecsError::ConnectionClosed)?;
        Ok(())
    }

    fn transition(&self, to: CommunicationState) -> bool {
        self.inner.state.send_if_modified(|state| {
            if *state == to {
                return false;
            }
            if let Err(err) = state.validate_transition(to) {
                log::debug!("{}", err);
                return false;
            }
            log::info!("GEM communication {} -> {}", state.as_str(), to.as_str());
            *state = to;
            true
        })
    }

    pub fn enable(&self) {
        if self.transition(CommunicationState::NotCommunicating) {
            self.inner.kick.notify_one();
        }
    }

    pub fn disable(&self) {
        self.transition(CommunicationState::Disabled);
    }

    /// The peer sent S1F13; returns the COMMACK to answer with
    pub fn on_peer_establish(&self) -> CommAck {
        if !self.state().is_enabled() {
            return CommAck::Denied;
        }
        self.transition(CommunicationState::Communicating);
        CommAck::Accepted
    }

    /// Follow `connection`'s session state until detached
    pub fn attach(&self, connection: HsmsConnection) {
        let link = self.clone();
        let handle = tokio::spawn(async move { link.follow(connection).await });
        if let Some(old) = self.inner.task.lock().replace(handle) {
            old.abort();
        }
    }

    pub fn detach(&self) {
        if let Some(handle) = self.inner.task.lock().take() {
            handle.abort();
        }
        self.reset();
    }

    /// The HSMS session ended; DISABLED stays DISABLED
    fn reset(&self) {
        self.inner.state.send_if_modified(|state| {
            if !state.is_enabled() || *state == CommunicationState::NotCommunicating {
                return false;
            }
            log::info!(
                "GEM communication {} -> {}",
                state.as_str(),
                CommunicationState::NotCommunicating.as_str()
            );
            *state = CommunicationState::NotCommunicating;
            true
        });
    }

    async fn follow(&self, connection: HsmsConnection) {
        let mut session_state = connection.watch_state();
        // Generation of the selected session this link has handled
        let mut session = None;
        loop {
            let selected = session_state.borrow_and_update().is_selected();
            let generation = connection.session_generation();
            if !selected {
                self.reset();
                session = None;
            } else if session != Some(generation) {
                if session.is_some() {
                    // Dropped and reselected between two wakeups
                    self.reset();
                }
                session = Some(generation);
                self.establish(&connection, &session_state).await;
                continue;
            }

            tokio::select! {
                changed = session_state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = self.inner.kick.notified() => {
                    if connection.is_selected() {
                        self.establish(&connection, &session_state).await;
                    }
                }
            }
        }
    }

    /// Run S1F13 attempts until communicating or disabled.
    ///
    /// Losing the selected session ends the attempts at once and drops
    /// back to NOT COMMUNICATING.
    async fn establish(
        &self,
        connection: &HsmsConnection,
        session_state: &watch::Receiver<ConnectionState>,
    ) {
        if !self.inner.initiate {
            return;
        }
        let generation = connection.session_generation();
        let mut watcher = session_state.clone();
        let lost = async move {
            let _ = watcher
                .wait_for(|state| {
                    !state.is_selected() || connection.session_generation() != generation
                })
                .await;
        };
        tokio::select! {
            _ = lost => {
                log::debug!("HSMS session lost while establishing communications");
                self.reset();
            }
            _ = self.attempts(connection) => {}
        }
    }

    async fn attempts(&self, connection: &HsmsConnection) {
        loop {
            let state = self.state();
            if !state.is_enabled() || state.is_communicating() {
                return;
            }
            self.transition(CommunicationState::WaitCra);

            match connection.request(1, 13, Some(self.inner.hello.clone())).await {
                Ok(reply) => match reply.require_body().and_then(parse_establish_reply) {
                    Ok((CommAck::Accepted, _)) => {
                        self.transition(CommunicationState::Communicating);
                        return;
                    }
                    Ok((ack, _)) => log::warn!("Establish communications denied: {:?}", ack),
                    Err(err) => log::warn!("Bad S1F14: {}", err),
                },
                Err(err) => log::warn!("Establish communications failed: {}", err),
            }

            if !self.transition(CommunicationState::WaitDelay) {
                // Peer S1F13 or disable arrived meanwhile
                return;
            }
            // A peer S1F13 or disable also ends the wait
            let mut states = self.subscribe();
            let _ = tokio::time::timeout(
                self.inner.establish_delay,
                states.wait_for(|state| *state != CommunicationState::WaitDelay),
            )
            .await;
        }
    }
}
