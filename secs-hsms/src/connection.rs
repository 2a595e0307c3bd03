//! HSMS session driver
//!
//! [`HsmsConnection`] owns one logical HSMS link. A supervisor task
//! establishes TCP connections through a [`Connector`], runs the select
//! procedure, reads frames, answers control messages and hands data
//! messages to the [`Dispatcher`]. On disconnect it reconnects according
//! to the configured policy.

use crate::config::{ConnectMode, HsmsConfig};
use crate::dispatcher::Dispatcher;
use crate::framer::{FrameReader, FrameWriter, Incoming};
use crate::header::{
    DeselectStatus, MessageHeader, RejectReason, SType, SelectStatus, CONTROL_SESSION_ID,
    HEADER_LENGTH, LENGTH_PREFIX_LENGTH,
};
use crate::message::{Frame, Message};
use crate::s9;
use crate::state::ConnectionState;
use crate::statistics::SessionStatistics;
use crate::transaction::{PendingReply, TransactionManager};
use parking_lot::Mutex;
use secs_core::{Item, SecsError, SecsResult};
use secs_transport::{BoxedWriter, Connector, StreamPair};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;

const EVENT_CAPACITY: usize = 32;

/// Session lifecycle notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    Selected,
    Deselected,
    Disconnected,
    /// The reconnect policy gave up; the supervisor has stopped
    ReconnectExhausted,
}

#[derive(Default)]
struct SessionTasks {
    t7: Option<JoinHandle<()>>,
    linktest: Option<JoinHandle<()>>,
    select: Option<JoinHandle<()>>,
}

impl SessionTasks {
    fn abort_all(&mut self) {
        for handle in [self.t7.take(), self.linktest.take(), self.select.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
    }
}

struct Inner {
    config: HsmsConfig,
    dispatcher: Arc<Dispatcher>,
    transactions: TransactionManager,
    writer: tokio::sync::Mutex<Option<FrameWriter<BoxedWriter>>>,
    state: watch::Sender<ConnectionState>,
    /// Bumped on every select, before the state watch sees `Selected`
    generation: AtomicU64,
    events: broadcast::Sender<SessionEvent>,
    statistics: Mutex<SessionStatistics>,
    shutdown: watch::Sender<bool>,
    /// Wakes the reader of the current session to tear it down
    kill: Mutex<Option<Arc<Notify>>>,
    tasks: Mutex<SessionTasks>,
    connector: Mutex<Option<Box<dyn Connector>>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to an HSMS session; cheap to clone
#[derive(Clone)]
pub struct HsmsConnection {
    inner: Arc<Inner>,
}

impl HsmsConnection {
    pub fn new(config: HsmsConfig, connector: Box<dyn Connector>, dispatcher: Dispatcher) -> Self {
        let (state, _) = watch::channel(ConnectionState::NotConnected);
        let (shutdown, _) = watch::channel(false);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                config,
                dispatcher: Arc::new(dispatcher),
                transactions: TransactionManager::new(),
                writer: tokio::sync::Mutex::new(None),
                state,
                generation: AtomicU64::new(0),
                events,
                statistics: Mutex::new(SessionStatistics::new()),
                shutdown,
                kill: Mutex::new(None),
                tasks: Mutex::new(SessionTasks::default()),
                connector: Mutex::new(Some(connector)),
                supervisor: Mutex::new(None),
            }),
        }
    }

    /// Connection over TCP in the configured role
    pub fn from_config(config: HsmsConfig, dispatcher: Dispatcher) -> Self {
        let connector = config.connector();
        Self::new(config, connector, dispatcher)
    }

    pub fn config(&self) -> &HsmsConfig {
        &self.inner.config
    }

    /// Spawn the supervisor task
    pub fn start(&self) -> SecsResult<()> {
        self.inner.config.validate()?;
        let connector = self
            .inner
            .connector
            .lock()
            .take()
            .ok_or_else(|| SecsError::InvalidState("HSMS connection already started".to_string()))?;
        self.inner.shutdown.send_replace(false);
        let conn = self.clone();
        let handle = tokio::spawn(async move { conn.run_supervisor(connector).await });
        *self.inner.supervisor.lock() = Some(handle);
        Ok(())
    }

    /// Separate if selected, end the session and join the supervisor
    pub async fn stop(&self) {
        if self.is_selected() {
            if let Err(err) = self.separate().await {
                log::debug!("Separate during stop failed: {}", err);
            }
        }
        self.inner.shutdown.send_replace(true);
        self.disconnect();
        let handle = self.inner.supervisor.lock().take();
        if let Some(mut handle) = handle {
            if tokio::time::timeout(self.inner.config.t6, &mut handle).await.is_err() {
                log::warn!("HSMS supervisor did not stop within T6, aborting");
                handle.abort();
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn is_selected(&self) -> bool {
        self.state().is_selected()
    }

    /// Number of selects so far; tells one selected session from the next
    pub fn session_generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Latest-value view of the session state
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Wait until the session reaches `target`
    pub async fn wait_for_state(
        &self,
        target: ConnectionState,
        timeout: Duration,
    ) -> SecsResult<()> {
        let mut receiver = self.inner.state.subscribe();
        tokio::time::timeout(timeout, receiver.wait_for(|state| *state == target))
            .await
            .map_err(|_| SecsError::Timeout)?
            .map_err(|_| SecsError::ConnectionClosed)?;
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn statistics(&self) -> SessionStatistics {
        self.inner.statistics.lock().clone()
    }

    pub fn pending_transactions(&self) -> usize {
        self.inner.transactions.pending_count()
    }

    /// End the current session; the supervisor decides whether to reconnect
    pub fn disconnect(&self) {
        if let Some(kill) = self.inner.kill.lock().as_ref() {
            kill.notify_one();
        }
    }

    /// Send a data message with fresh system bytes.
    ///
    /// Returns a pending reply handle when the W-bit is set.
    pub async fn send(&self, mut message: Message) -> SecsResult<Option<PendingReply>> {
        if !self.is_selected() {
            return Err(SecsError::InvalidState(format!(
                "Cannot send {} while {}",
                message.name(),
                self.state().as_str()
            )));
        }
        message.header.session_id = self.inner.config.session_id;
        message.header.system_bytes = self.inner.transactions.next_system_bytes();
        let pending = if message.w_bit() {
            Some(
                self.inner
                    .transactions
                    .register(&message.header, self.inner.config.t3)?,
            )
        } else {
            None
        };
        self.write_message(&message).await?;
        Ok(pending)
    }

    /// Send a primary and wait up to T3 for its reply
    pub async fn request(
        &self,
        stream: u8,
        function: u8,
        body: Option<Item>,
    ) -> SecsResult<Message> {
        self.request_with_timeout(stream, function, body, self.inner.config.t3)
            .await
    }

    /// Send a primary and wait up to `timeout` for its reply.
    ///
    /// S9 answers and SxF0 aborts surface as `PeerError`, a Reject.req
    /// as `Rejected(reason)`.
    pub async fn request_with_timeout(
        &self,
        stream: u8,
        function: u8,
        body: Option<Item>,
        timeout: Duration,
    ) -> SecsResult<Message> {
        let pending = self
            .send(Message::primary(stream, function, body))
            .await?
            .ok_or_else(|| SecsError::Protocol("Primary sent without W-bit".to_string()))?;
        let request = *pending.header();
        match pending.wait_timeout(timeout).await {
            Ok(reply) => check_reply(&request, reply),
            Err(SecsError::Timeout) => {
                self.on_reply_timeout(&request).await;
                Err(SecsError::Timeout)
            }
            Err(err) => Err(err),
        }
    }

    /// Send a primary without W-bit
    pub async fn notify(&self, stream: u8, function: u8, body: Option<Item>) -> SecsResult<()> {
        self.send(Message::data(stream, function, false, body))
            .await
            .map(|_| ())
    }

    /// Send a reply or S9 message keeping its system bytes
    pub async fn send_reply(&self, reply: &Message) -> SecsResult<()> {
        if !self.is_selected() {
            return Err(SecsError::InvalidState(format!(
                "Cannot reply {} while {}",
                reply.name(),
                self.state().as_str()
            )));
        }
        self.write_message(reply).await?;
        if reply.stream() == 9 {
            self.inner.statistics.lock().increment_s9_sent();
        }
        Ok(())
    }

    /// Run the select procedure (active role)
    pub async fn select(&self) -> SecsResult<()> {
        let state = self.state();
        if state != ConnectionState::NotSelected {
            return Err(SecsError::InvalidState(format!(
                "Select requires NOT SELECTED, state is {}",
                state.as_str()
            )));
        }
        match self.control_transaction(SType::SelectReq).await {
            Ok(response) if response.status() == SelectStatus::Accepted as u8 => Ok(()),
            Ok(response) => {
                log::warn!("Select refused with status {}", response.status());
                self.disconnect();
                Err(SecsError::SelectRejected(response.status()))
            }
            Err(err) => {
                self.disconnect();
                Err(err)
            }
        }
    }

    pub async fn deselect(&self) -> SecsResult<()> {
        if !self.is_selected() {
            return Err(SecsError::InvalidState(
                "Deselect requires SELECTED".to_string(),
            ));
        }
        let response = self.control_transaction(SType::DeselectReq).await?;
        if response.status() == DeselectStatus::Accepted as u8 {
            Ok(())
        } else {
            Err(SecsError::Protocol(format!(
                "Deselect refused with status {}",
                response.status()
            )))
        }
    }

    /// Round-trip a linktest; failure ends the session
    pub async fn linktest(&self) -> SecsResult<Duration> {
        if !self.state().is_connected() {
            return Err(SecsError::InvalidState(
                "Linktest requires a connection".to_string(),
            ));
        }
        let started = Instant::now();
        match self.control_transaction(SType::LinktestReq).await {
            Ok(_) => {
                self.inner.statistics.lock().increment_linktests();
                Ok(started.elapsed())
            }
            Err(err) => {
                log::warn!("Linktest failed: {}", err);
                self.disconnect();
                Err(err)
            }
        }
    }

    /// Send separate.req and end the session
    pub async fn separate(&self) -> SecsResult<()> {
        if !self.state().is_connected() {
            return Ok(());
        }
        let header = MessageHeader::control(
            SType::SeparateReq,
            self.inner.transactions.next_system_bytes(),
        );
        let result = self.write_message(&Message::control(header)).await;
        self.disconnect();
        result
    }

    async fn control_transaction(&self, s_type: SType) -> SecsResult<MessageHeader> {
        let header = MessageHeader::control(s_type, self.inner.transactions.next_system_bytes());
        let pending = self.inner.transactions.register(&header, self.inner.config.t6)?;
        self.write_message(&Message::control(header)).await?;
        let response = match pending.wait().await {
            Ok(response) => response.header,
            Err(SecsError::Timeout) => {
                log::warn!("T6 expired waiting for {} response", s_type.as_str());
                self.inner.statistics.lock().increment_control_timeouts();
                return Err(SecsError::Timeout);
            }
            Err(err) => return Err(err),
        };
        match response.s_type() {
            Some(SType::RejectReq) => Err(SecsError::Rejected(response.status())),
            kind if kind == s_type.response() => Ok(response),
            _ => Err(SecsError::Protocol(format!(
                "Unexpected response {} to {}",
                response,
                s_type.as_str()
            ))),
        }
    }

    async fn on_reply_timeout(&self, request: &MessageHeader) {
        log::warn!("T3 expired waiting for reply to {}", request);
        self.inner.statistics.lock().increment_reply_timeouts();
        if self.inner.config.send_s9f9_on_t3 {
            if let Err(err) = self.send_reply(&s9::transaction_timeout(request)).await {
                log::debug!("Could not send S9F9: {}", err);
            }
        }
    }

    async fn write_message(&self, message: &Message) -> SecsResult<()> {
        let bytes = message.encode()?;
        let result = {
            let mut guard = self.inner.writer.lock().await;
            match guard.as_mut() {
                Some(writer) => writer.write_frame(&bytes).await,
                None => Err(SecsError::ConnectionClosed),
            }
        };
        match result {
            Ok(()) => {
                log::debug!("TX {}", message);
                self.inner.statistics.lock().record_sent(bytes.len());
                Ok(())
            }
            Err(SecsError::ConnectionClosed) => Err(SecsError::ConnectionClosed),
            Err(err) => {
                log::error!("Write of {} failed: {}", message.header, err);
                self.disconnect();
                Err(err)
            }
        }
    }

    async fn send_control(&self, header: MessageHeader) {
        if let Err(err) = self.write_message(&Message::control(header)).await {
            log::debug!("Could not send {}: {}", header, err);
        }
    }

    async fn send_reject(&self, rejected: &MessageHeader, reason: RejectReason) {
        log::warn!("Rejecting {} ({:?})", rejected, reason);
        self.inner.statistics.lock().increment_rejects_sent();
        self.send_control(MessageHeader::reject(rejected, reason)).await;
    }

    fn set_state(&self, new_state: ConnectionState) -> bool {
        self.inner.state.send_if_modified(|state| {
            if *state == new_state {
                return false;
            }
            if let Err(err) = state.validate_transition(new_state) {
                log::warn!("{}", err);
                return false;
            }
            log::debug!("HSMS state {} -> {}", state.as_str(), new_state.as_str());
            if new_state == ConnectionState::Selected {
                self.inner.generation.fetch_add(1, Ordering::SeqCst);
            }
            *state = new_state;
            true
        })
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    fn start_t7(&self) {
        let conn = self.clone();
        let t7 = self.inner.config.t7;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(t7).await;
            if conn.state() == ConnectionState::NotSelected {
                log::warn!("T7 expired without select");
                conn.inner.statistics.lock().increment_control_timeouts();
                conn.disconnect();
            }
        });
        if let Some(old) = self.inner.tasks.lock().t7.replace(handle) {
            old.abort();
        }
    }

    fn on_selected(&self) {
        if !self.set_state(ConnectionState::Selected) {
            return;
        }
        log::info!("HSMS session {} selected", self.inner.config.session_id);
        {
            let mut tasks = self.inner.tasks.lock();
            if let Some(t7) = tasks.t7.take() {
                t7.abort();
            }
            if let Some(interval) = self.inner.config.linktest_interval {
                if let Some(old) = tasks.linktest.replace(self.spawn_linktest(interval)) {
                    old.abort();
                }
            }
        }
        self.emit(SessionEvent::Selected);
    }

    fn on_deselected(&self) {
        if !self.set_state(ConnectionState::NotSelected) {
            return;
        }
        log::info!("HSMS session {} deselected", self.inner.config.session_id);
        if let Some(linktest) = self.inner.tasks.lock().linktest.take() {
            linktest.abort();
        }
        if self.inner.config.mode == ConnectMode::Passive {
            self.start_t7();
        }
        self.emit(SessionEvent::Deselected);
    }

    fn spawn_linktest(&self, interval: Duration) -> JoinHandle<()> {
        let conn = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !conn.is_selected() {
                    break;
                }
                if conn.linktest().await.is_err() {
                    break;
                }
            }
        })
    }

    async fn run_supervisor(self, mut connector: Box<dyn Connector>) {
        let mut shutdown = self.inner.shutdown.subscribe();
        let mut failures: u32 = 0;
        let mut sessions: u64 = 0;
        log::info!("HSMS supervisor started on {}", connector.description());

        loop {
            if *shutdown.borrow() {
                break;
            }
            self.set_state(ConnectionState::Connecting);
            let established = tokio::select! {
                result = connector.establish() => result,
                _ = shutdown.changed() => break,
            };

            let failed = match established {
                Ok(pair) => {
                    if sessions > 0 {
                        self.inner.statistics.lock().increment_reconnects();
                    }
                    sessions += 1;
                    let selected = self.run_session(pair, &mut shutdown).await;
                    !selected
                }
                Err(err) => {
                    log::warn!("Connection via {} failed: {}", connector.description(), err);
                    self.set_state(ConnectionState::NotConnected);
                    true
                }
            };
            failures = if failed { failures + 1 } else { 0 };

            if *shutdown.borrow() || !self.inner.config.auto_reconnect {
                break;
            }
            if let Some(max) = self.inner.config.max_reconnect_attempts {
                if failures >= max {
                    log::error!("Giving up after {} consecutive connection failures", failures);
                    self.emit(SessionEvent::ReconnectExhausted);
                    break;
                }
            }
            if self.inner.config.mode == ConnectMode::Active || failed {
                let delay = self.inner.config.reconnect_delay(failures);
                log::debug!("Next connection attempt in {:?}", delay);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => break,
                }
            }
        }

        self.set_state(ConnectionState::NotConnected);
        *self.inner.connector.lock() = Some(connector);
        log::info!("HSMS supervisor stopped");
    }

    /// Drive one TCP connection; returns whether it reached SELECTED
    async fn run_session(&self, pair: StreamPair, shutdown: &mut watch::Receiver<bool>) -> bool {
        let kill = Arc::new(Notify::new());
        *self.inner.kill.lock() = Some(kill.clone());
        *self.inner.writer.lock().await = Some(FrameWriter::new(pair.writer));
        let mut reader = FrameReader::new(
            pair.reader,
            self.inner.config.t8,
            self.inner.config.max_message_size,
        );

        match pair.peer {
            Some(peer) => log::info!("HSMS connection established with {}", peer),
            None => log::info!("HSMS connection established"),
        }
        self.set_state(ConnectionState::NotSelected);
        self.emit(SessionEvent::Connected);
        self.start_t7();
        if self.inner.config.mode == ConnectMode::Active {
            let conn = self.clone();
            let handle = tokio::spawn(async move {
                if let Err(err) = conn.select().await {
                    log::warn!("Select failed: {}", err);
                }
            });
            self.inner.tasks.lock().select = Some(handle);
        }

        let mut reached_selected = false;
        loop {
            tokio::select! {
                incoming = reader.read_frame() => match incoming {
                    Ok(Incoming::Frame(frame)) => {
                        let length = LENGTH_PREFIX_LENGTH + HEADER_LENGTH + frame.body.len();
                        self.inner.statistics.lock().record_received(length);
                        self.handle_frame(frame).await;
                    }
                    Ok(Incoming::TooLong { header, length }) => {
                        log::warn!("Discarded {} byte frame {}", length, header);
                        if header.is_data() && self.is_selected() {
                            if let Err(err) = self.send_reply(&s9::data_too_long(&header)).await {
                                log::debug!("Could not send S9F11: {}", err);
                            }
                        }
                    }
                    Err(SecsError::ConnectionClosed) => {
                        log::info!("Peer closed the connection");
                        break;
                    }
                    Err(SecsError::Timeout) => {
                        log::warn!("T8 expired inside a frame");
                        self.inner.statistics.lock().increment_control_timeouts();
                        break;
                    }
                    Err(err) => {
                        log::error!("Read failed: {}", err);
                        break;
                    }
                },
                _ = kill.notified() => break,
                _ = shutdown.changed() => break,
            }
            reached_selected |= self.is_selected();
        }

        self.teardown().await;
        reached_selected
    }

    async fn teardown(&self) {
        self.inner.tasks.lock().abort_all();
        *self.inner.kill.lock() = None;
        let writer = self.inner.writer.lock().await.take();
        if let Some(mut writer) = writer {
            let _ = tokio::time::timeout(self.inner.config.t6, writer.shutdown()).await;
        }
        let failed = self.inner.transactions.fail_all();
        if failed > 0 {
            log::warn!("{} pending transactions lost with the connection", failed);
        }
        self.set_state(ConnectionState::NotConnected);
        log::info!("HSMS connection closed");
        self.emit(SessionEvent::Disconnected);
    }

    async fn handle_frame(&self, frame: Frame) {
        let header = frame.header;
        log::debug!("RX {}", header);
        if header.p_type != 0 {
            self.send_reject(&header, RejectReason::PTypeNotSupported).await;
            return;
        }
        match header.s_type() {
            Some(SType::Data) => self.handle_data(frame).await,
            Some(SType::SelectReq) => self.handle_select_req(&header).await,
            Some(SType::SelectRsp) => {
                let accepted = header.status() == SelectStatus::Accepted as u8;
                if accepted && self.inner.transactions.is_pending(header.system_bytes) {
                    self.on_selected();
                }
                self.complete_control(header);
            }
            Some(SType::DeselectReq) => {
                if self.is_selected() {
                    self.on_deselected();
                    self.send_control(MessageHeader::control_response(
                        &header,
                        SType::DeselectRsp,
                        DeselectStatus::Accepted as u8,
                    ))
                    .await;
                } else {
                    self.send_control(MessageHeader::control_response(
                        &header,
                        SType::DeselectRsp,
                        DeselectStatus::NotEstablished as u8,
                    ))
                    .await;
                }
            }
            Some(SType::DeselectRsp) => {
                let accepted = header.status() == DeselectStatus::Accepted as u8;
                if accepted && self.inner.transactions.is_pending(header.system_bytes) {
                    self.on_deselected();
                }
                self.complete_control(header);
            }
            Some(SType::LinktestReq) => {
                self.send_control(MessageHeader::control_response(&header, SType::LinktestRsp, 0))
                    .await;
            }
            Some(SType::LinktestRsp) | Some(SType::RejectReq) => self.complete_control(header),
            Some(SType::SeparateReq) => {
                log::info!("Peer requested separate");
                self.disconnect();
            }
            None => self.send_reject(&header, RejectReason::STypeNotSupported).await,
        }
    }

    async fn handle_select_req(&self, header: &MessageHeader) {
        let config = &self.inner.config;
        if header.session_id != CONTROL_SESSION_ID && header.session_id != config.session_id {
            log::warn!(
                "Select for session {} refused, configured session is {}",
                header.session_id,
                config.session_id
            );
            self.send_control(MessageHeader::control_response(
                header,
                SType::SelectRsp,
                SelectStatus::AlreadyActive as u8,
            ))
            .await;
            self.disconnect();
            return;
        }
        let status = if self.is_selected() {
            SelectStatus::AlreadyActive
        } else {
            self.on_selected();
            SelectStatus::Accepted
        };
        self.send_control(MessageHeader::control_response(
            header,
            SType::SelectRsp,
            status as u8,
        ))
        .await;
    }

    fn complete_control(&self, header: MessageHeader) {
        if let Err(message) = self.inner.transactions.complete(Message::control(header)) {
            log::debug!("Discarding unexpected {}", message.header);
        }
    }

    async fn handle_data(&self, frame: Frame) {
        let header = frame.header;
        if !self.is_selected() {
            self.send_reject(&header, RejectReason::EntityNotSelected).await;
            return;
        }

        let is_reply = header.function() % 2 == 0;
        let answers_pending =
            header.stream() == 9 && self.inner.transactions.is_pending(header.system_bytes);
        if is_reply || answers_pending {
            let reply = frame.to_message().unwrap_or_else(|err| {
                log::warn!("Malformed body in reply {}: {}", header, err);
                Message::new(header, None)
            });
            if let Err(reply) = self.inner.transactions.complete(reply) {
                log::debug!("Discarding unmatched reply {}", reply.header);
            }
            return;
        }

        self.inner.statistics.lock().increment_primaries_received();
        let conn = self.clone();
        tokio::spawn(async move {
            if let Some(reply) = conn.inner.dispatcher.dispatch(&frame).await {
                if let Err(err) = conn.send_reply(&reply).await {
                    log::warn!("Could not answer {}: {}", frame.header, err);
                }
            }
        });
    }
}

fn check_reply(request: &MessageHeader, reply: Message) -> SecsResult<Message> {
    if reply.header.s_type() == Some(SType::RejectReq) {
        return Err(SecsError::Rejected(reply.header.status()));
    }
    if reply.stream() == 9 || reply.function() == 0 {
        return Err(SecsError::PeerError {
            stream: reply.stream(),
            function: reply.function(),
        });
    }
    if reply.stream() != request.stream()
        || reply.function() != request.function().wrapping_add(1)
    {
        return Err(SecsError::Protocol(format!(
            "Unexpected reply {} to {}",
            reply.name(),
            request
        )));
    }
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::handler_fn;
    use async_trait::async_trait;
    use mockall::mock;
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
    use tokio_test::assert_ok;

    const WAIT: Duration = Duration::from_secs(2);

    struct DuplexConnector {
        stream: Option<DuplexStream>,
    }

    #[async_trait]
    impl Connector for DuplexConnector {
        async fn establish(&mut self) -> SecsResult<StreamPair> {
            match self.stream.take() {
                Some(stream) => Ok(StreamPair::from_stream(stream)),
                None => std::future::pending::<SecsResult<StreamPair>>().await,
            }
        }

        fn description(&self) -> String {
            "duplex".to_string()
        }
    }

    mock! {
        Link {}

        #[async_trait]
        impl Connector for Link {
            async fn establish(&mut self) -> SecsResult<StreamPair>;
            fn description(&self) -> String;
        }
    }

    struct Peer {
        reader: FrameReader<ReadHalf<DuplexStream>>,
        writer: FrameWriter<WriteHalf<DuplexStream>>,
    }

    impl Peer {
        fn new(stream: DuplexStream) -> Self {
            let (reader, writer) = tokio::io::split(stream);
            Self {
                reader: FrameReader::new(reader, WAIT, 1 << 20),
                writer: FrameWriter::new(writer),
            }
        }

        async fn send(&mut self, message: Message) {
            self.writer
                .write_frame(&message.encode().unwrap())
                .await
                .unwrap();
        }

        async fn recv(&mut self) -> Frame {
            match tokio::time::timeout(WAIT, self.reader.read_frame())
                .await
                .unwrap()
                .unwrap()
            {
                Incoming::Frame(frame) => frame,
                other => panic!("unexpected {:?}", other),
            }
        }

        async fn select(&mut self) {
            self.send(Message::control(MessageHeader::control(SType::SelectReq, 1)))
                .await;
            let response = self.recv().await;
            assert_eq!(response.header.s_type(), Some(SType::SelectRsp));
            assert_eq!(response.header.status(), 0);
        }
    }

    fn config(mode: ConnectMode) -> HsmsConfig {
        let address = "127.0.0.1:0".parse().unwrap();
        let config = match mode {
            ConnectMode::Active => HsmsConfig::active(address),
            ConnectMode::Passive => HsmsConfig::passive(address),
        };
        config
            .with_session_id(1)
            .with_linktest_interval(None)
            .with_auto_reconnect(false)
    }

    fn echo_dispatcher() -> Dispatcher {
        let mut dispatcher = Dispatcher::new(1);
        dispatcher.register(
            1,
            1,
            handler_fn(|_| Ok(Some(Item::list(vec![Item::ascii("MDL"), Item::ascii("1")])))),
        );
        dispatcher
    }

    fn passive(config: HsmsConfig) -> (HsmsConnection, Peer) {
        let (local, remote) = tokio::io::duplex(64 * 1024);
        let connector = DuplexConnector {
            stream: Some(local),
        };
        let conn = HsmsConnection::new(config, Box::new(connector), echo_dispatcher());
        (conn, Peer::new(remote))
    }

    async fn expect_event(events: &mut broadcast::Receiver<SessionEvent>, expected: SessionEvent) {
        tokio::time::timeout(WAIT, async {
            while events.recv().await.unwrap() != expected {}
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_passive_select_then_request() {
        let (conn, mut peer) = passive(config(ConnectMode::Passive));
        assert_ok!(conn.start());
        peer.select().await;
        conn.wait_for_state(ConnectionState::Selected, WAIT).await.unwrap();

        peer.send(Message::new(MessageHeader::data(1, 1, 1, true, 500), None))
            .await;
        let reply = peer.recv().await;
        assert_eq!((reply.header.stream(), reply.header.function()), (1, 2));
        assert_eq!(reply.header.system_bytes, 500);
        assert_eq!(
            reply.to_message().unwrap().body,
            Some(Item::list(vec![Item::ascii("MDL"), Item::ascii("1")]))
        );
        conn.stop().await;
    }

    #[tokio::test]
    async fn test_data_before_select_rejected() {
        let (conn, mut peer) = passive(config(ConnectMode::Passive));
        assert_ok!(conn.start());
        peer.send(Message::new(MessageHeader::data(1, 1, 1, true, 7), None))
            .await;
        let reject = peer.recv().await;
        assert_eq!(reject.header.s_type(), Some(SType::RejectReq));
        assert_eq!(reject.header.status(), RejectReason::EntityNotSelected as u8);
        assert_eq!(reject.header.system_bytes, 7);
        assert_eq!(conn.state(), ConnectionState::NotSelected);
        conn.stop().await;
    }

    #[tokio::test]
    async fn test_second_select_reports_already_active() {
        let (conn, mut peer) = passive(config(ConnectMode::Passive));
        assert_ok!(conn.start());
        peer.select().await;
        peer.send(Message::control(MessageHeader::control(SType::SelectReq, 2)))
            .await;
        let response = peer.recv().await;
        assert_eq!(response.header.status(), SelectStatus::AlreadyActive as u8);
        assert!(conn.is_selected());
        conn.stop().await;
    }

    #[tokio::test]
    async fn test_select_with_wrong_session_disconnects() {
        let (conn, mut peer) = passive(config(ConnectMode::Passive));
        let mut events = conn.subscribe();
        assert_ok!(conn.start());
        let mut request = MessageHeader::control(SType::SelectReq, 3);
        request.session_id = 42;
        peer.send(Message::control(request)).await;
        let response = peer.recv().await;
        assert_eq!(response.header.status(), 1);
        expect_event(&mut events, SessionEvent::Disconnected).await;
        conn.stop().await;
    }

    #[tokio::test]
    async fn test_t7_expiry_disconnects() {
        let (conn, mut peer) =
            passive(config(ConnectMode::Passive).with_t7(Duration::from_millis(100)));
        let mut events = conn.subscribe();
        assert_ok!(conn.start());
        expect_event(&mut events, SessionEvent::Connected).await;
        expect_event(&mut events, SessionEvent::Disconnected).await;
        assert!(matches!(
            peer.reader.read_frame().await,
            Err(SecsError::ConnectionClosed)
        ));
        assert_eq!(conn.statistics().control_timeouts, 1);
        conn.stop().await;
    }

    #[tokio::test]
    async fn test_linktest_answered_before_select() {
        let (conn, mut peer) = passive(config(ConnectMode::Passive));
        assert_ok!(conn.start());
        peer.send(Message::control(MessageHeader::control(SType::LinktestReq, 11)))
            .await;
        let response = peer.recv().await;
        assert_eq!(response.header.s_type(), Some(SType::LinktestRsp));
        assert_eq!(response.header.system_bytes, 11);
        conn.stop().await;
    }

    #[tokio::test]
    async fn test_unknown_stype_and_ptype_rejected() {
        let (conn, mut peer) = passive(config(ConnectMode::Passive));
        assert_ok!(conn.start());
        let mut odd = MessageHeader::control(SType::LinktestReq, 12);
        odd.s_type = 8;
        peer.send(Message::control(odd)).await;
        let reject = peer.recv().await;
        assert_eq!(reject.header.status(), RejectReason::STypeNotSupported as u8);
        assert_eq!(reject.header.header_byte2, 8);

        let mut odd = MessageHeader::control(SType::LinktestReq, 13);
        odd.p_type = 1;
        peer.send(Message::control(odd)).await;
        let reject = peer.recv().await;
        assert_eq!(reject.header.status(), RejectReason::PTypeNotSupported as u8);
        conn.stop().await;
    }

    #[tokio::test]
    async fn test_peer_deselect_and_separate() {
        let (conn, mut peer) = passive(config(ConnectMode::Passive));
        let mut events = conn.subscribe();
        assert_ok!(conn.start());
        peer.select().await;

        peer.send(Message::control(MessageHeader::control(SType::DeselectReq, 20)))
            .await;
        let response = peer.recv().await;
        assert_eq!(response.header.s_type(), Some(SType::DeselectRsp));
        assert_eq!(response.header.status(), 0);
        expect_event(&mut events, SessionEvent::Deselected).await;
        assert_eq!(conn.state(), ConnectionState::NotSelected);

        peer.send(Message::control(MessageHeader::control(SType::SeparateReq, 21)))
            .await;
        expect_event(&mut events, SessionEvent::Disconnected).await;
        assert_eq!(conn.state(), ConnectionState::NotConnected);
        conn.stop().await;
    }

    async fn active_selected() -> (HsmsConnection, Peer) {
        let (local, remote) = tokio::io::duplex(64 * 1024);
        let mut link = MockLink::new();
        link.expect_establish()
            .times(1)
            .return_once(move || Ok(StreamPair::from_stream(local)));
        link.expect_description().returning(|| "mock".to_string());

        let config = config(ConnectMode::Active).with_s9f9_on_t3(true);
        let conn = HsmsConnection::new(config, Box::new(link), Dispatcher::new(1));
        assert_ok!(conn.start());

        let mut peer = Peer::new(remote);
        let select = peer.recv().await;
        assert_eq!(select.header.s_type(), Some(SType::SelectReq));
        assert_eq!(select.header.session_id, CONTROL_SESSION_ID);
        peer.send(Message::control(MessageHeader::control_response(
            &select.header,
            SType::SelectRsp,
            0,
        )))
        .await;
        conn.wait_for_state(ConnectionState::Selected, WAIT).await.unwrap();
        (conn, peer)
    }

    #[tokio::test]
    async fn test_active_request_reply() {
        let (conn, mut peer) = active_selected().await;
        let requester = conn.clone();
        let call = tokio::spawn(async move { requester.request(1, 1, None).await });

        let request = peer.recv().await;
        assert!(request.header.w_bit());
        assert_eq!(request.header.session_id, 1);
        peer.send(Message::reply_to(&request.header, Some(Item::empty_list())))
            .await;

        let reply = call.await.unwrap().unwrap();
        assert_eq!(reply.function(), 2);
        assert_eq!(reply.body, Some(Item::empty_list()));
        assert_eq!(conn.pending_transactions(), 0);
        conn.stop().await;
    }

    #[tokio::test]
    async fn test_reply_timeout_sends_s9f9_and_discards_late_reply() {
        let (conn, mut peer) = active_selected().await;
        let requester = conn.clone();
        let call = tokio::spawn(async move {
            requester
                .request_with_timeout(1, 3, None, Duration::from_millis(100))
                .await
        });

        let request = peer.recv().await;
        assert!(matches!(call.await.unwrap(), Err(SecsError::Timeout)));

        let s9f9 = peer.recv().await.to_message().unwrap();
        assert_eq!((s9f9.stream(), s9f9.function()), (9, 9));
        assert_eq!(s9::offending_header(&s9f9), Some(request.header));

        peer.send(Message::reply_to(&request.header, None)).await;
        peer.send(Message::control(MessageHeader::control(SType::LinktestReq, 30)))
            .await;
        let response = peer.recv().await;
        assert_eq!(response.header.s_type(), Some(SType::LinktestRsp));
        assert!(conn.is_selected());
        assert_eq!(conn.statistics().reply_timeouts, 1);
        conn.stop().await;
    }

    #[tokio::test]
    async fn test_s9_answer_fails_transaction() {
        let (conn, mut peer) = active_selected().await;
        let requester = conn.clone();
        let call = tokio::spawn(async move { requester.request(64, 1, None).await });

        let request = peer.recv().await;
        peer.send(s9::unrecognized_stream(&request.header)).await;
        assert!(matches!(
            call.await.unwrap(),
            Err(SecsError::PeerError {
                stream: 9,
                function: 3
            })
        ));
        conn.stop().await;
    }

    #[tokio::test]
    async fn test_generation_counts_selects() {
        let (conn, mut peer) = passive(config(ConnectMode::Passive));
        let mut states = conn.watch_state();
        assert_ok!(conn.start());
        assert_eq!(conn.session_generation(), 0);
        peer.select().await;
        tokio::time::timeout(WAIT, states.wait_for(|s| s.is_selected()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conn.session_generation(), 1);

        peer.send(Message::control(MessageHeader::control(SType::DeselectReq, 40)))
            .await;
        peer.recv().await;
        peer.select().await;
        conn.wait_for_state(ConnectionState::Selected, WAIT).await.unwrap();
        assert_eq!(conn.session_generation(), 2);
        conn.stop().await;
    }

    #[tokio::test]
    async fn test_reject_fails_transaction() {
        let (conn, mut peer) = active_selected().await;
        let requester = conn.clone();
        let call = tokio::spawn(async move { requester.request(1, 3, None).await });

        let request = peer.recv().await;
        peer.send(Message::control(MessageHeader::reject(
            &request.header,
            RejectReason::EntityNotSelected,
        )))
        .await;
        assert!(matches!(
            call.await.unwrap(),
            Err(SecsError::Rejected(4))
        ));
        assert_eq!(conn.pending_transactions(), 0);
        assert!(conn.is_selected());
        conn.stop().await;
    }

    #[tokio::test]
    async fn test_connection_loss_fails_pending() {
        let (conn, peer) = active_selected().await;
        let requester = conn.clone();
        let call = tokio::spawn(async move { requester.request(1, 1, None).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(peer);
        assert!(matches!(
            call.await.unwrap(),
            Err(SecsError::ConnectionLost)
        ));
        conn.stop().await;
    }

    #[tokio::test]
    async fn test_send_requires_selected() {
        let (conn, _peer) = passive(config(ConnectMode::Passive));
        assert!(matches!(
            conn.notify(1, 1, None).await,
            Err(SecsError::InvalidState(_))
        ));
        assert!(conn.start().is_ok());
        assert!(conn.start().is_err());
        conn.stop().await;
    }
}
