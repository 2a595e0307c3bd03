//! Routing of inbound primary messages to handlers

use crate::header::MessageHeader;
use crate::message::{Frame, Message};
use crate::s9;
use async_trait::async_trait;
use secs_core::{Item, SecsResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Handler outcome: the reply body, if any
pub type HandlerResult = SecsResult<Option<Item>>;

/// Handler for a decoded primary message
#[async_trait]
pub trait DataHandler: Send + Sync {
    async fn handle(&self, message: &Message) -> HandlerResult;
}

/// Handler receiving the header and the undecoded body
#[async_trait]
pub trait RawHandler: Send + Sync {
    async fn handle_raw(&self, frame: &Frame) -> HandlerResult;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> DataHandler for FnHandler<F>
where
    F: Fn(&Message) -> HandlerResult + Send + Sync,
{
    async fn handle(&self, message: &Message) -> HandlerResult {
        (self.0)(message)
    }
}

/// Wrap a synchronous closure as a [`DataHandler`]
pub fn handler_fn<F>(handler: F) -> Arc<dyn DataHandler>
where
    F: Fn(&Message) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(FnHandler(handler))
}

enum Route {
    Decoded(Arc<dyn DataHandler>),
    Raw(Arc<dyn RawHandler>),
}

struct RouteEntry {
    route: Route,
    nak: Option<Item>,
}

/// Predicate deciding whether a routed primary may reach its handler
pub type Gate = Arc<dyn Fn(&MessageHeader) -> bool + Send + Sync>;

/// (stream, function) handler registry
pub struct Dispatcher {
    device_id: u16,
    routes: HashMap<(u8, u8), RouteEntry>,
    gate: Option<Gate>,
}

impl Dispatcher {
    pub fn new(device_id: u16) -> Self {
        Self {
            device_id,
            routes: HashMap::new(),
            gate: None,
        }
    }

    /// Closed gates answer with SxF0 regardless of any registered NAK
    pub fn set_gate(&mut self, gate: Gate) -> &mut Self {
        self.gate = Some(gate);
        self
    }

    pub fn device_id(&self) -> u16 {
        self.device_id
    }

    /// Register a handler; replaces any existing route
    pub fn register(
        &mut self,
        stream: u8,
        function: u8,
        handler: Arc<dyn DataHandler>,
    ) -> &mut Self {
        self.insert(stream, function, Route::Decoded(handler), None)
    }

    /// Register a handler whose failures answer with `nak`
    pub fn register_with_nak(
        &mut self,
        stream: u8,
        function: u8,
        handler: Arc<dyn DataHandler>,
        nak: Item,
    ) -> &mut Self {
        self.insert(stream, function, Route::Decoded(handler), Some(nak))
    }

    pub fn register_raw(
        &mut self,
        stream: u8,
        function: u8,
        handler: Arc<dyn RawHandler>,
    ) -> &mut Self {
        self.insert(stream, function, Route::Raw(handler), None)
    }

    fn insert(&mut self, stream: u8, function: u8, route: Route, nak: Option<Item>) -> &mut Self {
        self.routes.insert((stream, function), RouteEntry { route, nak });
        self
    }

    pub fn is_registered(&self, stream: u8, function: u8) -> bool {
        self.routes.contains_key(&(stream, function))
    }

    /// A stream is known once any function of it is registered
    pub fn is_known_stream(&self, stream: u8) -> bool {
        self.routes.keys().any(|(s, _)| *s == stream)
    }

    /// Run the handler for `frame` and build the reply to send, if any
    pub async fn dispatch(&self, frame: &Frame) -> Option<Message> {
        let header = &frame.header;
        let key = (header.stream(), header.function());

        if header.stream() == 9 && !self.routes.contains_key(&key) {
            log::debug!("Ignoring unhandled {}", header);
            return None;
        }
        if header.session_id != self.device_id {
            log::warn!(
                "Device id {} does not match {} in {}",
                header.session_id,
                self.device_id,
                header
            );
            return Some(s9::unrecognized_device_id(header));
        }

        let Some(entry) = self.routes.get(&key) else {
            return Some(if self.is_known_stream(header.stream()) {
                log::warn!("Unrecognized function in {}", header);
                s9::unrecognized_function(header)
            } else {
                log::warn!("Unrecognized stream in {}", header);
                s9::unrecognized_stream(header)
            });
        };

        if self.gate.as_ref().is_some_and(|gate| !gate(header)) {
            log::info!("Refusing {} at the gate", header);
            return Self::failure_reply(header, None);
        }

        let result = match &entry.route {
            Route::Raw(handler) => handler.handle_raw(frame).await,
            Route::Decoded(handler) => match frame.to_message() {
                Ok(message) => handler.handle(&message).await,
                Err(err) => {
                    log::warn!("Illegal data in {}: {}", header, err);
                    return Some(match &entry.nak {
                        Some(nak) if header.w_bit() => Message::reply_to(header, Some(nak.clone())),
                        _ => s9::illegal_data(header),
                    });
                }
            },
        };

        match result {
            Ok(body) => header.w_bit().then(|| Message::reply_to(header, body)),
            Err(err) => {
                log::warn!("Handler for {} failed: {}", header, err);
                Self::failure_reply(header, entry.nak.as_ref())
            }
        }
    }

    fn failure_reply(header: &MessageHeader, nak: Option<&Item>) -> Option<Message> {
        if !header.w_bit() {
            return None;
        }
        Some(match nak {
            Some(nak) => Message::reply_to(header, Some(nak.clone())),
            None => Message::abort(header),
        })
    }
}
