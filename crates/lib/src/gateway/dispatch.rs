//! Authenticate, parse, dispatch, acknowledge.

use super::envelope::{parse_envelope, Event, EventKind};
use super::signature::SignatureVerifier;
use crate::handlers::HandlerError;
use async_trait::async_trait;
use futures_util::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Request-level failures. Both stop the delivery before any handler runs.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("missing or invalid webhook signature")]
    Authentication,
    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),
}

/// Per-event handler. Errors are contained at the dispatch boundary.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> Result<(), HandlerError>;
}

/// Static kind -> handler table with a mandatory fallback, built once at startup.
pub struct HandlerRegistry {
    handlers: HashMap<EventKind, Arc<dyn EventHandler>>,
    fallback: Arc<dyn EventHandler>,
}

impl HandlerRegistry {
    pub fn new(fallback: Arc<dyn EventHandler>) -> Self {
        Self {
            handlers: HashMap::new(),
            fallback,
        }
    }

    /// Register a handler for `kind`, replacing any previous one.
    pub fn register(mut self, kind: EventKind, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    /// Handler for `kind`, or the fallback. Total: never None.
    pub fn resolve(&self, kind: EventKind) -> &Arc<dyn EventHandler> {
        self.handlers.get(&kind).unwrap_or(&self.fallback)
    }
}

/// Outcome of one delivery. The HTTP answer does not depend on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ack {
    /// Handler invocations attempted.
    pub dispatched: usize,
    /// Invocations that returned an error or panicked.
    pub failed: usize,
}

/// The inbound event gateway.
pub struct Gateway {
    verifier: SignatureVerifier,
    registry: HandlerRegistry,
}

impl Gateway {
    pub fn new(verifier: SignatureVerifier, registry: HandlerRegistry) -> Self {
        Self { verifier, registry }
    }

    /// Handle one delivery: verify the signature over the exact bytes, parse every event,
    /// then run each event's handler in array order. Handler failures are logged and counted
    /// but never stop later events or turn into an error here.
    pub async fn receive(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<Ack, GatewayError> {
        let signature = signature.ok_or(GatewayError::Authentication)?;
        if !self.verifier.verify(raw_body, signature) {
            return Err(GatewayError::Authentication);
        }

        let events = parse_envelope(raw_body)?;
        let delivery = uuid::Uuid::new_v4();
        log::info!("delivery {}: {} event(s)", delivery, events.len());

        let mut ack = Ack::default();
        for (i, event) in events.iter().enumerate() {
            let handler = self.registry.resolve(event.kind());
            ack.dispatched += 1;
            match AssertUnwindSafe(handler.handle(event)).catch_unwind().await {
                Ok(Ok(())) => {
                    log::debug!(
                        "delivery {}: event {} ({}) handled",
                        delivery,
                        i,
                        event.kind_name()
                    );
                }
                Ok(Err(e)) => {
                    ack.failed += 1;
                    log::warn!(
                        "delivery {}: event {} ({}) handler failed: {}",
                        delivery,
                        i,
                        event.kind_name(),
                        e
                    );
                }
                Err(panic) => {
                    ack.failed += 1;
                    log::error!(
                        "delivery {}: event {} ({}) handler panicked: {}",
                        delivery,
                        i,
                        event.kind_name(),
                        panic_message(panic.as_ref())
                    );
                }
            }
        }
        Ok(ack)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
