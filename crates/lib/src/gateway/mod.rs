//! Gateway: LINE webhook endpoint.
//!
//! Every delivery is authenticated (HMAC-SHA256 over the raw body), parsed into typed
//! events, and dispatched in order to exactly one handler per event. The HTTP answer is a
//! fixed acknowledgement once dispatch has been attempted.

mod dispatch;
mod envelope;
mod server;
mod signature;

pub use dispatch::{Ack, EventHandler, Gateway, GatewayError, HandlerRegistry};
pub use envelope::{parse_envelope, Event, EventKind, EventPayload};
pub use server::{router, run_gateway, GatewayState, ACK_BODY, SIGNATURE_HEADER};
pub use signature::SignatureVerifier;
