//! Control-plane multiplexing over a single NDJSON stream.
//!
//! Splits the host's inbound frames into independent request/response
//! exchanges, routes peer-initiated requests to capability handlers, and
//! passes every other frame through to the domain layer.
//!
//! Submodules, leaves first:
//! - `envelope`: wire shapes and frame classification.
//! - `correlation`: id → waiter rendezvous table.
//! - `issuer`: outbound request/response with timeout and cancellation.
//! - `dispatcher`: inbound request → capability handler.
//! - `router`: the single inbound consumer.
//! - `client`: facade wiring all of the above.

pub mod client;
pub mod correlation;
pub mod dispatcher;
pub mod envelope;
pub mod issuer;
pub mod router;
