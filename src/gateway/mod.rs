//! Messaging gateway: inbound webhook events and the outbound HTTP client.

pub mod client;
pub mod events;

pub use client::{Gateway, GreenApiClient, GreenApiConfig};
pub use events::{GatewayEvent, IgnoreReason, InboundMessage, classify, classify_bytes};
