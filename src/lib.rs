//! WhatsApp relay: message-admission and conversation-state engine.

pub mod config;
pub mod conversation;
pub mod error;
pub mod gateway;
pub mod llm;
pub mod pipeline;
pub mod server;
