//! Event handling for the relay.
//!
//! This module provides the direct-message pipeline and its steps:
//! - Filtering and relaying private messages to the assistant
//! - Ingesting attachments
//! - Answering the assistant's tool calls during a run

pub mod attachments;
pub mod direct_message;
pub mod tool_calls;
