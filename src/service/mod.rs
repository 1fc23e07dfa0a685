//! Service integrations for external APIs and clients.
//!
//! This module contains implementations for various services used by the relay:
//! - Assistant services (e.g., OpenAI Assistants)
//! - Chat services (e.g., Discord)
//! - The user to thread mapping (in memory)
//! - Tool tables (e.g., MCP servers)
//!
//! Each service module defines both generic traits and concrete implementations,
//! allowing for extensibility and easy testing.

pub mod assistant;
pub mod chat;
pub mod threads;
pub mod tools;
