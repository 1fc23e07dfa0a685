//! The tool-definition table offered to the assistant during runs.
//!
//! The table lists the functions the assistant may call and executes the calls
//! the service requests while a run is blocked on them.

pub mod mcp;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::types::{Res, ToolDefinition};

// Traits.

/// Generic tool table trait that tool providers must implement.
#[async_trait]
pub trait GenericToolTable: Send + Sync + 'static {
    /// The definitions of every tool in the table.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Call the named tool with the raw JSON arguments generated by the model, and return its output.
    async fn call(&self, name: &str, arguments: &str) -> Res<String>;
}

// Structs.

/// Tool table for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct ToolTable {
    inner: Arc<dyn GenericToolTable>,
}

impl Deref for ToolTable {
    type Target = dyn GenericToolTable;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl ToolTable {
    pub fn new(inner: Arc<dyn GenericToolTable>) -> Self {
        Self { inner }
    }

    /// A table without any tools; runs use the assistant's own tool configuration.
    pub fn empty() -> Self {
        Self::new(Arc::new(EmptyToolTable))
    }
}

/// A table with no tools.
struct EmptyToolTable;

#[async_trait]
impl GenericToolTable for EmptyToolTable {
    fn definitions(&self) -> Vec<ToolDefinition> {
        Vec::new()
    }

    async fn call(&self, name: &str, _arguments: &str) -> Res<String> {
        Err(anyhow::anyhow!("Unknown tool: {name}."))
    }
}
