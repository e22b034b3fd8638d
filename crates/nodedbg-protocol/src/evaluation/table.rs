use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use super::RawVariableDescriptor;
use crate::error::{DebuggerError, Result};
use crate::types::Handle;

/// Per-reply mapping from handle to the descriptor the debuggee sent for it.
///
/// Built fresh for every reply and dropped once the reply is processed; never shared across
/// commands.
#[derive(Debug, Clone, Default)]
pub struct HandleTable {
    entries: HashMap<Handle, RawVariableDescriptor>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from a reply's `refs` collection.
    pub fn from_refs(refs: &[Value]) -> Result<Self> {
        let mut table = Self::new();
        for reference in refs {
            let descriptor = parse_descriptor(reference, "refs entry")?;
            table.insert(descriptor);
        }
        Ok(table)
    }

    /// Insert a descriptor under its own handle, replacing any earlier entry.
    pub fn insert(&mut self, descriptor: RawVariableDescriptor) -> Option<RawVariableDescriptor> {
        self.entries.insert(descriptor.handle, descriptor)
    }

    /// Insert a descriptor under an explicit handle (lookup bodies are keyed by handle text).
    pub fn insert_as(
        &mut self,
        handle: Handle,
        descriptor: RawVariableDescriptor,
    ) -> Option<RawVariableDescriptor> {
        self.entries.insert(handle, descriptor)
    }

    pub fn get(&self, handle: Handle) -> Option<&RawVariableDescriptor> {
        self.entries.get(&handle)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.entries.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub(crate) fn parse_descriptor(value: &Value, what: &str) -> Result<RawVariableDescriptor> {
    RawVariableDescriptor::deserialize(value)
        .map_err(|err| DebuggerError::protocol(format!("malformed {what}: {err}")))
}
