//! Per-connection API lookup table.
//!
//! Each distinct `(api name, argument count)` pair seen on a connection gets
//! a lookup index. Indices are handed out in order starting at
//! [`FIRST_API_LOOKUP_INDEX`]; index 0 belongs to `__process__`.

use std::collections::HashMap;

use hostlink_common::constants::FIRST_API_LOOKUP_INDEX;
use hostlink_common::error::{HostlinkError, Result};

#[derive(Debug, Clone, Copy)]
struct Slot {
    arg_count: usize,
    index: u32,
    described: bool,
}

/// Result of resolving an API against the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookup {
    /// Lookup index assigned to the API.
    pub index: u32,
    /// Whether its description has already been sent on this connection.
    pub described: bool,
}

/// Lookup indices assigned on one connection.
#[derive(Debug)]
pub struct ApiTable {
    next: u32,
    slots: HashMap<String, Vec<Slot>>,
}

impl ApiTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: FIRST_API_LOOKUP_INDEX,
            slots: HashMap::new(),
        }
    }

    /// Returns the index for `name` taking `arg_count` arguments, assigning
    /// the next free one on first sight.
    ///
    /// The same name with a different argument count is a distinct entry,
    /// since its description carries a different label list.
    ///
    /// # Errors
    ///
    /// Returns [`HostlinkError::Encoding`] once the index space is exhausted.
    pub fn resolve(&mut self, name: &str, arg_count: usize) -> Result<Lookup> {
        if let Some(slot) = self.find(name, arg_count) {
            return Ok(Lookup {
                index: slot.index,
                described: slot.described,
            });
        }

        let index = self.next;
        self.next = index
            .checked_add(1)
            .ok_or_else(|| HostlinkError::encoding("lookup index space exhausted"))?;
        self.slots.entry(name.to_owned()).or_default().push(Slot {
            arg_count,
            index,
            described: false,
        });
        tracing::trace!(api = name, arg_count, index, "assigned lookup index");
        Ok(Lookup {
            index,
            described: false,
        })
    }

    /// Records that the description for `name`/`arg_count` reached the wire.
    pub fn mark_described(&mut self, name: &str, arg_count: usize) {
        if let Some(slot) = self
            .slots
            .get_mut(name)
            .and_then(|v| v.iter_mut().find(|s| s.arg_count == arg_count))
        {
            slot.described = true;
        }
    }

    /// Number of APIs with an assigned index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.values().map(Vec::len).sum()
    }

    /// Returns `true` if no API has been seen yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn find(&self, name: &str, arg_count: usize) -> Option<&Slot> {
        self.slots
            .get(name)
            .and_then(|v| v.iter().find(|s| s.arg_count == arg_count))
    }
}

impl Default for ApiTable {
    fn default() -> Self {
        Self::new()
    }
}
