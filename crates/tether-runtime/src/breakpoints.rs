use std::collections::HashMap;

use crate::{BreakpointLocation, BreakpointRequest};

#[derive(Debug)]
struct Entry {
    hit_count: Option<u32>,
    hits: u32,
}

/// Installed breakpoints and their hit counters.
#[derive(Debug, Default)]
pub(crate) struct BreakpointTable {
    entries: HashMap<BreakpointLocation, Entry>,
}

impl BreakpointTable {
    /// Installing over an existing location replaces it and resets its counter.
    pub(crate) fn insert(&mut self, request: &BreakpointRequest) {
        self.entries.insert(
            request.location.clone(),
            Entry {
                hit_count: request.hit_count,
                hits: 0,
            },
        );
    }

    pub(crate) fn remove(&mut self, location: &BreakpointLocation) -> bool {
        self.entries.remove(location).is_some()
    }

    pub(crate) fn hit_line(&mut self, class: &str, line: u32) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        self.hit(&BreakpointLocation::Line {
            class: class.to_string(),
            line,
        })
    }

    pub(crate) fn hit_method(&mut self, class: &str, method: &str) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        self.hit(&BreakpointLocation::Method {
            class: class.to_string(),
            method: method.to_string(),
        })
    }

    fn hit(&mut self, location: &BreakpointLocation) -> bool {
        let Some(entry) = self.entries.get_mut(location) else {
            return false;
        };
        entry.hits = entry.hits.saturating_add(1);
        match entry.hit_count {
            None => true,
            Some(n) => entry.hits == n,
        }
    }

    pub(crate) fn reset_hits(&mut self) {
        for entry in self.entries.values_mut() {
            entry.hits = 0;
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
