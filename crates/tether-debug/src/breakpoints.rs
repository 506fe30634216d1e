use std::collections::BTreeMap;

use parking_lot::Mutex;
use tether_runtime::{BreakpointLocation, BreakpointRequest, ExecutionEnvironment};

use crate::error::{DebugError, DebugResult};

/// Property naming the hit on which a breakpoint fires.
pub const HIT_COUNT: &str = "hitCount";

pub type BreakpointProperties = BTreeMap<String, String>;

/// The session's view of installed breakpoints. The debuggee holds the
/// authoritative table; entries here are only added once it accepted them.
#[derive(Debug, Default)]
pub(crate) struct BreakpointRegistry {
    entries: Mutex<BTreeMap<BreakpointLocation, BreakpointProperties>>,
}

fn parse_hit_count(properties: &BreakpointProperties) -> Result<Option<u32>, String> {
    let Some(raw) = properties.get(HIT_COUNT) else {
        return Ok(None);
    };
    match raw.trim().parse::<u32>() {
        Ok(n) if n > 0 => Ok(Some(n)),
        _ => Err(format!(
            "{HIT_COUNT} must be a positive integer, got `{raw}`"
        )),
    }
}

impl BreakpointRegistry {
    /// Set or clear the breakpoint at `location`. Returns a message when the
    /// debuggee refused; the registry is unchanged in that case.
    pub(crate) fn toggle(
        &self,
        env: &dyn ExecutionEnvironment,
        location: &BreakpointLocation,
        set: bool,
        properties: &BreakpointProperties,
    ) -> Option<String> {
        let mut entries = self.entries.lock();
        if set {
            let hit_count = match parse_hit_count(properties) {
                Ok(hit_count) => hit_count,
                Err(message) => return Some(message),
            };
            let request = BreakpointRequest {
                location: location.clone(),
                hit_count,
            };
            if let Err(err) = env.set_breakpoint(&request) {
                let err = DebugError::from(err);
                tracing::debug!(target: "tether.debug", %location, error = %err, "breakpoint rejected");
                return Some(format!("cannot set breakpoint at {location}: {err}"));
            }
            entries.insert(location.clone(), properties.clone());
            tracing::debug!(target: "tether.debug", %location, ?hit_count, "breakpoint set");
        } else {
            if let Err(err) = env.clear_breakpoint(location) {
                let err = DebugError::from(err);
                return Some(format!("cannot clear breakpoint at {location}: {err}"));
            }
            entries.remove(location);
            tracing::debug!(target: "tether.debug", %location, "breakpoint cleared");
        }
        None
    }

    /// Clear every breakpoint in `class`. Returns how many were removed.
    pub(crate) fn remove_for_class(
        &self,
        env: &dyn ExecutionEnvironment,
        class: &str,
    ) -> DebugResult<usize> {
        let mut entries = self.entries.lock();
        let doomed: Vec<_> = entries
            .keys()
            .filter(|location| location.class_name() == class)
            .cloned()
            .collect();
        for location in &doomed {
            env.clear_breakpoint(location)?;
            entries.remove(location);
        }
        Ok(doomed.len())
    }

    pub(crate) fn list(&self) -> Vec<(BreakpointLocation, BreakpointProperties)> {
        self.entries
            .lock()
            .iter()
            .map(|(location, properties)| (location.clone(), properties.clone()))
            .collect()
    }
}
