//! Strongly-typed identifiers used across the simulation.
//!
//! Growth stages and alert messages are identified by values that come from
//! external rule tables; wrapping them keeps a stage code from being passed
//! where a message text is expected.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Unique identifier for one simulation run.
///
/// Uses UUID v7 (time-ordered) so runs sort by start time in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RunId(pub Uuid);

impl RunId {
    /// Create a new run identifier using UUID v7.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for RunId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A growth-stage code such as `BBCH_61`.
///
/// The simulation treats stage codes as opaque identifiers; their order
/// comes from the configured stage sequence, never from the text itself.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StageCode(String);

impl StageCode {
    /// Wrap a stage code string.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Borrow the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for StageCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StageCode {
    fn from(code: &str) -> Self {
        Self(code.to_owned())
    }
}

impl From<String> for StageCode {
    fn from(code: String) -> Self {
        Self(code)
    }
}

/// Identifier of an alert message row in the rule tables.
///
/// Management deduplication is keyed on this value: a given id is reported
/// at most once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MessageId(pub u32);

impl core::fmt::Display for MessageId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for MessageId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_code_serializes_as_plain_string() {
        let code = StageCode::from("BBCH_61");
        let json = serde_json::to_string(&code).ok();
        assert_eq!(json.as_deref(), Some("\"BBCH_61\""));
    }

    #[test]
    fn message_id_displays_number() {
        assert_eq!(MessageId(17).to_string(), "17");
    }

    #[test]
    fn run_ids_are_distinct() {
        assert_ne!(RunId::new(), RunId::new());
    }
}
