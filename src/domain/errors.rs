//! Structured error types for traceprof
//!
//! Using thiserror for automatic Display implementation and error chaining.
//!
//! Only structural/programmer failures are modeled here. Data errors — an
//! unreadable field on one record, an unmatched end, a wakeup with
//! `success == 0` — are not errors at all; they are silent no-ops, so they
//! never reach a `Result`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("event {system}/{name} does not have field {field}")]
    MissingField { system: String, name: String, field: String },

    #[error("unsupported host long size: {0} (expected 4 or 8)")]
    UnsupportedLongSize(u8),

    #[error("stack size {0} is smaller than one word")]
    StackTooSmall(usize),

    #[error("event registry has no common_pid field for {system}/{name}")]
    MissingCommonPid { system: String, name: String },
}

#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("failed to read fixture file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse fixture JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("fixture record references unknown event \"{0}\"")]
    UnknownEvent(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_display() {
        let err = CoreError::MissingField {
            system: "sched".into(),
            name: "sched_switch".into(),
            field: "prev_state".into(),
        };
        assert_eq!(err.to_string(), "event sched/sched_switch does not have field prev_state");
    }

    #[test]
    fn unsupported_long_size_display() {
        let err = CoreError::UnsupportedLongSize(6);
        assert_eq!(err.to_string(), "unsupported host long size: 6 (expected 4 or 8)");
    }
}
