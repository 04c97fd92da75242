//! Domain newtypes providing compile-time safety and self-documentation.
//!
//! These wrappers prevent common bugs like passing a search value where an
//! event id is expected, and make function signatures self-documenting.

use std::fmt;

/// A task (process or thread) identified by its kernel pid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(pub u64);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Pid {
    fn from(pid: u64) -> Self {
        Pid(pid)
    }
}

/// CPU core a record was captured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CpuId(pub u32);

impl fmt::Display for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CPU:{}", self.0)
    }
}

/// Timestamp in nanoseconds, as carried by every trace record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Saturating delta between two timestamps (end minus this).
    #[must_use]
    pub fn delta_to(self, end: Timestamp) -> u64 {
        end.0.saturating_sub(self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identifier of an [`crate::registry::EventData`] within one [`crate::pairing::Handle`].
///
/// An index into a handle-owned vector rather than a reference, so it stays
/// `Copy` and carries no borrow of the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(pub usize);

/// Host "long" word size, in bytes: either 4 or 8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongSize(pub u8);

impl LongSize {
    /// Construct a long size, rejecting anything other than 4 or 8 bytes.
    ///
    /// # Errors
    /// Returns [`crate::domain::CoreError::UnsupportedLongSize`] for any other width.
    pub fn new(bytes: u8) -> Result<Self, crate::domain::CoreError> {
        match bytes {
            4 | 8 => Ok(LongSize(bytes)),
            other => Err(crate::domain::CoreError::UnsupportedLongSize(other)),
        }
    }

    #[must_use]
    pub fn bytes(self) -> usize {
        self.0 as usize
    }
}
