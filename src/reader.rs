//! The trace-record boundary: everything this crate consumes from a reader.
//!
//! `Record` is the shape that crosses the boundary from a trace-file reader
//! into the rest of this crate. `TraceReader` is the trait the pairing
//! engine and the function-graph renderer are generic over, so that a live
//! ftrace pipe and a JSON fixture (see [`crate::fixture`]) can both drive
//! the same core.

use std::collections::HashMap;
use std::rc::Rc;

use crate::domain::{CpuId, LongSize, Timestamp};

/// One trace record: a timestamped, CPU-tagged event with fields already
/// resolved by name.
///
/// The ftrace ring-buffer format packs fields into a raw byte payload at
/// offsets resolved by the event-format registry; decoding that payload into
/// named fields is the reader's job, not this crate's. What crosses the
/// boundary into this crate is always a record whose fields are already
/// name-addressable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub cpu: CpuId,
    pub timestamp: Timestamp,
    pub system: String,
    pub name: String,
    pub fields: HashMap<String, i64>,
    /// Addresses of a captured kernel stack, present only on stack-class records.
    pub caller: Vec<u64>,
}

impl Record {
    #[must_use]
    pub fn field(&self, name: &str) -> Option<i64> {
        self.fields.get(name).copied()
    }
}

/// Source of trace records, one CPU ring buffer at a time.
///
/// `peek` is required by the function-graph renderer's leaf detection,
/// which must look at the next same-CPU record without consuming it; the
/// pairing engine only ever `read`s.
pub trait TraceReader {
    fn peek(&mut self, cpu: CpuId) -> Option<Rc<Record>>;
    fn read(&mut self, cpu: CpuId) -> Option<Rc<Record>>;
    fn current_cpu(&self) -> CpuId;
    fn long_size(&self) -> LongSize;
    fn cpu_count(&self) -> usize;
}
