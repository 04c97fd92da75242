//! # Symbol Resolution
//!
//! Converts function addresses carried by trace records (funcgraph call
//! sites, kernel stack frames) into human-readable names using DWARF debug
//! information read from an on-disk ELF binary.
//!
//! There is no live process to attach to here and therefore no PIE/ASLR
//! base-address adjustment: an offline trace analyzer symbolizes whatever
//! addresses the trace itself carries, against whatever binary the caller
//! supplies.
//!
//! ## Address Translation
//!
//! 1. Read a function address off a trace record.
//! 2. Look it up in the binary's DWARF debug info to get function/file/line.
//! 3. Demangle Rust symbol names.

pub mod symbolizer;

pub use symbolizer::Symbolizer;

use crate::funcgraph::SymbolSource;

impl SymbolSource for Symbolizer {
    fn find_function(&self, addr: u64) -> Option<String> {
        let resolved = self.resolve(addr);
        let frame = resolved.frames.first()?;
        if frame.function == "<unknown>" {
            None
        } else {
            Some(frame.function.clone())
        }
    }
}
