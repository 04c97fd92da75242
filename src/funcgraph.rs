//! Function-graph renderer: a standalone component, sharing only the event
//! registry with the pairing engine. It renders an indented call trace with
//! durations and overhead glyphs by peeking one record ahead on the same CPU
//! to detect leaf calls.
//!
//! Durations always come from a `funcgraph_exit` record's own `calltime`/
//! `rettime` fields, never from the difference between two records'
//! timestamps: a leaf call's exit is peeked rather than consumed as its own
//! record, but the arithmetic is identical either way.

use std::fmt::Write as _;
use std::rc::Rc;

use crate::domain::LongSize;
use crate::reader::{Record, TraceReader};

/// Resolves a function address to a symbol name.
pub trait SymbolSource {
    fn find_function(&self, addr: u64) -> Option<String>;
}

/// A symbol source that never resolves anything, for traces with no
/// accompanying binary.
pub struct NoSymbols;

impl SymbolSource for NoSymbols {
    fn find_function(&self, _addr: u64) -> Option<String> {
        None
    }
}

/// Renders one of the four ftrace-class events this crate knows about
/// (`function`, `funcgraph_entry`, `funcgraph_exit`, `kernel_stack`),
/// appending formatted lines to `out`.
pub fn render(
    reader: &mut dyn TraceReader,
    symbols: &dyn SymbolSource,
    record: &Rc<Record>,
    out: &mut String,
) {
    match record.name.as_str() {
        "function" => render_function(symbols, record, out),
        "funcgraph_entry" => render_entry(reader, symbols, record, out),
        "funcgraph_exit" => render_exit(record, out),
        "kernel_stack" => render_stack(reader.long_size(), record, out),
        _ => {}
    }
}

fn symbolize(symbols: &dyn SymbolSource, addr: u64) -> String {
    symbols.find_function(addr).unwrap_or_else(|| format!("0x{addr:x}"))
}

fn render_function(symbols: &dyn SymbolSource, record: &Rc<Record>, out: &mut String) {
    let Some(caller) = record.field("ip") else { return };
    let Some(parent) = record.field("parent_ip") else { return };
    let _ = writeln!(out, "{} <- {}", symbolize(symbols, caller as u64), symbolize(symbols, parent as u64));
}

/// Overhead glyph from a duration in nanoseconds.
#[must_use]
pub fn overhead_glyph(duration_ns: u64) -> &'static str {
    if duration_ns == 0 {
        "  "
    } else if duration_ns > 100_000_000 {
        "! "
    } else if duration_ns > 10_000_000 {
        "+ "
    } else {
        "  "
    }
}

/// Formats a duration in nanoseconds the way the renderer's duration column
/// does: `usecs[.nsec_rem]` right-padded to 7 characters, followed by the
/// column separator.
#[must_use]
pub fn format_duration(duration_ns: u64) -> String {
    let usecs = duration_ns / 1000;
    let nsec_rem = duration_ns % 1000;
    let mut field = format!("{usecs}");
    if field.len() < 7 {
        field.push_str(&format!(".{nsec_rem:03}"));
    }
    format!("{field:<7} us |  ")
}

/// No-overhead, no-duration prefix used for a nested (non-leaf) entry.
fn empty_duration_column() -> String {
    format!("{:<7}|  ", "")
}

/// Elapsed time of a call from its `funcgraph_exit` record's own `calltime`
/// and `rettime` fields. Both fields live on the exit record, never on the
/// entry, so a leaf call (whose exit is only peeked, not consumed as its own
/// record) and a plain nested return compute duration the same way.
fn exit_duration(exit: &Record) -> u64 {
    let Some(calltime) = exit.field("calltime") else { return 0 };
    let Some(rettime) = exit.field("rettime") else { return 0 };
    rettime.saturating_sub(calltime).try_into().unwrap_or(0)
}

fn render_entry(reader: &mut dyn TraceReader, symbols: &dyn SymbolSource, record: &Rc<Record>, out: &mut String) {
    let Some(func) = record.field("func") else { return };
    let depth = record.field("depth").unwrap_or(0).max(0) as usize;
    let indent = "  ".repeat(depth);
    let label = symbols.find_function(func as u64).unwrap_or_else(|| format!("0x{func:x}"));

    if let Some(peeked) = reader.peek(record.cpu) {
        if is_matching_leaf(record, &peeked) {
            reader.read(record.cpu);
            let delta = exit_duration(&peeked);
            let _ = writeln!(out, "{}{}{}{}();", overhead_glyph(delta), format_duration(delta), indent, label);
            return;
        }
    }

    let _ = writeln!(out, "  {}{}{}() {{", empty_duration_column(), indent, label);
}

fn is_matching_leaf(entry: &Record, candidate: &Record) -> bool {
    candidate.name == "funcgraph_exit"
        && candidate.cpu == entry.cpu
        && candidate.field("common_pid") == entry.field("common_pid")
        && candidate.field("func") == entry.field("func")
}

fn render_exit(record: &Rc<Record>, out: &mut String) {
    let depth = record.field("depth").unwrap_or(0).max(0) as usize;
    let indent = "  ".repeat(depth);
    let delta = exit_duration(record);
    let _ = writeln!(out, "{}{}{}}}", overhead_glyph(delta), format_duration(delta), indent);
}

/// Stack terminator check from `trace_stack_handler`: an all-ones word (host
/// width) or a word whose low 32 bits are `-1`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::invalid_upcast_comparisons)]
pub fn is_stack_terminator(long_size: LongSize, addr: u64) -> bool {
    (long_size.bytes() == 8 && addr == u64::MAX) || (addr as i32) == -1
}

fn render_stack(long_size: LongSize, record: &Rc<Record>, out: &mut String) {
    let _ = writeln!(out, " <stack trace>");
    for &addr in &record.caller {
        if is_stack_terminator(long_size, addr) {
            break;
        }
        let _ = writeln!(out, " => 0x{addr:016x}");
    }
}
