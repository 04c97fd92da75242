//! CLI argument definitions for the demo binary.
//!
//! The binary loads a JSON trace-record fixture, drives a
//! [`crate::pairing::Handle`] over it, and prints the [`crate::reporter`]'s
//! output. The core library has zero dependency on this module or on
//! `clap`.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "traceprof",
    about = "Offline kernel trace profiler: per-task event pairing and stack attribution",
    after_help = "\
EXAMPLES:
    traceprof trace.json                           Print the per-task event/stack report
    traceprof trace.json --binary ./target/app      Also symbolize funcgraph/func events
    traceprof trace.json --funcgraph                Render an indented function-graph trace instead"
)]
pub struct Args {
    /// Path to a JSON trace-record fixture
    pub trace: PathBuf,

    /// Path to an ELF binary carrying DWARF debug info, for symbolizing
    /// funcgraph/func events and kernel stack frames
    #[arg(short, long)]
    pub binary: Option<PathBuf>,

    /// Render the function-graph playback instead of the per-task
    /// event/stack report
    #[arg(long)]
    pub funcgraph: bool,
}
