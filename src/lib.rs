//! Offline kernel-trace profiling core: per-task event pairing, stack
//! attribution, and function-graph reconstruction, plus the reporter that
//! prints the aggregated summaries.

pub mod cli;
pub mod domain;
pub mod fixture;
pub mod funcgraph;
pub mod hashindex;
pub mod pairing;
pub mod reader;
pub mod registry;
pub mod reporter;
pub mod symbolization;
