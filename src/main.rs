//! Demo binary: loads a JSON trace-record fixture, drives it through the
//! pairing engine, and prints the reporter's output — or, with
//! `--funcgraph`, renders the function-graph playback instead.

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use traceprof::cli::Args;
use traceprof::domain::LongSize;
use traceprof::fixture::{self, FixtureReader, StaticEventRegistry};
use traceprof::funcgraph::{self, NoSymbols, SymbolSource};
use traceprof::pairing::Handle;
use traceprof::registry::wire;
use traceprof::reporter::report;
use traceprof::symbolization::Symbolizer;

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let symbolizer = match &args.binary {
        Some(path) => {
            let symbolizer = Symbolizer::new(path)
                .with_context(|| format!("failed to load debug info from {}", path.display()))?;
            Some(symbolizer)
        }
        None => None,
    };
    let symbols: &dyn SymbolSource = symbolizer.as_ref().map_or(&NoSymbols, |s| s as &dyn SymbolSource);

    let records = fixture::load(&args.trace)
        .with_context(|| format!("failed to load trace fixture {}", args.trace.display()))?;
    info!("loaded {} records from {}", records.len(), args.trace.display());

    if args.funcgraph {
        run_funcgraph(records, symbols)
    } else {
        run_report(&records, symbols)
    }
}

fn run_report(
    records: &[std::rc::Rc<traceprof::reader::Record>],
    symbols: &dyn SymbolSource,
) -> Result<()> {
    let registry = StaticEventRegistry::standard();
    let wiring = wire(&registry).context("failed to wire pairing graph")?;
    let cpu_count = records.iter().map(|r| r.cpu.0).max().map_or(1, |m| m as usize + 1);
    let mut handle = Handle::new(wiring.events, cpu_count, LongSize::new(8)?);

    for record in records {
        if let Err(err) = handle.process(&registry, record) {
            warn!("structural error processing record, aborting: {err}");
            return Err(err.into());
        }
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    report(&mut handle, symbols, &mut out).context("failed to write report")?;
    Ok(())
}

fn run_funcgraph(
    records: Vec<std::rc::Rc<traceprof::reader::Record>>,
    symbols: &dyn SymbolSource,
) -> Result<()> {
    let mut reader = FixtureReader::new(records, LongSize::new(8)?);
    let mut out = String::new();

    while let Some(record) = reader.next_record() {
        funcgraph::render(&mut reader, symbols, &record, &mut out);
    }

    print!("{out}");
    Ok(())
}
