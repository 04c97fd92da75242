//! Reporter: aggregates, sorts, and prints per-task event summaries and
//! per-event stack summaries at end-of-stream.

use std::cmp::Ordering;
use std::io::{self, Write};

use crate::funcgraph::SymbolSource;
use crate::pairing::{EventHash, Handle, TaskData};
use crate::registry::{EventClass, EventData};

const SCHED_SWITCH_STATE_ALPHABET: &str = "RSDTtXZxKWP";

/// Walks every task in the handle, printing its event summaries, and
/// leaving the handle empty: this is a one-shot drain, not a repeatable
/// view.
///
/// # Errors
/// Propagates any I/O error from writing to `out`.
pub fn report(handle: &mut Handle, symbols: &dyn SymbolSource, out: &mut impl Write) -> io::Result<()> {
    let mut tasks: Vec<TaskData> = handle.drain_tasks().collect();
    tasks.sort_by_key(|t| t.pid.0);

    for mut task in tasks {
        output_task(&handle.events, symbols, &mut task, out)?;
    }
    Ok(())
}

fn output_task(
    events: &[EventData],
    symbols: &dyn SymbolSource,
    task: &mut TaskData,
    out: &mut impl Write,
) -> io::Result<()> {
    // Outstanding starts never closed by end-of-stream are freed here;
    // dropping them releases any stack record reference they hold.
    let _ = task.starts.drain().count();

    let mut aggs: Vec<EventHash> = task.events.drain().collect();
    aggs.sort_by(|a, b| compare_events(events, a, b));

    writeln!(out, "task: {}", task.pid)?;
    for mut agg in aggs {
        let label = event_label(events, symbols, &agg);
        let avg = agg.time_total.checked_div(agg.count).unwrap_or(0);
        writeln!(
            out,
            "  Event: {label} ({count}) Total: {total} Avg: {avg} Max: {max} Min: {min}",
            count = agg.count,
            total = agg.time_total,
            max = agg.time_max,
            min = agg.time_min,
        )?;
        for stack in agg.stacks.drain() {
            writeln!(out, "    stack x{} ({}ns total): {:?}", stack.count, stack.time, stack.caller)?;
        }
    }
    Ok(())
}

/// Total order over `EventHash` aggregates: `sched_switch` < wakeup <
/// everything-else-by-id; ties on `sched_switch` broken by ascending `val`
/// so runnable (`val == 0`) sorts before the blocked/preempted states.
fn compare_events(events: &[EventData], a: &EventHash, b: &EventHash) -> Ordering {
    fn rank(class: EventClass) -> u8 {
        match class {
            EventClass::SchedSwitch => 0,
            EventClass::Wakeup => 1,
            _ => 2,
        }
    }

    let class_a = events[a.event.0].class;
    let class_b = events[b.event.0].class;
    let (ra, rb) = (rank(class_a), rank(class_b));

    match ra.cmp(&rb) {
        Ordering::Equal if ra == 0 => a.val.cmp(&b.val),
        Ordering::Equal if ra == 2 => a.event.0.cmp(&b.event.0),
        other => other,
    }
}

fn event_label(events: &[EventData], symbols: &dyn SymbolSource, agg: &EventHash) -> String {
    let event = &events[agg.event.0];
    match event.class {
        EventClass::SchedSwitch => sched_switch_label(agg.val),
        EventClass::Func => match symbols.find_function(agg.val) {
            Some(name) => format!("func: {name}()"),
            None => format!("func: 0x{:x}", agg.val),
        },
        _ => format!("{}:{}", event.format.name, agg.val),
    }
}

/// State string built from the bit positions of `val`: bit 0 maps to the
/// letter at alphabet index 1, bit 1 to index 2, and so on; `val == 0`
/// prints `R`.
fn sched_switch_label(val: u64) -> String {
    if val == 0 {
        return "R".to_string();
    }
    let alphabet: Vec<char> = SCHED_SWITCH_STATE_ALPHABET.chars().collect();
    let mut label = String::new();
    for bit in 0..63 {
        if val & (1 << bit) != 0 {
            if let Some(c) = alphabet.get(bit + 1) {
                label.push(*c);
            }
        }
    }
    label
}
