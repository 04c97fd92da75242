//! Event formats, classification, and the pairing-graph wiring.

use log::{debug, warn};
use std::collections::HashMap;

use crate::domain::{CoreError, EventId};
use crate::reader::Record;

/// Descriptor for one event type: a stable id plus its (system, name).
///
/// The real registry additionally carries field offset/size tables baked
/// from the trace file's format strings; this crate only needs field
/// *names*, since decoding the raw payload into named fields is the
/// reader's job (see [`crate::reader::Record`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFormat {
    pub id: u64,
    pub name: String,
    pub system: String,
}

/// A single named, typed field within an event format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub signed: bool,
}

/// How the pairing engine treats one event's records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    Undefined,
    Stack,
    SchedSwitch,
    Wakeup,
    Func,
    Syscall,
    Irq,
    Softirq,
    SoftirqRaise,
}

/// Looks up event formats and fields by name.
///
/// Modeled as a trait so tests can substitute a fixed, in-memory catalogue
/// (see [`crate::fixture::StaticEventRegistry`]) in place of a real tracefs
/// format-string parser.
pub trait EventRegistry {
    fn find_event(&self, system: &str, name: &str) -> Option<EventFormat>;
    fn find_field(&self, format: &EventFormat, name: &str) -> Option<FieldDescriptor>;

    fn find_common_field(&self, format: &EventFormat) -> Option<FieldDescriptor> {
        self.find_field(format, "common_pid")
    }

    fn read_number_field(&self, field: &FieldDescriptor, record: &Record) -> Option<u64> {
        record.field(&field.name).map(|v| v as u64)
    }

    fn data_type_id(&self, record: &Record) -> u64;
}

/// The pairing engine's view of one registered event: classification, the
/// field descriptors used to pair and attribute it, and non-owning
/// references to its paired start/end side.
///
/// `start`/`end` are `EventId` indices into the handle-owned event vector
/// rather than pointers, so they stay valid without any lifetime tied to
/// `self`.
pub struct EventData {
    pub id: EventId,
    pub format: EventFormat,
    pub class: EventClass,
    pub start: Option<EventId>,
    pub end: Option<EventId>,
    pub pid_field: Option<FieldDescriptor>,
    /// Field read on *this* record, when acting as an end, to match an open start.
    pub start_match_field: Option<FieldDescriptor>,
    /// Field read on *this* record, when acting as a start, to seed the search value.
    pub end_match_field: Option<FieldDescriptor>,
    pub migrate: bool,
}

impl EventData {
    fn new(id: EventId, format: EventFormat, class: EventClass) -> Self {
        Self {
            id,
            format,
            class,
            start: None,
            end: None,
            pid_field: None,
            start_match_field: None,
            end_match_field: None,
            migrate: false,
        }
    }
}

/// Registered (system, name, class) triples the glue wires at session init.
const KNOWN_EVENTS: &[(&str, &str, EventClass)] = &[
    ("sched", "sched_switch", EventClass::SchedSwitch),
    ("sched", "sched_wakeup", EventClass::Wakeup),
    ("irq", "irq_handler_entry", EventClass::Irq),
    ("irq", "irq_handler_exit", EventClass::Irq),
    ("irq", "softirq_entry", EventClass::Softirq),
    ("irq", "softirq_exit", EventClass::Softirq),
    ("irq", "softirq_raise", EventClass::SoftirqRaise),
    ("ftrace", "funcgraph_entry", EventClass::Func),
    ("ftrace", "funcgraph_exit", EventClass::Func),
    ("raw_syscalls", "sys_enter", EventClass::Syscall),
    ("raw_syscalls", "sys_exit", EventClass::Syscall),
    ("ftrace", "kernel_stack", EventClass::Stack),
];

/// Looks up and registers one `(system, name)` event, returning `None` (and
/// logging) when the registry doesn't know it — a trace that was captured
/// without some event (or on a kernel build missing it) shouldn't block
/// analysis of everything else it does carry.
fn register(
    registry: &dyn EventRegistry,
    events: &mut Vec<EventData>,
    by_name: &mut HashMap<(&'static str, &'static str), EventId>,
    system: &'static str,
    name: &'static str,
    class: EventClass,
) {
    let Some(format) = registry.find_event(system, name) else {
        debug!("event {system}/{name} not present in this trace, skipping");
        return;
    };
    let id = EventId(events.len());
    events.push(EventData::new(id, format, class));
    by_name.insert((system, name), id);
}

/// Resolves a field by name on an event already known to the registry,
/// failing fatally since every field named here was supplied by the wiring
/// table itself: a missing one means the registry disagrees with its own
/// wiring, not that the trace is merely incomplete.
fn resolve_field(
    registry: &dyn EventRegistry,
    events: &[EventData],
    id: EventId,
    field: &str,
) -> Result<FieldDescriptor, CoreError> {
    let format = &events[id.0].format;
    registry.find_field(format, field).ok_or_else(|| CoreError::MissingField {
        system: format.system.clone(),
        name: format.name.clone(),
        field: field.to_string(),
    })
}

/// Wires one start/end pairing. Does nothing if either side wasn't
/// registered (its event wasn't present in the trace).
#[allow(clippy::too_many_arguments)]
fn mate(
    registry: &dyn EventRegistry,
    events: &mut [EventData],
    by_name: &HashMap<(&'static str, &'static str), EventId>,
    start: (&'static str, &'static str),
    pid_field: Option<&str>,
    end_match_field: &str,
    end: (&'static str, &'static str),
    start_match_field: &str,
    migrate: bool,
) -> Result<(), CoreError> {
    let (Some(&start_id), Some(&end_id)) = (by_name.get(&start), by_name.get(&end)) else {
        debug!("skipping pairing {start:?} -> {end:?}: one side absent from this trace");
        return Ok(());
    };

    let end_match_fd = resolve_field(registry, events, start_id, end_match_field)?;
    let start_match_fd = resolve_field(registry, events, end_id, start_match_field)?;
    let pid_fd = pid_field.map(|f| resolve_field(registry, events, start_id, f)).transpose()?;

    events[start_id.0].end = Some(end_id);
    events[start_id.0].end_match_field = Some(end_match_fd);
    events[start_id.0].pid_field.clone_from(&pid_fd);
    events[start_id.0].migrate = migrate;

    events[end_id.0].start = Some(start_id);
    events[end_id.0].start_match_field = Some(start_match_fd);
    events[end_id.0].pid_field = pid_fd;

    Ok(())
}

/// Result of registry init: the handle-owned event table plus a name lookup
/// the function-graph renderer and fixture loader use to find specific ids.
pub struct Wiring {
    pub events: Vec<EventData>,
    pub by_name: HashMap<(&'static str, &'static str), EventId>,
}

/// Registers every known event and wires the pairing graph.
///
/// # Errors
/// Returns [`CoreError::MissingField`] if a pairing names a field that the
/// registry cannot resolve on an event both sides of the pairing are
/// presently registered.
pub fn wire(registry: &dyn EventRegistry) -> Result<Wiring, CoreError> {
    let mut events = Vec::new();
    let mut by_name = HashMap::new();

    for &(system, name, class) in KNOWN_EVENTS {
        register(registry, &mut events, &mut by_name, system, name, class);
    }

    mate(
        registry,
        &mut events,
        &by_name,
        ("sched", "sched_switch"),
        Some("prev_pid"),
        "next_pid",
        ("sched", "sched_wakeup"),
        "pid",
        true,
    )?;
    mate(
        registry,
        &mut events,
        &by_name,
        ("sched", "sched_wakeup"),
        Some("pid"),
        "pid",
        ("sched", "sched_switch"),
        "prev_pid",
        true,
    )?;
    mate(
        registry,
        &mut events,
        &by_name,
        ("irq", "irq_handler_entry"),
        None,
        "irq",
        ("irq", "irq_handler_exit"),
        "irq",
        false,
    )?;
    mate(
        registry,
        &mut events,
        &by_name,
        ("irq", "softirq_entry"),
        None,
        "vec",
        ("irq", "softirq_exit"),
        "vec",
        false,
    )?;
    mate(
        registry,
        &mut events,
        &by_name,
        ("irq", "softirq_raise"),
        None,
        "vec",
        ("irq", "softirq_entry"),
        "vec",
        false,
    )?;
    mate(
        registry,
        &mut events,
        &by_name,
        ("ftrace", "funcgraph_entry"),
        None,
        "func",
        ("ftrace", "funcgraph_exit"),
        "func",
        true,
    )?;
    mate(
        registry,
        &mut events,
        &by_name,
        ("raw_syscalls", "sys_enter"),
        None,
        "id",
        ("raw_syscalls", "sys_exit"),
        "id",
        true,
    )?;

    for event in &events {
        if event.start.is_none() && event.end.is_none() && event.class != EventClass::Stack {
            warn!("{}/{} registered but not paired with anything", event.format.system, event.format.name);
        }
    }

    Ok(Wiring { events, by_name })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::StaticEventRegistry;

    #[test]
    fn wiring_sets_symmetric_backreferences() {
        let registry = StaticEventRegistry::standard();
        let wiring = wire(&registry).unwrap();

        let switch = wiring.by_name[&("sched", "sched_switch")];
        let wakeup = wiring.by_name[&("sched", "sched_wakeup")];

        assert_eq!(wiring.events[switch.0].end, Some(wakeup));
        assert_eq!(wiring.events[wakeup.0].start, Some(switch));
        assert_eq!(wiring.events[wakeup.0].end, Some(switch));
        assert_eq!(wiring.events[switch.0].start, Some(wakeup));
    }

    #[test]
    fn absent_event_is_skipped_not_fatal() {
        let registry = StaticEventRegistry::standard().without("sched", "sched_wakeup");
        let wiring = wire(&registry).unwrap();

        let switch = wiring.by_name[&("sched", "sched_switch")];
        assert!(wiring.events[switch.0].end.is_none());
        assert!(!wiring.by_name.contains_key(&("sched", "sched_wakeup")));
    }
}
