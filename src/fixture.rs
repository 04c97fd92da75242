//! In-memory stand-ins for a real tracefs event registry and trace reader.
//!
//! `StaticEventRegistry` is a fixed, in-memory catalogue of the event
//! formats this crate knows how to pair and render; `load` turns a small
//! JSON record stream into a `Vec<Rc<Record>>`. A real deployment would read
//! both off a live trace session, but the demo binary and the integration
//! tests need something concrete to drive the pairing engine and renderer
//! end to end, so this module supplies it.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use crate::domain::{CpuId, FixtureError, LongSize, Timestamp};
use crate::reader::{Record, TraceReader};
use crate::registry::{EventFormat, EventRegistry, FieldDescriptor};

struct KnownEvent {
    system: &'static str,
    name: &'static str,
    fields: &'static [&'static str],
}

const KNOWN: &[KnownEvent] = &[
    KnownEvent {
        system: "sched",
        name: "sched_switch",
        fields: &["common_pid", "prev_pid", "prev_state", "next_pid"],
    },
    KnownEvent { system: "sched", name: "sched_wakeup", fields: &["common_pid", "pid", "success"] },
    KnownEvent { system: "irq", name: "irq_handler_entry", fields: &["common_pid", "irq"] },
    KnownEvent { system: "irq", name: "irq_handler_exit", fields: &["common_pid", "irq"] },
    KnownEvent { system: "irq", name: "softirq_entry", fields: &["common_pid", "vec"] },
    KnownEvent { system: "irq", name: "softirq_exit", fields: &["common_pid", "vec"] },
    KnownEvent { system: "irq", name: "softirq_raise", fields: &["common_pid", "vec"] },
    KnownEvent {
        system: "ftrace",
        name: "funcgraph_entry",
        fields: &["common_pid", "func", "depth"],
    },
    KnownEvent {
        system: "ftrace",
        name: "funcgraph_exit",
        fields: &["common_pid", "func", "depth", "calltime", "rettime"],
    },
    KnownEvent { system: "raw_syscalls", name: "sys_enter", fields: &["common_pid", "id"] },
    KnownEvent { system: "raw_syscalls", name: "sys_exit", fields: &["common_pid", "id"] },
    KnownEvent { system: "ftrace", name: "kernel_stack", fields: &["common_pid"] },
    KnownEvent { system: "ftrace", name: "function", fields: &["common_pid", "ip", "parent_ip"] },
];

/// Stable id for a (system, name) pair; deliberately not cryptographic,
/// just collision-resistant enough for the handful of event types a trace
/// carries.
fn event_key_hash(system: &str, name: &str) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in system.bytes().chain(std::iter::once(b'/')).chain(name.bytes()) {
        h ^= u64::from(byte);
        h = h.wrapping_mul(0x0000_0100_0000_01B3);
    }
    h
}

/// Fixed catalogue of the event formats the pairing graph wires together,
/// plus `function`, used only by the standalone function-graph renderer.
pub struct StaticEventRegistry {
    known: Vec<(&'static str, &'static str, &'static [&'static str])>,
}

impl StaticEventRegistry {
    #[must_use]
    pub fn standard() -> Self {
        Self { known: KNOWN.iter().map(|k| (k.system, k.name, k.fields)).collect() }
    }

    /// Returns a copy of this registry with one event removed, so tests can
    /// exercise the "absent event" skip path in [`crate::registry::wire`].
    #[must_use]
    pub fn without(mut self, system: &str, name: &str) -> Self {
        self.known.retain(|(s, n, _)| !(*s == system && *n == name));
        self
    }
}

impl EventRegistry for StaticEventRegistry {
    fn find_event(&self, system: &str, name: &str) -> Option<EventFormat> {
        self.known.iter().find(|(s, n, _)| *s == system && *n == name).map(|(s, n, _)| EventFormat {
            id: event_key_hash(s, n),
            name: (*n).to_string(),
            system: (*s).to_string(),
        })
    }

    fn find_field(&self, format: &EventFormat, name: &str) -> Option<FieldDescriptor> {
        self.known
            .iter()
            .find(|(s, n, _)| *s == format.system && *n == format.name)
            .and_then(|(_, _, fields)| fields.iter().find(|f| **f == name))
            .map(|name| FieldDescriptor { name: (*name).to_string(), signed: false })
    }

    fn data_type_id(&self, record: &Record) -> u64 {
        event_key_hash(&record.system, &record.name)
    }
}

/// One record in a JSON trace fixture.
#[derive(Debug, Deserialize)]
pub struct FixtureRecord {
    pub cpu: u32,
    pub timestamp: u64,
    pub system: String,
    pub name: String,
    #[serde(default)]
    pub fields: HashMap<String, i64>,
    #[serde(default)]
    pub caller: Vec<u64>,
}

/// Loads a sequence of `FixtureRecord`s into `Rc<Record>`s in file order.
///
/// # Errors
/// Returns [`FixtureError::Json`] if the payload isn't valid JSON matching
/// `FixtureRecord`.
pub fn parse(json: &str) -> Result<Vec<Rc<Record>>, FixtureError> {
    let raw: Vec<FixtureRecord> = serde_json::from_str(json)?;
    Ok(raw
        .into_iter()
        .map(|r| {
            Rc::new(Record {
                cpu: CpuId(r.cpu),
                timestamp: Timestamp(r.timestamp),
                system: r.system,
                name: r.name,
                fields: r.fields,
                caller: r.caller,
            })
        })
        .collect())
}

/// Reads and parses a JSON trace fixture from disk.
///
/// # Errors
/// Returns [`FixtureError::Io`] if the file cannot be read, or
/// [`FixtureError::Json`] if its contents are not valid fixture JSON.
pub fn load(path: &Path) -> Result<Vec<Rc<Record>>, FixtureError> {
    let text = std::fs::read_to_string(path)?;
    parse(&text)
}

/// A [`TraceReader`] backed by an in-memory record list, grouped into
/// per-CPU queues so `peek`/`read` can look one record ahead on the same CPU
/// the way the function-graph renderer's leaf detection needs.
///
/// A real reader streams records off a ring buffer per CPU; this one replays
/// a fixed `Vec` loaded from JSON, which is all the demo binary and tests
/// need.
pub struct FixtureReader {
    by_cpu: HashMap<u32, std::collections::VecDeque<Rc<Record>>>,
    current_cpu: CpuId,
    long_size: LongSize,
    cpu_count: usize,
}

impl FixtureReader {
    #[must_use]
    pub fn new(records: Vec<Rc<Record>>, long_size: LongSize) -> Self {
        let mut by_cpu: HashMap<u32, std::collections::VecDeque<Rc<Record>>> = HashMap::new();
        for record in records {
            by_cpu.entry(record.cpu.0).or_default().push_back(record);
        }
        let cpu_count = by_cpu.len();
        Self { by_cpu, current_cpu: CpuId(0), long_size, cpu_count }
    }

    /// Drains every record across every CPU queue in timestamp order,
    /// driving `process` with `current_cpu` tracking the record being fed.
    ///
    /// Repeatedly takes the earliest front-of-queue record across all
    /// per-CPU queues, so callers don't have to pre-sort a multi-CPU
    /// fixture themselves.
    pub fn next_record(&mut self) -> Option<Rc<Record>> {
        let cpu = self
            .by_cpu
            .iter()
            .filter_map(|(cpu, q)| q.front().map(|r| (r.timestamp, *cpu)))
            .min()
            .map(|(_, cpu)| cpu)?;
        self.current_cpu = CpuId(cpu);
        self.by_cpu.get_mut(&cpu).and_then(std::collections::VecDeque::pop_front)
    }
}

impl TraceReader for FixtureReader {
    fn peek(&mut self, cpu: CpuId) -> Option<Rc<Record>> {
        self.by_cpu.get(&cpu.0).and_then(|q| q.front()).cloned()
    }

    fn read(&mut self, cpu: CpuId) -> Option<Rc<Record>> {
        self.by_cpu.get_mut(&cpu.0).and_then(std::collections::VecDeque::pop_front)
    }

    fn current_cpu(&self) -> CpuId {
        self.current_cpu
    }

    fn long_size(&self) -> LongSize {
        self.long_size
    }

    fn cpu_count(&self) -> usize {
        self.cpu_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_reader_peeks_without_consuming() {
        let records = parse(
            r#"[
                {"cpu":0,"timestamp":10,"system":"ftrace","name":"funcgraph_entry","fields":{"common_pid":1,"func":100,"depth":0}},
                {"cpu":0,"timestamp":20,"system":"ftrace","name":"funcgraph_exit","fields":{"common_pid":1,"func":100,"depth":0}}
            ]"#,
        )
        .unwrap();
        let mut reader = FixtureReader::new(records, LongSize::new(8).unwrap());

        let peeked = reader.peek(CpuId(0)).unwrap();
        assert_eq!(peeked.name, "funcgraph_entry");
        // peek is idempotent: reading still returns the same record.
        let read = reader.read(CpuId(0)).unwrap();
        assert_eq!(read.name, "funcgraph_entry");
        assert_eq!(reader.peek(CpuId(0)).unwrap().name, "funcgraph_exit");
    }

    #[test]
    fn next_record_interleaves_cpus_by_timestamp() {
        let records = parse(
            r#"[
                {"cpu":1,"timestamp":200,"system":"irq","name":"irq_handler_entry","fields":{"common_pid":1,"irq":1}},
                {"cpu":0,"timestamp":100,"system":"irq","name":"irq_handler_entry","fields":{"common_pid":2,"irq":2}}
            ]"#,
        )
        .unwrap();
        let mut reader = FixtureReader::new(records, LongSize::new(8).unwrap());

        let first = reader.next_record().unwrap();
        assert_eq!(first.timestamp, Timestamp(100));
        let second = reader.next_record().unwrap();
        assert_eq!(second.timestamp, Timestamp(200));
        assert!(reader.next_record().is_none());
    }

    #[test]
    fn parses_minimal_fixture() {
        let json = r#"[
            {"cpu": 0, "timestamp": 1000, "system": "sched", "name": "sched_switch",
             "fields": {"common_pid": 10, "prev_pid": 10, "prev_state": 0, "next_pid": 20}}
        ]"#;
        let records = parse(json).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].field("next_pid"), Some(20));
    }

    #[test]
    fn round_trips_through_a_file() {
        let json = r#"[{"cpu": 1, "timestamp": 5, "system": "irq", "name": "irq_handler_entry", "fields": {"common_pid": 3, "irq": 7}}]"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.json");
        std::fs::write(&path, json).unwrap();

        let records = load(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].cpu, CpuId(1));
    }

    #[test]
    fn unknown_event_has_no_format() {
        let registry = StaticEventRegistry::standard();
        assert!(registry.find_event("bogus", "nope").is_none());
    }
}
