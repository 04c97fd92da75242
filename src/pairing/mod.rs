//! The pairing engine: per-task start/end reconciliation, plus the
//! task/event/stack aggregates it produces.
//!
//! Dispatch on event class lives here too: a record either hits one of the
//! specialized handlers in [`sched`] / [`stack`], or falls through to the
//! generic handler below when no specialized handler is installed for its
//! class.

pub mod sched;
pub mod stack;

use log::{debug, trace};
use std::rc::Rc;

use crate::domain::{CoreError, EventId, LongSize, Pid, Timestamp};
use crate::hashindex::{stack_content_hash, HashIndex};
use crate::reader::Record;
use crate::registry::{EventClass, EventData, EventRegistry};

/// Owned reference to the record a captured stack came from, plus its size
/// in bytes. Acquiring is `Rc::clone`, releasing is drop.
pub struct StackHolder {
    pub record: Rc<Record>,
    pub size: usize,
}

/// An outstanding start: an event waiting for its matching end.
pub struct StartData {
    pub event: EventId,
    pub timestamp: Timestamp,
    pub search_val: u64,
    pub val: u64,
    pub stack: Option<StackHolder>,
}

/// One deduplicated stack under an `EventHash`.
pub struct StackData {
    pub count: u64,
    pub time: u64,
    pub time_min: u64,
    pub time_max: u64,
    pub size: usize,
    pub caller: Vec<u64>,
}

/// Per-task, per-`(event, search_val, val)` aggregate.
pub struct EventHash {
    pub event: EventId,
    pub search_val: u64,
    pub val: u64,
    pub count: u64,
    pub time_total: u64,
    pub time_max: u64,
    pub time_min: u64,
    pub last_time: u64,
    pub stacks: HashIndex<StackData>,
}

impl EventHash {
    fn new(event: EventId, search_val: u64, val: u64) -> Self {
        Self {
            event,
            search_val,
            val,
            count: 0,
            time_total: 0,
            time_max: 0,
            time_min: 0,
            last_time: 0,
            stacks: HashIndex::new(32),
        }
    }
}

/// Lookup key for an outstanding start, stored in `TaskData::last_start`
/// instead of a raw pointer into the start hash table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartKey {
    pub event: EventId,
    pub search_val: u64,
}

/// Lookup key for a closed `EventHash`, stored in `TaskData::last_event`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventKey {
    pub event: EventId,
    pub search_val: u64,
    pub val: u64,
}

/// Per-task state: open starts, closed aggregates, and the ephemeral "last"
/// slots stack attribution reads.
pub struct TaskData {
    pub pid: Pid,
    pub sleeping: bool,
    pub starts: HashIndex<StartData>,
    pub events: HashIndex<EventHash>,
    pub last_start: Option<StartKey>,
    pub last_event: Option<EventKey>,
    /// One-shot forwarding set by the wakeup handler; cleared on read.
    pub proxy: Option<Pid>,
}

impl TaskData {
    fn new(pid: Pid) -> Self {
        Self {
            pid,
            sleeping: false,
            starts: HashIndex::new(16),
            events: HashIndex::new(32),
            last_start: None,
            last_event: None,
            proxy: None,
        }
    }
}

/// Extension point for per-task bookkeeping (quota enforcement, live
/// metrics, ...); intentionally empty here.
fn account_task(_task: &TaskData) {}

fn mix(event: EventId, a: u64, b: u64) -> u64 {
    let mut h = event.0 as u64;
    h = h.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(a);
    h = h.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(b);
    h
}

fn fold_stack(agg: &mut EventHash, caller: &[u64], weight: u64) {
    let bytes: Vec<u8> = caller.iter().flat_map(|a| a.to_le_bytes()).collect();
    let hash = stack_content_hash(&bytes);
    let entry = agg.stacks.get_or_insert_with(
        hash,
        |s: &StackData| s.caller == caller,
        || StackData { count: 0, time: 0, time_min: 0, time_max: 0, size: bytes.len(), caller: caller.to_vec() },
    );
    entry.count += 1;
    entry.time += weight;
    entry.time_max = entry.time_max.max(weight);
    entry.time_min = if entry.count == 1 { weight } else { entry.time_min.min(weight) };
}

/// Root of one analysis session: the wired event table and the task hash.
pub struct Handle {
    pub events: Vec<EventData>,
    tasks: HashIndex<TaskData>,
    pub cpu_count: usize,
    pub long_size: LongSize,
}

impl Handle {
    #[must_use]
    pub fn new(events: Vec<EventData>, cpu_count: usize, long_size: LongSize) -> Self {
        Self { events, tasks: HashIndex::new(1024), cpu_count, long_size }
    }

    fn task_mut(&mut self, pid: Pid) -> &mut TaskData {
        let task = self.tasks.get_or_insert_with(pid.0, |t: &TaskData| t.pid == pid, || TaskData::new(pid));
        account_task(task);
        task
    }

    #[must_use]
    pub fn task(&self, pid: Pid) -> Option<&TaskData> {
        self.tasks.find(pid.0, |t| t.pid == pid)
    }

    pub fn tasks_iter(&self) -> impl Iterator<Item = &TaskData> {
        self.tasks.iter()
    }

    /// Removes and returns every task, for the reporter's end-of-stream walk.
    pub fn drain_tasks(&mut self) -> impl Iterator<Item = TaskData> + '_ {
        self.tasks.drain()
    }

    fn find_event_id(&self, system: &str, name: &str) -> Option<EventId> {
        self.events.iter().find(|e| e.format.system == system && e.format.name == name).map(|e| e.id)
    }

    fn start_mut(&mut self, pid: Pid, key: StartKey) -> Option<&mut StartData> {
        let task = self.tasks.find_mut(pid.0, |t| t.pid == pid)?;
        let hash = mix(key.event, key.search_val, 0);
        task.starts.find_mut(hash, |s| s.event == key.event && s.search_val == key.search_val)
    }

    fn event_mut(&mut self, pid: Pid, key: EventKey) -> Option<&mut EventHash> {
        let task = self.tasks.find_mut(pid.0, |t| t.pid == pid)?;
        let hash = mix(key.event, key.search_val, key.val);
        task.events.find_mut(hash, |e| e.event == key.event && e.search_val == key.search_val && e.val == key.val)
    }

    fn open_start(&mut self, pid: Pid, event: EventId, timestamp: Timestamp, search_val: u64, val: u64) -> StartKey {
        let key = StartKey { event, search_val };
        let hash = mix(event, search_val, 0);
        let task = self.task_mut(pid);
        task.starts.add(hash, StartData { event, timestamp, search_val, val, stack: None });
        key
    }

    #[allow(clippy::needless_pass_by_value)]
    fn close_start(&mut self, pid: Pid, start: StartData, end_ts: Timestamp) -> EventKey {
        let delta = start.timestamp.delta_to(end_ts);
        let key = EventKey { event: start.event, search_val: start.search_val, val: start.val };
        let task = self.task_mut(pid);
        let hash = mix(key.event, key.search_val, key.val);
        let agg = task.events.get_or_insert_with(
            hash,
            |e: &EventHash| e.event == key.event && e.search_val == key.search_val && e.val == key.val,
            || EventHash::new(key.event, key.search_val, key.val),
        );
        agg.count += 1;
        agg.time_total += delta;
        agg.last_time = delta;
        agg.time_max = agg.time_max.max(delta);
        agg.time_min = if agg.count == 1 { delta } else { agg.time_min.min(delta) };
        if let Some(holder) = &start.stack {
            fold_stack(agg, &holder.record.caller, delta);
        }
        key
    }

    fn close_start_matching(&mut self, pid: Pid, event: EventId, search_val: u64, end_ts: Timestamp) -> Option<EventKey> {
        let hash = mix(event, search_val, 0);
        let start = {
            let task = self.task_mut(pid);
            task.starts.take(hash, |s| s.event == event && s.search_val == search_val)?
        };
        Some(self.close_start(pid, start, end_ts))
    }

    fn resolve_pid(&self, registry: &dyn EventRegistry, eid: EventId, record: &Record) -> Result<Option<Pid>, CoreError> {
        let event = &self.events[eid.0];
        if let Some(field) = &event.pid_field {
            return Ok(registry.read_number_field(field, record).map(Pid));
        }
        let common = registry.find_common_field(&event.format).ok_or_else(|| CoreError::MissingCommonPid {
            system: event.format.system.clone(),
            name: event.format.name.clone(),
        })?;
        Ok(registry.read_number_field(&common, record).map(Pid))
    }

    /// Feeds one record through the pairing engine.
    ///
    /// # Errors
    /// Returns [`CoreError`] for structural failures (a wired field the
    /// registry can no longer resolve). Data errors — an unmatched end, a
    /// record with an unreadable optional field — are silently dropped, not
    /// surfaced as an error.
    pub fn process(&mut self, registry: &dyn EventRegistry, record: &Rc<Record>) -> Result<(), CoreError> {
        let Some(eid) = self.find_event_id(&record.system, &record.name) else {
            trace!("{}/{}: not a registered event, dropping", record.system, record.name);
            return Ok(());
        };
        match self.events[eid.0].class {
            EventClass::SchedSwitch => sched::handle_sched_switch(self, eid, record),
            EventClass::Wakeup => sched::handle_sched_wakeup(self, eid, record),
            EventClass::Stack => {
                stack::handle_stack(self, record);
                Ok(())
            }
            _ => self.handle_generic(registry, eid, record),
        }
    }

    fn handle_generic(&mut self, registry: &dyn EventRegistry, eid: EventId, record: &Rc<Record>) -> Result<(), CoreError> {
        let (is_end, is_start) = {
            let event = &self.events[eid.0];
            (event.start.is_some(), event.end.is_some())
        };

        if !is_end && !is_start {
            if let Some(pid) = self.resolve_pid(registry, eid, record)? {
                let task = self.task_mut(pid);
                task.last_start = None;
                task.last_event = None;
            }
            return Ok(());
        }

        if is_end {
            self.handle_generic_end(registry, eid, record)?;
        }
        if is_start {
            self.handle_generic_start(registry, eid, record)?;
        }
        Ok(())
    }

    fn handle_generic_end(&mut self, registry: &dyn EventRegistry, eid: EventId, record: &Rc<Record>) -> Result<(), CoreError> {
        let (start_event, match_field, system, name) = {
            let event = &self.events[eid.0];
            let start_event = event.start.expect("caller checked is_end");
            let field = event.start_match_field.clone().ok_or_else(|| CoreError::MissingField {
                system: event.format.system.clone(),
                name: event.format.name.clone(),
                field: "start_match_field".to_string(),
            })?;
            (start_event, field, event.format.system.clone(), event.format.name.clone())
        };

        let Some(v) = registry.read_number_field(&match_field, record) else {
            debug!("{system}/{name}: match field unreadable, dropping record");
            return Ok(());
        };
        let Some(pid) = self.resolve_pid(registry, eid, record)? else {
            debug!("{system}/{name}: no pid for record, dropping");
            return Ok(());
        };

        match self.close_start_matching(pid, start_event, v, record.timestamp) {
            Some(key) => {
                let task = self.task_mut(pid);
                task.last_start = None;
                task.last_event = Some(key);
            }
            None => trace!("{system}/{name}: unmatched end for pid {pid}, dropping"),
        }
        Ok(())
    }

    fn handle_generic_start(&mut self, registry: &dyn EventRegistry, eid: EventId, record: &Rc<Record>) -> Result<(), CoreError> {
        let match_field = {
            let event = &self.events[eid.0];
            event.end_match_field.clone().ok_or_else(|| CoreError::MissingField {
                system: event.format.system.clone(),
                name: event.format.name.clone(),
                field: "end_match_field".to_string(),
            })?
        };

        let Some(v) = registry.read_number_field(&match_field, record) else {
            return Ok(());
        };
        let Some(pid) = self.resolve_pid(registry, eid, record)? else {
            return Ok(());
        };

        let key = self.open_start(pid, eid, record.timestamp, v, v);
        let task = self.task_mut(pid);
        task.last_start = Some(key);
        task.last_event = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{parse, StaticEventRegistry};
    use crate::registry::wire;

    fn handle() -> (Handle, StaticEventRegistry) {
        let registry = StaticEventRegistry::standard();
        let wiring = wire(&registry).unwrap();
        (Handle::new(wiring.events, 1, LongSize::new(8).unwrap()), registry)
    }

    #[test]
    fn preempted_task_gets_one_short_sched_switch_event() {
        let (mut handle, registry) = handle();
        let records = parse(
            r#"[
                {"cpu":0,"timestamp":1000,"system":"sched","name":"sched_switch","fields":{"common_pid":10,"prev_pid":10,"prev_state":0,"next_pid":20}},
                {"cpu":0,"timestamp":1500,"system":"sched","name":"sched_switch","fields":{"common_pid":20,"prev_pid":20,"prev_state":0,"next_pid":10}}
            ]"#,
        )
        .unwrap();
        for r in &records {
            handle.process(&registry, r).unwrap();
        }

        let task = handle.task(Pid(10)).unwrap();
        let switch_id = handle.find_event_id("sched", "sched_switch").unwrap();
        let agg = task.events.find(mix(switch_id, 10, 0), |e| e.event == switch_id).unwrap();
        assert_eq!(agg.count, 1);
        assert_eq!(agg.time_total, 500);
        assert_eq!(agg.val, 0);
    }

    #[test]
    fn blocked_then_woken_splits_into_two_aggregates() {
        let (mut handle, registry) = handle();
        let records = parse(
            r#"[
                {"cpu":0,"timestamp":1000,"system":"sched","name":"sched_switch","fields":{"common_pid":10,"prev_pid":10,"prev_state":1,"next_pid":20}},
                {"cpu":0,"timestamp":1800,"system":"sched","name":"sched_wakeup","fields":{"common_pid":20,"pid":10,"success":1}},
                {"cpu":0,"timestamp":2000,"system":"sched","name":"sched_switch","fields":{"common_pid":20,"prev_pid":20,"prev_state":0,"next_pid":10}}
            ]"#,
        )
        .unwrap();
        for r in &records {
            handle.process(&registry, r).unwrap();
        }

        let task = handle.task(Pid(10)).unwrap();
        let switch_id = handle.find_event_id("sched", "sched_switch").unwrap();
        let wakeup_id = handle.find_event_id("sched", "sched_wakeup").unwrap();

        let switch_agg = task.events.find(mix(switch_id, 10, 1), |e| e.event == switch_id && e.val == 1).unwrap();
        assert_eq!(switch_agg.time_total, 800);

        let wakeup_agg = task.events.find(mix(wakeup_id, 10, 10), |e| e.event == wakeup_id).unwrap();
        assert_eq!(wakeup_agg.time_total, 200);
    }

    #[test]
    fn irq_pair_accrues_one_event() {
        let (mut handle, registry) = handle();
        let records = parse(
            r#"[
                {"cpu":0,"timestamp":100,"system":"irq","name":"irq_handler_entry","fields":{"common_pid":3,"irq":7}},
                {"cpu":0,"timestamp":250,"system":"irq","name":"irq_handler_exit","fields":{"common_pid":3,"irq":7}}
            ]"#,
        )
        .unwrap();
        for r in &records {
            handle.process(&registry, r).unwrap();
        }

        let task = handle.task(Pid(3)).unwrap();
        let entry_id = handle.find_event_id("irq", "irq_handler_entry").unwrap();
        let agg = task.events.find(mix(entry_id, 7, 7), |e| e.event == entry_id).unwrap();
        assert_eq!(agg.count, 1);
        assert_eq!(agg.time_total, 150);
    }

    #[test]
    fn stack_on_open_start_is_captured() {
        let (mut handle, registry) = handle();
        let records = parse(
            r#"[
                {"cpu":0,"timestamp":100,"system":"irq","name":"irq_handler_entry","fields":{"common_pid":3,"irq":7}},
                {"cpu":0,"timestamp":101,"system":"ftrace","name":"kernel_stack","fields":{"common_pid":3},"caller":[10,20]},
                {"cpu":0,"timestamp":250,"system":"irq","name":"irq_handler_exit","fields":{"common_pid":3,"irq":7}}
            ]"#,
        )
        .unwrap();
        for r in &records {
            handle.process(&registry, r).unwrap();
        }

        let task = handle.task(Pid(3)).unwrap();
        let entry_id = handle.find_event_id("irq", "irq_handler_entry").unwrap();
        let agg = task.events.find(mix(entry_id, 7, 7), |e| e.event == entry_id).unwrap();
        assert_eq!(agg.stacks.len(), 1);
        let stack = agg.stacks.iter().next().unwrap();
        assert_eq!(stack.caller, vec![10, 20]);
        assert_eq!(stack.count, 1);
        assert_eq!(stack.time, 150);
    }

    #[test]
    fn proxy_wakeup_stack_attributes_to_woken_task() {
        let (mut handle, registry) = handle();
        let records = parse(
            r#"[
                {"cpu":0,"timestamp":200,"system":"sched","name":"sched_switch","fields":{"common_pid":10,"prev_pid":10,"prev_state":1,"next_pid":20}},
                {"cpu":0,"timestamp":300,"system":"sched","name":"sched_wakeup","fields":{"common_pid":20,"pid":10,"success":1}},
                {"cpu":0,"timestamp":301,"system":"ftrace","name":"kernel_stack","fields":{"common_pid":20},"caller":[99]}
            ]"#,
        )
        .unwrap();
        for r in &records {
            handle.process(&registry, r).unwrap();
        }

        let task10 = handle.task(Pid(10)).unwrap();
        let wakeup_id = handle.find_event_id("sched", "sched_wakeup").unwrap();
        assert!(task10.starts.find(mix(wakeup_id, 10, 0), |s| s.event == wakeup_id).unwrap().stack.is_some());

        let task20 = handle.task(Pid(20)).unwrap();
        assert!(task20.starts.is_empty());
    }
}
