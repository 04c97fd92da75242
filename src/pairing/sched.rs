//! Specialized handlers for `sched_switch` and `sched_wakeup`.
//!
//! These two events need bespoke handling because a single `sched_switch`
//! record closes out the outgoing task *and* opens a new start for the
//! incoming one, and a wakeup has to route stack attribution to the task
//! being woken rather than the task that's currently running. Named fields:
//! `prev_pid`, `prev_state`, `next_pid`, `pid`, `success`.

use log::{debug, trace};
use std::rc::Rc;

use super::Handle;
use crate::domain::{CoreError, EventId, Pid};
use crate::reader::Record;

const SCHED_STATE_MASK: i64 = 0x3FF;

/// A task stops running for one of two reasons the trace doesn't
/// distinguish up front: it blocked (a wakeup will eventually arrive) or it
/// was merely preempted (no wakeup ever comes). Both closes are attempted;
/// whichever matches wins.
pub(crate) fn handle_sched_switch(handle: &mut Handle, eid: EventId, record: &Rc<Record>) -> Result<(), CoreError> {
    let (Some(prev_pid), Some(prev_state_raw), Some(next_pid)) =
        (record.field("prev_pid"), record.field("prev_state"), record.field("next_pid"))
    else {
        debug!("sched_switch missing prev_pid/prev_state/next_pid, dropping");
        return Ok(());
    };

    let prev_state = (prev_state_raw & SCHED_STATE_MASK) as u64;
    let prev = Pid(prev_pid as u64);
    let next = Pid(next_pid as u64);

    {
        let task = handle.task_mut(prev);
        task.sleeping = prev_state != 0;
    }
    let start_key = handle.open_start(prev, eid, record.timestamp, prev_pid as u64, prev_state);
    {
        let task = handle.task_mut(prev);
        task.last_start = Some(start_key);
        task.last_event = None;
    }

    let wakeup_event = handle.events[eid.0].end;
    let mut closed = wakeup_event.and_then(|w| handle.close_start_matching(next, w, next_pid as u64, record.timestamp));
    if closed.is_none() {
        closed = handle.close_start_matching(next, eid, next_pid as u64, record.timestamp);
    }

    match closed {
        Some(key) => {
            let task = handle.task_mut(next);
            task.last_start = None;
            task.last_event = Some(key);
        }
        None => trace!("sched_switch: no open start found for next_pid {next}"),
    }

    Ok(())
}

/// Routes a wakeup to its target task, forwards stack attribution to it via
/// `proxy`, and opens the wakeup-latency start.
pub(crate) fn handle_sched_wakeup(handle: &mut Handle, eid: EventId, record: &Rc<Record>) -> Result<(), CoreError> {
    if let Some(success) = record.field("success") {
        if success == 0 {
            debug!("sched_wakeup: success=0, ignoring");
            return Ok(());
        }
    }

    let Some(woken_pid) = record.field("pid") else {
        debug!("sched_wakeup missing pid, dropping");
        return Ok(());
    };
    let woken = Pid(woken_pid as u64);

    let sleeping = handle.task(woken).is_some_and(|t| t.sleeping);
    if !sleeping {
        trace!("sched_wakeup for pid {woken} but task is not sleeping, ignoring");
        return Ok(());
    }

    if let Some(waker_pid) = record.field("common_pid") {
        let waker = Pid(waker_pid as u64);
        handle.task_mut(waker).proxy = Some(woken);
    }

    handle.task_mut(woken).sleeping = false;

    let switch_event = handle.events[eid.0].end;
    if let Some(switch_event) = switch_event {
        if let Some(key) = handle.close_start_matching(woken, switch_event, woken_pid as u64, record.timestamp) {
            let task = handle.task_mut(woken);
            task.last_start = None;
            task.last_event = Some(key);
        }
    }

    let start_key = handle.open_start(woken, eid, record.timestamp, woken_pid as u64, woken_pid as u64);
    let task = handle.task_mut(woken);
    task.last_start = Some(start_key);
    task.last_event = None;

    Ok(())
}
