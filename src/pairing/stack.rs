//! Stack attribution handler: routes a `kernel_stack` record to the last
//! open start or just-closed event on the (possibly proxy-redirected) task,
//! or drops it if neither slot is set.

use log::trace;
use std::rc::Rc;

use super::{fold_stack, Handle, StackHolder};
use crate::domain::Pid;
use crate::reader::Record;

pub(crate) fn handle_stack(handle: &mut Handle, record: &Rc<Record>) {
    let Some(common_pid) = record.field("common_pid") else {
        trace!("kernel_stack missing common_pid, dropping");
        return;
    };
    let common_pid = Pid(common_pid as u64);

    let target = {
        let task = handle.task_mut(common_pid);
        task.proxy.take().unwrap_or(common_pid)
    };

    let last_start = handle.task_mut(target).last_start.take();
    if let Some(key) = last_start {
        let size = record.caller.len() * handle.long_size.bytes();
        if let Some(start) = handle.start_mut(target, key) {
            start.stack = Some(StackHolder { record: record.clone(), size });
            return;
        }
    }

    let last_event = handle.task_mut(target).last_event.take();
    if let Some(key) = last_event {
        let weight = handle.event_mut(target, key).map(|e| e.last_time);
        if let Some(weight) = weight {
            if let Some(agg) = handle.event_mut(target, key) {
                fold_stack(agg, &record.caller, weight);
            }
            return;
        }
    }

    trace!("kernel_stack on pid {target} with no last_start/last_event, dropping");
}
