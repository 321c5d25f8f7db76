//! Cooperative execution of a compute workgroup.
//!
//! Invocations run one after another until each reaches a barrier or ends.
//! Shared memory and storage buffers are published after every slice and
//! loaded before the next, so the workgroup observes one memory image. A
//! round ends when every live invocation has yielded.

use std::collections::HashMap;

use refract_spirv::StorageClass;
use refract_vm::{StepEvent, UbEvent, Value, VmSession};
use tracing::{debug, warn};

use crate::inputs::{write_compute_ids, ComputeIds};

/// Outcome of [`DebugSession::execute_compute_shader`](crate::DebugSession::execute_compute_shader).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputeResult {
    /// Invocations in the workgroup.
    pub invocations: u32,
    /// Instructions executed across the whole workgroup.
    pub instruction_count: u64,
    /// Barrier rounds the workgroup needed.
    pub barrier_rounds: u32,
    /// Every invocation reached the end of the entry point.
    pub completed: bool,
}

/// Largest workgroup executed in one call.
pub const MAX_WORKGROUP_INVOCATIONS: u32 = 1 << 16;

/// Number of invocations in a workgroup of `size`, or `None` when it
/// overflows or exceeds [`MAX_WORKGROUP_INVOCATIONS`].
pub(crate) fn workgroup_invocations(size: [u32; 3]) -> Option<u32> {
    size.iter()
        .try_fold(1u32, |acc, &n| acc.checked_mul(n))
        .filter(|&n| n <= MAX_WORKGROUP_INVOCATIONS)
}

pub(crate) struct WorkgroupRun {
    pub(crate) result: ComputeResult,
    /// Final state of each invocation, by local index.
    pub(crate) invocations: Vec<VmSession>,
    /// Shared and storage memory after the last round.
    pub(crate) memory: HashMap<u32, Value>,
    pub(crate) ub: Vec<UbEvent>,
}

fn synchronized(storage: StorageClass) -> bool {
    matches!(storage, StorageClass::Workgroup | StorageClass::StorageBuffer)
}

pub(crate) fn run_workgroup(
    template: &VmSession,
    entry: u32,
    ids: ComputeIds,
    max_rounds: u32,
) -> Option<WorkgroupRun> {
    let Some(count) = workgroup_invocations(ids.size) else {
        warn!(size = ?ids.size, "workgroup is too large to execute");
        return None;
    };
    let [sx, sy, sz] = ids.size;
    let mut invocations = Vec::with_capacity(count as usize);
    let mut ub = Vec::new();
    for z in 0..sz {
        for y in 0..sy {
            for x in 0..sx {
                let mut vm = template.clone();
                write_compute_ids(&mut vm, &ComputeIds { local: [x, y, z], ..ids });
                if let Err(err) = vm.start(entry, Vec::new()) {
                    warn!(%err, local = ?[x, y, z], "compute invocation failed to start");
                }
                invocations.push(vm);
            }
        }
    }

    let program = template.program();
    let mut memory: HashMap<u32, Value> = program
        .globals()
        .iter()
        .filter(|g| synchronized(g.storage))
        .filter_map(|g| Some((g.id, template.global(g.id)?.clone())))
        .collect();

    let mut rounds = 0;
    while rounds < max_rounds && invocations.iter().any(VmSession::is_running) {
        rounds += 1;
        for vm in invocations.iter_mut().filter(|vm| vm.is_running()) {
            for (id, value) in &memory {
                vm.set_global(*id, value.clone());
            }
            run_to_barrier(vm);
            for (id, value) in memory.iter_mut() {
                if let Some(current) = vm.global(*id) {
                    *value = current.clone();
                }
            }
            ub.extend(vm.drain_undefined_behavior());
        }
    }

    let completed = !invocations.iter().any(VmSession::is_running);
    if !completed {
        warn!(rounds, "workgroup abandoned after too many barrier rounds");
    }
    let result = ComputeResult {
        invocations: invocations.len() as u32,
        instruction_count: invocations.iter().map(VmSession::executed).sum(),
        barrier_rounds: rounds,
        completed,
    };
    debug!(
        invocations = result.invocations,
        instructions = result.instruction_count,
        rounds,
        "workgroup executed"
    );
    Some(WorkgroupRun {
        result,
        invocations,
        memory,
        ub,
    })
}

fn run_to_barrier(vm: &mut VmSession) {
    loop {
        match vm.run() {
            Ok(StepEvent::Barrier) => return,
            Ok(event) if event.is_terminal() => return,
            Ok(_) => {}
            Err(err) => {
                warn!(%err, "compute invocation faulted");
                return;
            }
        }
    }
}
