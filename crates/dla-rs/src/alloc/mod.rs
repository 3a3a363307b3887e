//! Liveness-driven memory allocation for the DLA local store.
//!
//! The pass assigns every live value a contiguous byte offset in a single
//! linear address space so that values with overlapping lifetimes never share
//! bytes, then compares the resulting peak against the target's local-memory
//! budget. An over-budget result triggers a split attempt that proposes
//! smaller output shapes and propagates the implied input shapes upstream;
//! the attempt is advisory and allocation is not re-run on the split graph.

mod engine;
mod markers;
mod sizes;

pub use engine::{AllocEntry, AllocationPlan};
pub use markers::insert_load_store;
pub use sizes::{collect_value_sizes, ValueSizeMap};

use serde::{Deserialize, Serialize};

use crate::analysis::GraphLiveness;
use crate::graph::{Graph, Module};
use crate::pass::{ModulePass, PassError, PassOutcome};
use crate::split::SplitPlanner;
use crate::target::DlaBackend;

/// Fixed greedy policy applied when the footprint exceeds the local budget:
/// halve the leading axis of every graph output's defining node.
#[derive(Debug, Clone)]
pub struct SplitPolicy {
    pub axis: usize,
    pub factor: usize,
}

impl Default for SplitPolicy {
    fn default() -> Self {
        Self { axis: 0, factor: 2 }
    }
}

/// Minimum (peak) and worst-case (sum) byte requirements of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeReport {
    /// Peak address reached by the first-fit placement.
    pub min_size: usize,
    /// Sum of all per-value sizes, the footprint with no sharing.
    pub max_size: usize,
}

/// Assigns each intermediate tensor a byte offset in the DLA local store.
///
/// Marker insertion is retained in the module, but the pass still reports
/// [`PassOutcome::Unchanged`]: markers are liveness bookkeeping, not a change
/// to the computation the module describes.
pub struct MemoryAllocationPass {
    backend: Option<DlaBackend>,
    policy: SplitPolicy,
    plan: AllocationPlan,
    report: Option<SizeReport>,
    log_stats: bool,
}

impl MemoryAllocationPass {
    pub fn new(backend: Option<DlaBackend>) -> Self {
        Self {
            backend,
            policy: SplitPolicy::default(),
            plan: AllocationPlan::new(),
            report: None,
            log_stats: std::env::var("DLARS_PASS_STATS").is_ok(),
        }
    }

    pub fn with_policy(mut self, policy: SplitPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The allocation produced by the most recent run.
    pub fn plan(&self) -> &AllocationPlan {
        &self.plan
    }

    /// The size report of the most recent run, if it completed.
    pub fn report(&self) -> Option<SizeReport> {
        self.report
    }

    /// Builds a fresh split planner and proposes a shrunken output shape for
    /// each graph output's defining node. The proposal is advisory; the
    /// planner is dropped afterwards and the reported sizes stay pre-split.
    fn try_split(&self, graph: &Graph) -> Result<(), PassError> {
        let mut planner = SplitPlanner::new(graph)?;
        for value in graph.outputs().to_vec() {
            let Some(node) = graph.producer_of(value) else {
                continue;
            };
            let accepted =
                planner.split_by_factor(graph, node, self.policy.axis, self.policy.factor, true);
            if self.log_stats {
                println!(
                    "[memplan] split node={:?} axis={} factor={} accepted={}",
                    node, self.policy.axis, self.policy.factor, accepted
                );
            }
        }
        Ok(())
    }
}

impl ModulePass for MemoryAllocationPass {
    fn name(&self) -> &'static str {
        "memory-allocation"
    }

    fn run(&mut self, module: &mut Module) -> Result<PassOutcome, PassError> {
        let Some(backend) = self.backend.clone() else {
            return Err(PassError::MissingBackend);
        };

        self.plan.clear();
        self.report = None;

        let graph = &mut module.graph;
        let liveness = GraphLiveness::analyze(graph);
        let sizes = collect_value_sizes(graph, backend.mem_info());
        insert_load_store(graph)?;

        let max_size: usize = sizes.values().map(|size| size.bytes).sum();

        let mut min_size = 0usize;
        for interval in liveness.intervals() {
            let required = sizes
                .get(&interval.value)
                .map(|size| size.bytes)
                .unwrap_or(0);
            let start_addr = self
                .plan
                .allocate(interval.value, interval.clone(), required);
            min_size = min_size.max(start_addr + required);
            if self.log_stats {
                println!(
                    "[memplan] value={:?} start={} size={} live=[{}, {})",
                    interval.value, start_addr, required, interval.start, interval.end
                );
            }
        }

        if min_size > backend.mem_info().local_memory_size() {
            self.try_split(graph)?;
        }

        println!(
            "Size req. Min = {}({:.6} mb) Max = {}({:.6} mb)",
            min_size,
            mib(min_size),
            max_size,
            mib(max_size)
        );
        self.report = Some(SizeReport { min_size, max_size });

        Ok(PassOutcome::Unchanged)
    }
}

fn mib(bytes: usize) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
