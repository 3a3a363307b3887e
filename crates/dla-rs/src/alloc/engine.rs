use std::io;

use serde::{Deserialize, Serialize};

use crate::analysis::LiveInterval;
use crate::graph::{Graph, ValueId};

/// One placed value: its byte range plus the live interval that pinned it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocEntry {
    pub value: ValueId,
    pub interval: LiveInterval,
    pub start_addr: usize,
    pub size: usize,
}

impl AllocEntry {
    pub fn end_addr(&self) -> usize {
        self.start_addr + self.size
    }
}

/// Occupied byte range co-live with the interval being placed.
#[derive(Debug, Clone, Copy)]
struct MemRegion {
    start: usize,
    size: usize,
}

/// Ordered allocation produced by one pass run.
///
/// Entries are appended in the order intervals arrive; placement is
/// first-fit-by-address against the entries whose intervals intersect the
/// incoming one, so byte ranges freed by expired intervals are reused.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AllocationPlan {
    entries: Vec<AllocEntry>,
}

impl AllocationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places `size` bytes for `interval` at the lowest conflict-free address
    /// and appends the entry. Returns the chosen start address.
    pub fn allocate(&mut self, value: ValueId, interval: LiveInterval, size: usize) -> usize {
        let regions = self.used_regions(&interval);

        let mut start_addr = 0usize;
        // Regions are sorted by start address, so sweeping forward lands on
        // the lowest address where `size` bytes fit.
        for region in &regions {
            if !regions_conflict(region.start, region.size, start_addr, size) {
                break;
            }
            start_addr = region.start + region.size;
        }

        self.entries.push(AllocEntry {
            value,
            interval,
            start_addr,
            size,
        });
        start_addr
    }

    /// Byte ranges of every placed entry whose interval intersects `interval`,
    /// sorted ascending by start address.
    fn used_regions(&self, interval: &LiveInterval) -> Vec<MemRegion> {
        let mut regions: Vec<MemRegion> = self
            .entries
            .iter()
            .filter(|entry| entry.interval.intersects(interval))
            .map(|entry| MemRegion {
                start: entry.start_addr,
                size: entry.size,
            })
            .collect();
        regions.sort_by_key(|region| region.start);
        regions
    }

    pub fn entries(&self) -> &[AllocEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Peak address over all entries: the minimum local-memory requirement.
    pub fn peak(&self) -> usize {
        self.entries
            .iter()
            .map(AllocEntry::end_addr)
            .max()
            .unwrap_or(0)
    }

    /// Writes one line per entry:
    /// `<value_name>: [<start>, <end>) (total: <size>) [<live_start>, <live_end>]`.
    pub fn dump<W: io::Write>(&self, graph: &Graph, out: &mut W) -> io::Result<()> {
        for entry in &self.entries {
            let name = graph
                .value(entry.value)
                .map(|info| info.name.clone())
                .unwrap_or_else(|| format!("%{}", entry.value.0));
            writeln!(
                out,
                "{}: [{}, {}) (total: {}) [{}, {}]",
                name,
                entry.start_addr,
                entry.end_addr(),
                entry.size,
                entry.interval.start,
                entry.interval.end,
            )?;
        }
        Ok(())
    }
}

/// `[a, a+s)` and `[b, b+t)` conflict iff they overlap on at least one byte.
/// Equality at the endpoints (abutment) is not a conflict.
fn regions_conflict(a_start: usize, a_size: usize, b_start: usize, b_size: usize) -> bool {
    a_start + a_size > b_start && b_start + b_size > a_start
}
