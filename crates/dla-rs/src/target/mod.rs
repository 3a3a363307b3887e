//! DLA target backend and its memory-info collaborator.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::graph::ValueInfo;

/// Byte footprint the target requires for one tensor value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemSize {
    pub bytes: usize,
}

/// Target-specific sizing queries used by the allocation pass.
///
/// Implementations must be pure: equal values yield equal sizes for the
/// lifetime of a pass run.
pub trait TargetMemInfo: Send + Sync {
    /// Total storage the target needs for the value's tensor.
    fn value_memory_size(&self, value: &ValueInfo) -> MemSize;

    /// On-chip local memory capacity in bytes.
    fn local_memory_size(&self) -> usize;
}

/// Dense, unpadded sizing with a fixed local-memory budget.
#[derive(Debug, Clone)]
pub struct DenseMemInfo {
    local_memory: usize,
}

impl DenseMemInfo {
    pub fn new(local_memory: usize) -> Self {
        Self { local_memory }
    }
}

impl TargetMemInfo for DenseMemInfo {
    fn value_memory_size(&self, value: &ValueInfo) -> MemSize {
        // A tensor whose byte count overflows the address space can never fit
        // in local memory; saturate rather than wrap.
        MemSize {
            bytes: value.spec.byte_len().unwrap_or(usize::MAX),
        }
    }

    fn local_memory_size(&self) -> usize {
        self.local_memory
    }
}

/// Backend handle for a deep-learning accelerator target.
#[derive(Clone)]
pub struct DlaBackend {
    mem_info: Arc<dyn TargetMemInfo>,
}

impl DlaBackend {
    pub fn new(mem_info: Arc<dyn TargetMemInfo>) -> Self {
        Self { mem_info }
    }

    pub fn mem_info(&self) -> &dyn TargetMemInfo {
        self.mem_info.as_ref()
    }
}
