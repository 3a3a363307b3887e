//! Module-pass plumbing shared by graph-level transforms.

use thiserror::Error;

use crate::graph::{GraphError, Module};
use crate::split::SplitError;

/// Outcome reported by a pass that ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Unchanged,
    Changed,
}

/// Errors that abort a pass before it completes. Allocation decisions made up
/// to the failure point are discarded on the next invocation.
#[derive(Debug, Error)]
pub enum PassError {
    /// No target backend was supplied to the pass.
    #[error("no backend information available for memory allocation")]
    MissingBackend,
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Split(#[from] SplitError),
}

/// Canonical interface implemented by passes that operate on a whole module.
pub trait ModulePass {
    fn name(&self) -> &'static str;
    fn run(&mut self, module: &mut Module) -> Result<PassOutcome, PassError>;
}
