//! Graph analyses consumed by the allocation pass.

mod liveness;

pub use liveness::{GraphLiveness, LiveInterval};
