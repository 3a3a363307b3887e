//! Compiler passes for a deep-learning accelerator with a bounded on-chip
//! local memory.
//!
//! The crate centers on the memory allocation pass ([`alloc`]): given a
//! dataflow graph of tensor operators ([`graph`]) and a liveness result
//! ([`analysis`]), it places every intermediate tensor at a byte offset in a
//! single linear address space and, when the peak exceeds the target's budget
//! ([`target`]), attempts to shrink tensors by proposing split output shapes
//! and propagating them upstream ([`split`]).

pub mod alloc;
pub mod analysis;
pub mod graph;
pub mod pass;
pub mod split;
pub mod target;
pub mod tensor;

pub use alloc::MemoryAllocationPass;
pub use tensor::{DType, Shape, TensorSpec};
