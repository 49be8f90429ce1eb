// ============================================================================
// src/task/mod.rs - Deferred Work
// ============================================================================

pub mod work;

pub use work::{DeferredQueue, Work, WorkQueue};
