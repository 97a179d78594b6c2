//! Garbage browser for reference-counted runtimes with a cycle collector.
//!
//! The collector is switched into save-all mode, a collection pass is forced
//! and every object it found unreachable is kept for inspection instead of
//! being freed. The captured objects are turned into a reference graph that
//! can be reduced to the actual cycles, printed as a size-sorted table or
//! rendered with Graphviz.

pub mod browser;
pub mod collector;
pub mod error;
pub mod ffi;
pub mod gc;
pub mod generation;
pub mod graph;
pub mod object;
pub mod runtime;
pub mod session;
pub mod table;

#[cfg(test)]
mod testing;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GCStats {
    pub collections: usize,
    pub collected: usize,
    pub uncollectable: usize,
    pub total_tracked: usize,
    pub generation_counts: [usize; 3],
    pub garbage: usize,
}

pub use browser::GarbageBrowser;
pub use error::GCError;
pub use gc::{GCConfig, GarbageCollector};
pub use graph::{ObjectGraph, ObjectMetadata};
pub use object::{ObjectData, ObjectId, PyObject};
pub use runtime::{CycleCollector, ObjectInspector};
pub use session::{CollectorSession, DebugGarbageGuard, end_debug_garbage, start_debug_garbage};

pub type GCResult<T> = Result<T, GCError>;

/// Serialises tests that touch the process-wide collector.
#[cfg(test)]
pub(crate) static GLOBAL_TEST_LOCK: parking_lot::Mutex<()> = parking_lot::const_mutex(());
