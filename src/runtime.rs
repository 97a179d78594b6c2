//! The seam between the browser and whatever runtime owns the objects.
//!
//! [`GarbageCollector`](crate::GarbageCollector) implements both traits; tests
//! substitute fakes so session bracketing and reporting can be checked without
//! building real cyclic garbage.

use crate::GCResult;
use crate::object::{ObjectId, Referent};

/// Control over a cycle collector's global state.
pub trait CycleCollector {
    /// Forces a full collection pass and returns the number of unreachable
    /// objects it found.
    fn collect(&mut self) -> GCResult<usize>;

    /// Allows collection to be triggered automatically.
    fn enable(&mut self);

    /// Stops automatic collection; explicit [`collect`](Self::collect) still runs.
    fn disable(&mut self);

    fn is_enabled(&self) -> bool;

    fn set_debug(&mut self, flags: u32);

    fn get_debug(&self) -> u32;

    /// Snapshot of the objects the collector retained instead of freeing.
    fn garbage(&self) -> Vec<ObjectId>;
}

/// Read-only introspection of individual objects.
pub trait ObjectInspector {
    fn referents(&self, obj_id: ObjectId) -> Vec<Referent>;

    fn type_name(&self, obj_id: ObjectId) -> String;

    fn repr(&self, obj_id: ObjectId) -> String;

    /// Size of the object itself, excluding anything it references.
    fn flat_size(&self, obj_id: ObjectId) -> usize;
}
