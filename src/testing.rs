//! In-memory stand-in for a runtime, used by unit tests.

use crate::GCResult;
use crate::error::GCError;
use crate::object::{ObjectId, Referent};
use crate::runtime::{CycleCollector, ObjectInspector};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct FakeObject {
    type_name: String,
    size: usize,
    repr: Option<String>,
    referents: Vec<Referent>,
}

#[derive(Debug, Default)]
pub struct FakeRuntime {
    objects: HashMap<ObjectId, FakeObject>,
    pub calls: Vec<&'static str>,
    pub enabled: bool,
    pub debug_flags: u32,
    pub garbage: Vec<ObjectId>,
    /// Appended to `garbage` by the next `collect`.
    pub pending_garbage: Vec<ObjectId>,
    pub fail_collect: bool,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    pub fn add(&mut self, type_name: &str, size: usize) -> ObjectId {
        self.add_with_id(ObjectId::new(), type_name, size)
    }

    pub fn add_with_id(&mut self, id: ObjectId, type_name: &str, size: usize) -> ObjectId {
        self.objects.insert(
            id,
            FakeObject {
                type_name: type_name.to_string(),
                size,
                repr: None,
                referents: Vec::new(),
            },
        );
        id
    }

    pub fn link(&mut self, from: ObjectId, label: &str, to: ObjectId) {
        if let Some(obj) = self.objects.get_mut(&from) {
            obj.referents.push(Referent {
                label: label.to_string(),
                target: to,
            });
        }
    }

    pub fn set_repr(&mut self, id: ObjectId, repr: &str) {
        if let Some(obj) = self.objects.get_mut(&id) {
            obj.repr = Some(repr.to_string());
        }
    }
}

impl CycleCollector for FakeRuntime {
    fn collect(&mut self) -> GCResult<usize> {
        self.calls.push("collect");
        if self.fail_collect {
            return Err(GCError::CollectionInProgress);
        }
        let found = self.pending_garbage.len();
        self.garbage.append(&mut self.pending_garbage);
        Ok(found)
    }

    fn enable(&mut self) {
        self.calls.push("enable");
        self.enabled = true;
    }

    fn disable(&mut self) {
        self.calls.push("disable");
        self.enabled = false;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_debug(&mut self, flags: u32) {
        self.calls.push("set_debug");
        self.debug_flags = flags;
    }

    fn get_debug(&self) -> u32 {
        self.debug_flags
    }

    fn garbage(&self) -> Vec<ObjectId> {
        self.garbage.clone()
    }
}

impl ObjectInspector for FakeRuntime {
    fn referents(&self, obj_id: ObjectId) -> Vec<Referent> {
        self.objects
            .get(&obj_id)
            .map(|o| o.referents.clone())
            .unwrap_or_default()
    }

    fn type_name(&self, obj_id: ObjectId) -> String {
        self.objects
            .get(&obj_id)
            .map(|o| o.type_name.clone())
            .unwrap_or_default()
    }

    fn repr(&self, obj_id: ObjectId) -> String {
        match self.objects.get(&obj_id) {
            Some(FakeObject {
                repr: Some(repr), ..
            }) => repr.clone(),
            Some(obj) => format!("<{} object at {obj_id}>", obj.type_name),
            None => String::new(),
        }
    }

    fn flat_size(&self, obj_id: ObjectId) -> usize {
        self.objects.get(&obj_id).map(|o| o.size).unwrap_or(0)
    }
}
