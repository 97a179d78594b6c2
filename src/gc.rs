use crate::collector::Collector;
use crate::error::GCError;
use crate::generation::{GenerationManager, NUM_GENERATIONS};
use crate::object::{ObjectData, ObjectId, PyObject, Referent};
use crate::runtime::{CycleCollector, ObjectInspector};
use crate::{GCResult, GCStats};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};

pub const DEBUG_STATS: u32 = 1 << 0;
pub const DEBUG_COLLECTABLE: u32 = 1 << 1;
pub const DEBUG_UNCOLLECTABLE: u32 = 1 << 2;
pub const DEBUG_SAVEALL: u32 = 1 << 5;
pub const DEBUG_LEAK: u32 = DEBUG_COLLECTABLE | DEBUG_UNCOLLECTABLE | DEBUG_SAVEALL;

#[derive(Debug, Clone)]
pub struct GCConfig {
    pub thresholds: [usize; NUM_GENERATIONS],
    pub enabled: bool,
    pub debug_flags: u32,
}

impl Default for GCConfig {
    fn default() -> Self {
        Self {
            thresholds: [700, 10, 10],
            enabled: true,
            debug_flags: 0,
        }
    }
}

/// A reference-counted object heap with a generational cycle collector.
#[derive(Debug)]
pub struct GarbageCollector {
    objects: HashMap<ObjectId, PyObject>,
    generation_manager: GenerationManager,
    collector: Collector,
    enabled: bool,
    debug_flags: u32,
    garbage: Vec<ObjectId>,
}

impl GarbageCollector {
    pub fn new() -> Self {
        Self::with_config(GCConfig::default())
    }

    pub fn with_config(config: GCConfig) -> Self {
        Self {
            objects: HashMap::new(),
            generation_manager: GenerationManager::new(config.thresholds),
            collector: Collector::new(),
            enabled: config.enabled,
            debug_flags: config.debug_flags,
            garbage: Vec::new(),
        }
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Allocates an object holding one reference owned by the caller.
    pub fn alloc(&mut self, type_name: &str, data: ObjectData) -> GCResult<ObjectId> {
        self.insert(PyObject::new(type_name, data))
    }

    pub fn alloc_with_finalizer(&mut self, type_name: &str, data: ObjectData) -> GCResult<ObjectId> {
        self.insert(PyObject::new_with_finalizer(type_name, data))
    }

    fn insert(&mut self, obj: PyObject) -> GCResult<ObjectId> {
        let referents = obj.referents();
        if let Some(missing) = referents
            .iter()
            .find(|r| !self.objects.contains_key(&r.target))
        {
            return Err(GCError::NotTracked(missing.target));
        }
        for referent in &referents {
            self.incref(referent.target)?;
        }

        let obj_id = obj.id;
        let tracked = obj.gc_tracked;
        self.objects.insert(obj_id, obj);

        if tracked {
            self.generation_manager.add_to_generation0(obj_id)?;
            self.collect_if_needed()?;
        }

        Ok(obj_id)
    }

    pub fn incref(&mut self, obj_id: ObjectId) -> GCResult<()> {
        self.objects
            .get_mut(&obj_id)
            .ok_or(GCError::NotTracked(obj_id))?
            .inc_ref();
        Ok(())
    }

    /// Drops one reference; the object and everything only it kept alive are
    /// freed once their counts reach zero.
    pub fn decref(&mut self, obj_id: ObjectId) -> GCResult<()> {
        let obj = self
            .objects
            .get_mut(&obj_id)
            .ok_or(GCError::NotTracked(obj_id))?;
        if obj.dec_ref() {
            self.deallocate(obj_id);
        }
        Ok(())
    }

    fn deallocate(&mut self, obj_id: ObjectId) {
        let mut pending = vec![obj_id];
        while let Some(current) = pending.pop() {
            let Some(obj) = self.remove_object(&current) else {
                continue;
            };
            for referent in obj.referents() {
                if let Some(target) = self.objects.get_mut(&referent.target) {
                    if target.dec_ref() {
                        pending.push(referent.target);
                    }
                }
            }
        }
    }

    fn remove_object(&mut self, obj_id: &ObjectId) -> Option<PyObject> {
        let obj = self.objects.remove(obj_id)?;
        if obj.gc_tracked {
            self.generation_manager
                .remove_object(obj_id, obj.gc_head.generation);
        }
        Some(obj)
    }

    pub fn append(&mut self, list: ObjectId, item: ObjectId) -> GCResult<()> {
        if !self.objects.contains_key(&item) {
            return Err(GCError::NotTracked(item));
        }
        let owner = self
            .objects
            .get_mut(&list)
            .ok_or(GCError::NotTracked(list))?;
        match &mut owner.data {
            ObjectData::List(items) => items.push(item),
            _ => return Err(GCError::NotAContainer(list)),
        }
        self.incref(item)
    }

    /// Binds `name` on an instance or dict, releasing the previous target.
    pub fn set_attr(&mut self, obj_id: ObjectId, name: &str, target: ObjectId) -> GCResult<()> {
        if !self.objects.contains_key(&target) {
            return Err(GCError::NotTracked(target));
        }
        let owner = self
            .objects
            .get_mut(&obj_id)
            .ok_or(GCError::NotTracked(obj_id))?;
        let entries = match &mut owner.data {
            ObjectData::Dict(entries) | ObjectData::Instance(entries) => entries,
            _ => return Err(GCError::NotAContainer(obj_id)),
        };

        let previous = match entries.iter_mut().find(|entry| entry.0 == name) {
            Some(entry) => Some(std::mem::replace(&mut entry.1, target)),
            None => {
                entries.push((name.to_string(), target));
                None
            }
        };

        self.incref(target)?;
        if let Some(previous) = previous {
            self.decref(previous)?;
        }
        Ok(())
    }

    pub fn collect(&mut self) -> GCResult<usize> {
        self.collect_generation(NUM_GENERATIONS - 1)
    }

    /// Runs one pass over `generation` and all younger ones. Returns the
    /// number of unreachable objects found.
    pub fn collect_generation(&mut self, generation: usize) -> GCResult<usize> {
        self.generation_manager.start_collection(generation)?;

        if self.debug_flags & DEBUG_STATS != 0 {
            info!(
                "gc: collecting generation {generation}, objects in each generation: {:?}",
                self.generation_manager.counts()
            );
        }

        let candidates = self.generation_manager.collectable_objects(generation);
        let unreachable = self
            .collector
            .find_unreachable(&mut self.objects, &candidates);

        for obj_id in &unreachable.collectable {
            if self.debug_flags & DEBUG_COLLECTABLE != 0 {
                debug!("gc: collectable {}", self.describe(*obj_id));
            }
        }
        for obj_id in &unreachable.uncollectable {
            if self.debug_flags & DEBUG_UNCOLLECTABLE != 0 {
                warn!("gc: uncollectable {}", self.describe(*obj_id));
            }
        }

        let found = unreachable.len();
        let uncollectable = unreachable.uncollectable.len();
        if self.debug_flags & DEBUG_SAVEALL != 0 {
            self.save_garbage(&unreachable.all());
        } else {
            self.save_garbage(&unreachable.uncollectable);
            self.free_unreachable(&unreachable.collectable);
        }

        for moved in self.generation_manager.promote_generation(generation) {
            if let Some(obj) = self.objects.get_mut(&moved) {
                obj.gc_head.generation = (generation + 1).min(NUM_GENERATIONS - 1);
            }
        }
        self.generation_manager.end_collection();

        if self.debug_flags & DEBUG_STATS != 0 {
            info!("gc: done, {found} unreachable, {uncollectable} uncollectable");
        }

        Ok(found)
    }

    pub fn collect_if_needed(&mut self) -> GCResult<usize> {
        if !self.enabled || self.generation_manager.collecting_generation.is_some() {
            return Ok(0);
        }

        match self.generation_manager.needs_collection() {
            Some(generation) => self.collect_generation(generation),
            None => Ok(0),
        }
    }

    fn save_garbage(&mut self, objects: &[ObjectId]) {
        for obj_id in objects {
            if let Some(obj) = self.objects.get_mut(obj_id) {
                obj.inc_ref();
                self.garbage.push(*obj_id);
            }
        }
    }

    fn free_unreachable(&mut self, doomed: &[ObjectId]) {
        let doomed_set: HashSet<ObjectId> = doomed.iter().copied().collect();
        let released: Vec<PyObject> = doomed
            .iter()
            .filter_map(|obj_id| self.remove_object(obj_id))
            .collect();

        for obj in released {
            for referent in obj.referents() {
                if doomed_set.contains(&referent.target) {
                    continue;
                }
                if let Some(target) = self.objects.get_mut(&referent.target) {
                    if target.dec_ref() {
                        self.deallocate(referent.target);
                    }
                }
            }
        }
    }

    fn describe(&self, obj_id: ObjectId) -> String {
        match self.objects.get(&obj_id) {
            Some(obj) => format!("<{} {}>", obj.type_name, obj_id),
            None => format!("<freed {obj_id}>"),
        }
    }

    pub fn set_debug(&mut self, flags: u32) {
        self.debug_flags = flags;
    }

    pub fn get_debug(&self) -> u32 {
        self.debug_flags
    }

    pub fn set_threshold(&mut self, generation: usize, threshold: usize) -> GCResult<()> {
        self.generation_manager
            .get_generation_mut(generation)
            .ok_or(GCError::InvalidGeneration(generation))?
            .threshold = threshold;
        Ok(())
    }

    pub fn get_threshold(&self, generation: usize) -> Option<usize> {
        self.generation_manager
            .get_generation(generation)
            .map(|g| g.threshold)
    }

    /// Objects the collector found unreachable but kept alive.
    pub fn garbage(&self) -> &[ObjectId] {
        &self.garbage
    }

    /// Drops the registry's references; whatever they kept alive becomes
    /// ordinary garbage again.
    pub fn clear_garbage(&mut self) -> GCResult<()> {
        for obj_id in std::mem::take(&mut self.garbage) {
            self.decref(obj_id)?;
        }
        Ok(())
    }

    pub fn contains(&self, obj_id: ObjectId) -> bool {
        self.objects.contains_key(&obj_id)
    }

    pub fn get_object(&self, obj_id: ObjectId) -> Option<&PyObject> {
        self.objects.get(&obj_id)
    }

    /// Number of objects tracked by the cycle collector.
    pub fn get_count(&self) -> usize {
        self.generation_manager.total_objects()
    }

    pub fn get_stats(&self) -> GCStats {
        GCStats {
            collections: self.collector.collections,
            collected: self.collector.collected,
            uncollectable: self.collector.uncollectable,
            total_tracked: self.get_count(),
            generation_counts: self.generation_manager.counts(),
            garbage: self.garbage.len(),
        }
    }
}

impl Default for GarbageCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleCollector for GarbageCollector {
    fn collect(&mut self) -> GCResult<usize> {
        GarbageCollector::collect(self)
    }

    fn enable(&mut self) {
        GarbageCollector::enable(self)
    }

    fn disable(&mut self) {
        GarbageCollector::disable(self)
    }

    fn is_enabled(&self) -> bool {
        GarbageCollector::is_enabled(self)
    }

    fn set_debug(&mut self, flags: u32) {
        GarbageCollector::set_debug(self, flags)
    }

    fn get_debug(&self) -> u32 {
        GarbageCollector::get_debug(self)
    }

    fn garbage(&self) -> Vec<ObjectId> {
        self.garbage.clone()
    }
}

impl ObjectInspector for GarbageCollector {
    fn referents(&self, obj_id: ObjectId) -> Vec<Referent> {
        self.objects
            .get(&obj_id)
            .map(|obj| obj.referents())
            .unwrap_or_default()
    }

    fn type_name(&self, obj_id: ObjectId) -> String {
        self.objects
            .get(&obj_id)
            .map(|obj| obj.type_name.clone())
            .unwrap_or_else(|| "<freed>".to_string())
    }

    fn repr(&self, obj_id: ObjectId) -> String {
        match self.objects.get(&obj_id) {
            Some(obj) => {
                obj.repr_with(|member| self.objects.get(&member).map(|m| m.member_repr()))
            }
            None => format!("<freed {obj_id}>"),
        }
    }

    fn flat_size(&self, obj_id: ObjectId) -> usize {
        self.objects
            .get(&obj_id)
            .map(|obj| obj.flat_size())
            .unwrap_or(0)
    }
}

pub mod global {
    use super::*;
    use parking_lot::RwLock;
    use std::sync::{Arc, OnceLock};

    static GC: OnceLock<Arc<RwLock<GarbageCollector>>> = OnceLock::new();

    pub fn get_gc() -> Arc<RwLock<GarbageCollector>> {
        GC.get_or_init(|| Arc::new(RwLock::new(GarbageCollector::new())))
            .clone()
    }

    pub fn collect() -> GCResult<usize> {
        get_gc().write().collect()
    }

    pub fn enable() {
        get_gc().write().enable();
    }

    pub fn disable() {
        get_gc().write().disable();
    }

    pub fn is_enabled() -> bool {
        get_gc().read().is_enabled()
    }

    pub fn set_debug(flags: u32) {
        get_gc().write().set_debug(flags);
    }

    pub fn get_debug() -> u32 {
        get_gc().read().get_debug()
    }

    pub fn get_stats() -> GCStats {
        get_gc().read().get_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(gc: &mut GarbageCollector) -> ObjectId {
        gc.alloc("Node", ObjectData::Instance(Vec::new())).unwrap()
    }

    #[test]
    fn test_gc_creation() {
        let gc = GarbageCollector::new();
        assert!(gc.is_enabled());
        assert_eq!(gc.get_count(), 0);
        assert!(gc.garbage().is_empty());
    }

    #[test]
    fn test_refcounting_frees_chains() {
        let mut gc = GarbageCollector::new();
        let head = node(&mut gc);
        let tail = node(&mut gc);
        let value = gc.alloc("int", ObjectData::Integer(3)).unwrap();
        gc.set_attr(head, "next", tail).unwrap();
        gc.set_attr(tail, "value", value).unwrap();
        gc.decref(tail).unwrap();
        gc.decref(value).unwrap();

        assert_eq!(gc.get_count(), 2);
        gc.decref(head).unwrap();
        assert!(!gc.contains(head));
        assert!(!gc.contains(tail));
        assert!(!gc.contains(value));
        assert_eq!(gc.get_count(), 0);
    }

    #[test]
    fn test_collect_frees_cycles() {
        let mut gc = GarbageCollector::new();
        let a = node(&mut gc);
        let b = node(&mut gc);
        gc.set_attr(a, "peer", b).unwrap();
        gc.set_attr(b, "peer", a).unwrap();
        gc.decref(a).unwrap();
        gc.decref(b).unwrap();

        assert_eq!(gc.get_count(), 2);
        assert_eq!(gc.collect().unwrap(), 2);
        assert_eq!(gc.get_count(), 0);
        assert!(gc.garbage().is_empty());
        assert_eq!(gc.get_stats().collected, 2);
    }

    #[test]
    fn test_saveall_keeps_unreachable() {
        let mut gc = GarbageCollector::new();
        let list = gc.alloc("list", ObjectData::List(Vec::new())).unwrap();
        gc.append(list, list).unwrap();
        gc.decref(list).unwrap();

        gc.set_debug(DEBUG_SAVEALL);
        assert_eq!(gc.collect().unwrap(), 1);
        assert_eq!(gc.garbage(), &[list]);
        assert!(gc.contains(list));

        gc.set_debug(0);
        gc.clear_garbage().unwrap();
        gc.collect().unwrap();
        assert!(!gc.contains(list));
    }

    #[test]
    fn test_finalizer_cycle_is_uncollectable() {
        let mut gc = GarbageCollector::new();
        let a = gc
            .alloc_with_finalizer("Resource", ObjectData::Instance(Vec::new()))
            .unwrap();
        let b = node(&mut gc);
        gc.set_attr(a, "b", b).unwrap();
        gc.set_attr(b, "a", a).unwrap();
        gc.decref(a).unwrap();
        gc.decref(b).unwrap();

        gc.set_debug(DEBUG_UNCOLLECTABLE);
        assert_eq!(gc.collect().unwrap(), 2);
        assert_eq!(gc.garbage().len(), 2);
        assert_eq!(gc.get_stats().uncollectable, 2);
    }

    #[test]
    fn test_explicit_collect_runs_while_disabled() {
        let mut gc = GarbageCollector::new();
        gc.disable();
        let list = gc.alloc("list", ObjectData::List(Vec::new())).unwrap();
        gc.append(list, list).unwrap();
        gc.decref(list).unwrap();

        assert_eq!(gc.collect().unwrap(), 1);
        assert!(!gc.contains(list));
    }

    #[test]
    fn test_automatic_collection_on_threshold() {
        let mut gc = GarbageCollector::with_config(GCConfig {
            thresholds: [3, 10, 10],
            ..GCConfig::default()
        });
        let list = gc.alloc("list", ObjectData::List(Vec::new())).unwrap();
        gc.append(list, list).unwrap();
        gc.decref(list).unwrap();

        let _keep = node(&mut gc);
        assert!(gc.contains(list));
        let _third = node(&mut gc);
        assert!(!gc.contains(list));
        assert_eq!(gc.get_stats().collections, 1);
    }

    #[test]
    fn test_disabled_skips_automatic_collection() {
        let mut gc = GarbageCollector::with_config(GCConfig {
            thresholds: [1, 10, 10],
            enabled: false,
            ..GCConfig::default()
        });
        let list = gc.alloc("list", ObjectData::List(Vec::new())).unwrap();
        gc.append(list, list).unwrap();
        gc.decref(list).unwrap();
        node(&mut gc);

        assert!(gc.contains(list));
        assert_eq!(gc.get_stats().collections, 0);
    }

    #[test]
    fn test_set_attr_replaces_target() {
        let mut gc = GarbageCollector::new();
        let owner = node(&mut gc);
        let first = gc.alloc("int", ObjectData::Integer(1)).unwrap();
        let second = gc.alloc("int", ObjectData::Integer(2)).unwrap();
        gc.set_attr(owner, "value", first).unwrap();
        gc.decref(first).unwrap();
        gc.set_attr(owner, "value", second).unwrap();

        assert!(!gc.contains(first));
        assert_eq!(gc.get_object(second).unwrap().get_refcount(), 2);
    }

    #[test]
    fn test_reference_errors() {
        let mut gc = GarbageCollector::new();
        let int = gc.alloc("int", ObjectData::Integer(1)).unwrap();
        let missing = ObjectId::from_raw(usize::MAX);

        assert!(matches!(gc.append(int, int), Err(GCError::NotAContainer(_))));
        assert!(matches!(gc.decref(missing), Err(GCError::NotTracked(_))));
        assert!(matches!(
            gc.alloc("list", ObjectData::List(vec![missing])),
            Err(GCError::NotTracked(_))
        ));
    }

    #[test]
    fn test_generation_thresholds() {
        let mut gc = GarbageCollector::new();

        assert_eq!(gc.get_threshold(0), Some(700));
        assert_eq!(gc.get_threshold(1), Some(10));
        assert_eq!(gc.get_threshold(2), Some(10));

        assert!(gc.set_threshold(0, 1000).is_ok());
        assert_eq!(gc.get_threshold(0), Some(1000));
        assert!(matches!(
            gc.set_threshold(3, 1),
            Err(GCError::InvalidGeneration(3))
        ));
    }

    #[test]
    fn test_survivors_are_promoted() {
        let mut gc = GarbageCollector::new();
        let live = node(&mut gc);
        gc.collect_generation(0).unwrap();
        assert_eq!(gc.get_stats().generation_counts, [0, 1, 0]);
        assert_eq!(gc.get_object(live).unwrap().gc_head.generation, 1);

        gc.decref(live).unwrap();
        assert_eq!(gc.get_count(), 0);
    }

    #[test]
    fn test_repr_of_containers() {
        let mut gc = GarbageCollector::new();
        let list = gc.alloc("list", ObjectData::List(Vec::new())).unwrap();
        let text = gc.alloc("str", ObjectData::Str("x".to_string())).unwrap();
        gc.append(list, text).unwrap();
        gc.append(list, list).unwrap();

        assert_eq!(
            ObjectInspector::repr(&gc, list),
            format!("['x', <list object at {list}>]")
        );
        assert_eq!(ObjectInspector::type_name(&gc, list), "list");
    }
}
