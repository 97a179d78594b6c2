use crate::object::{ObjectId, PyObject};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// Result of one detection pass over a set of candidate objects.
#[derive(Debug, Default, Clone)]
pub struct Unreachable {
    /// Unreachable objects that can be freed.
    pub collectable: Vec<ObjectId>,
    /// Unreachable objects kept alive by a finalizer somewhere in their cycle.
    pub uncollectable: Vec<ObjectId>,
}

impl Unreachable {
    pub fn len(&self) -> usize {
        self.collectable.len() + self.uncollectable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All unreachable objects, in candidate order.
    pub fn all(&self) -> Vec<ObjectId> {
        let mut all: Vec<ObjectId> = self
            .collectable
            .iter()
            .chain(self.uncollectable.iter())
            .copied()
            .collect();
        all.sort();
        all
    }
}

/// Trial-deletion cycle detector. Owns no objects; it works on the heap the
/// caller hands in and only touches the GC headers.
#[derive(Debug, Default)]
pub struct Collector {
    pub collections: usize,
    pub collected: usize,
    pub uncollectable: usize,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_unreachable(
        &mut self,
        objects: &mut HashMap<ObjectId, PyObject>,
        candidates: &BTreeSet<ObjectId>,
    ) -> Unreachable {
        self.collections += 1;

        self.update_refs(objects, candidates);
        self.subtract_refs(objects, candidates);
        let unreachable = self.move_unreachable(objects, candidates);
        let result = self.handle_finalizers(objects, unreachable);
        self.restore_refs(objects, candidates);

        self.collected += result.collectable.len();
        self.uncollectable += result.uncollectable.len();
        result
    }

    fn update_refs(
        &self,
        objects: &mut HashMap<ObjectId, PyObject>,
        candidates: &BTreeSet<ObjectId>,
    ) {
        for obj_id in candidates {
            if let Some(obj) = objects.get_mut(obj_id) {
                obj.gc_head.set_refs(obj.refcount as isize);
                obj.gc_head.set_collecting();
            }
        }
    }

    /// Removes references that originate inside the candidate set; whatever
    /// remains in gc_refs comes from outside.
    fn subtract_refs(
        &self,
        objects: &mut HashMap<ObjectId, PyObject>,
        candidates: &BTreeSet<ObjectId>,
    ) {
        for obj_id in candidates {
            let referents = match objects.get(obj_id) {
                Some(obj) => obj.referents(),
                None => continue,
            };

            for referent in referents {
                if let Some(target) = objects.get_mut(&referent.target) {
                    if target.gc_head.is_collecting() {
                        target.gc_head.dec_refs();
                    }
                }
            }
        }
    }

    fn move_unreachable(
        &self,
        objects: &mut HashMap<ObjectId, PyObject>,
        candidates: &BTreeSet<ObjectId>,
    ) -> Vec<ObjectId> {
        let mut reachable: HashSet<ObjectId> = HashSet::new();
        let mut queue: VecDeque<ObjectId> = candidates
            .iter()
            .filter(|id| {
                objects
                    .get(*id)
                    .map(|obj| obj.gc_head.get_refs() > 0)
                    .unwrap_or(false)
            })
            .copied()
            .collect();
        reachable.extend(queue.iter().copied());

        while let Some(current) = queue.pop_front() {
            let Some(obj) = objects.get(&current) else {
                continue;
            };
            for referent in obj.referents() {
                if candidates.contains(&referent.target) && reachable.insert(referent.target) {
                    queue.push_back(referent.target);
                }
            }
        }

        let mut unreachable = Vec::new();
        for obj_id in candidates {
            if reachable.contains(obj_id) {
                continue;
            }
            if let Some(obj) = objects.get_mut(obj_id) {
                obj.gc_head.set_unreachable();
                unreachable.push(*obj_id);
            }
        }

        unreachable
    }

    /// Finalizer objects and everything they reach stay alive.
    fn handle_finalizers(
        &self,
        objects: &HashMap<ObjectId, PyObject>,
        unreachable: Vec<ObjectId>,
    ) -> Unreachable {
        let unreachable_set: HashSet<ObjectId> = unreachable.iter().copied().collect();
        let mut kept: HashSet<ObjectId> = HashSet::new();
        let mut pending: Vec<ObjectId> = unreachable
            .iter()
            .filter(|id| objects.get(*id).map(|o| o.has_finalizer()).unwrap_or(false))
            .copied()
            .collect();

        while let Some(current) = pending.pop() {
            if !kept.insert(current) {
                continue;
            }
            if let Some(obj) = objects.get(&current) {
                pending.extend(
                    obj.referents()
                        .into_iter()
                        .map(|r| r.target)
                        .filter(|t| unreachable_set.contains(t) && !kept.contains(t)),
                );
            }
        }

        let (uncollectable, collectable): (Vec<ObjectId>, Vec<ObjectId>) =
            unreachable.into_iter().partition(|id| kept.contains(id));
        Unreachable {
            collectable,
            uncollectable,
        }
    }

    fn restore_refs(
        &self,
        objects: &mut HashMap<ObjectId, PyObject>,
        candidates: &BTreeSet<ObjectId>,
    ) {
        for obj_id in candidates {
            if let Some(obj) = objects.get_mut(obj_id) {
                obj.gc_head.clear_collecting();
                obj.gc_head.clear_unreachable();
            }
        }
    }
}
