use crate::GCResult;
use crate::error::GCError;
use crate::object::ObjectId;
use std::collections::BTreeSet;

pub const NUM_GENERATIONS: usize = 3;

#[derive(Debug)]
pub struct Generation {
    pub threshold: usize,
    pub count: usize,
    pub objects: BTreeSet<ObjectId>,
}

impl Generation {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            count: 0,
            objects: BTreeSet::new(),
        }
    }

    pub fn should_collect(&self) -> bool {
        self.threshold > 0 && self.count >= self.threshold
    }

    pub fn add_object(&mut self, obj_id: ObjectId) -> GCResult<()> {
        if !self.objects.insert(obj_id) {
            return Err(GCError::Internal(format!(
                "Object {obj_id} already in generation"
            )));
        }
        Ok(())
    }

    pub fn remove_object(&mut self, obj_id: &ObjectId) -> bool {
        self.objects.remove(obj_id)
    }

    pub fn get_objects(&self) -> &BTreeSet<ObjectId> {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn clear(&mut self) -> BTreeSet<ObjectId> {
        std::mem::take(&mut self.objects)
    }
}

#[derive(Debug)]
pub struct GenerationManager {
    pub generations: [Generation; NUM_GENERATIONS],
    pub collecting_generation: Option<usize>,
}

impl GenerationManager {
    pub fn new(thresholds: [usize; NUM_GENERATIONS]) -> Self {
        Self {
            generations: thresholds.map(Generation::new),
            collecting_generation: None,
        }
    }

    pub fn get_generation(&self, generation_idx: usize) -> Option<&Generation> {
        self.generations.get(generation_idx)
    }

    pub fn get_generation_mut(&mut self, generation_idx: usize) -> Option<&mut Generation> {
        self.generations.get_mut(generation_idx)
    }

    /// New allocations land in generation 0 and count towards its threshold.
    pub fn add_to_generation0(&mut self, obj_id: ObjectId) -> GCResult<()> {
        self.generations[0].add_object(obj_id)?;
        self.generations[0].count += 1;
        Ok(())
    }

    pub fn remove_object(&mut self, obj_id: &ObjectId, generation_idx: usize) {
        if let Some(generation) = self.generations.get_mut(generation_idx) {
            if generation.remove_object(obj_id) && generation_idx == 0 {
                generation.count = generation.count.saturating_sub(1);
            }
        }
    }

    /// Every object the given generation (and the younger ones) would collect.
    pub fn collectable_objects(&self, generation_idx: usize) -> BTreeSet<ObjectId> {
        self.generations[..=generation_idx]
            .iter()
            .flat_map(|g| g.objects.iter().copied())
            .collect()
    }

    /// Moves the survivors of a collection into the next generation and
    /// resets the counters the pass consumed.
    pub fn promote_generation(&mut self, from_gen: usize) -> Vec<ObjectId> {
        let target = (from_gen + 1).min(NUM_GENERATIONS - 1);
        let mut moved = Vec::new();

        for i in 0..=from_gen {
            self.generations[i].count = 0;
            if i == target {
                continue;
            }
            let objects = self.generations[i].clear();
            moved.extend(objects.iter().copied());
            self.generations[target].objects.extend(objects);
        }

        if from_gen + 1 < NUM_GENERATIONS {
            self.generations[from_gen + 1].count += 1;
        }

        moved
    }

    /// The oldest generation whose threshold has been crossed.
    pub fn needs_collection(&self) -> Option<usize> {
        (0..NUM_GENERATIONS)
            .rev()
            .find(|&i| self.generations[i].should_collect())
    }

    pub fn start_collection(&mut self, generation_idx: usize) -> GCResult<()> {
        if self.collecting_generation.is_some() {
            return Err(GCError::CollectionInProgress);
        }

        if generation_idx >= NUM_GENERATIONS {
            return Err(GCError::InvalidGeneration(generation_idx));
        }

        self.collecting_generation = Some(generation_idx);
        Ok(())
    }

    pub fn end_collection(&mut self) {
        self.collecting_generation = None;
    }

    pub fn total_objects(&self) -> usize {
        self.generations.iter().map(|g| g.len()).sum()
    }

    pub fn counts(&self) -> [usize; NUM_GENERATIONS] {
        [
            self.generations[0].len(),
            self.generations[1].len(),
            self.generations[2].len(),
        ]
    }
}

impl Default for GenerationManager {
    fn default() -> Self {
        Self::new([700, 10, 10])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_triggers_collection() {
        let mut manager = GenerationManager::new([2, 10, 10]);
        assert_eq!(manager.needs_collection(), None);

        manager.add_to_generation0(ObjectId::from_raw(1)).unwrap();
        manager.add_to_generation0(ObjectId::from_raw(2)).unwrap();
        assert_eq!(manager.needs_collection(), Some(0));
    }

    #[test]
    fn test_duplicate_add_is_rejected() {
        let mut manager = GenerationManager::default();
        manager.add_to_generation0(ObjectId::from_raw(1)).unwrap();
        assert!(manager.add_to_generation0(ObjectId::from_raw(1)).is_err());
    }

    #[test]
    fn test_promote_generation() {
        let mut manager = GenerationManager::new([2, 1, 10]);
        manager.add_to_generation0(ObjectId::from_raw(1)).unwrap();
        manager.add_to_generation0(ObjectId::from_raw(2)).unwrap();

        let moved = manager.promote_generation(0);
        assert_eq!(moved.len(), 2);
        assert_eq!(manager.counts(), [0, 2, 0]);
        assert_eq!(manager.get_generation(0).unwrap().count, 0);
        assert_eq!(manager.get_generation(1).unwrap().count, 1);
        assert_eq!(manager.needs_collection(), Some(1));

        manager.promote_generation(2);
        assert_eq!(manager.counts(), [0, 0, 2]);
        assert_eq!(manager.total_objects(), 2);
    }

    #[test]
    fn test_collection_guard() {
        let mut manager = GenerationManager::default();
        assert!(manager.start_collection(2).is_ok());
        assert!(matches!(
            manager.start_collection(0),
            Err(GCError::CollectionInProgress)
        ));
        manager.end_collection();
        assert!(matches!(
            manager.start_collection(3),
            Err(GCError::InvalidGeneration(3))
        ));
    }

    #[test]
    fn test_collectable_objects_includes_younger() {
        let mut manager = GenerationManager::default();
        manager.add_to_generation0(ObjectId::from_raw(1)).unwrap();
        manager.promote_generation(0);
        manager.add_to_generation0(ObjectId::from_raw(2)).unwrap();

        assert_eq!(manager.collectable_objects(0).len(), 1);
        assert_eq!(manager.collectable_objects(1).len(), 2);
    }
}
