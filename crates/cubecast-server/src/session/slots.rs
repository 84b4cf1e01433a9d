//! Fixed pool of entity ids an observer can hand out to remote players.

/// Ids 1..=127; 0 is unused and 255 means "self".
pub const MAX_SLOTS: u8 = 127;

#[derive(Debug, Clone)]
pub struct SlotPool {
    free: Vec<u8>,
    used: u128,
}

impl Default for SlotPool {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotPool {
    pub fn new() -> Self {
        let mut pool = Self {
            free: Vec::with_capacity(MAX_SLOTS as usize),
            used: 0,
        };
        pool.reset();
        pool
    }

    /// Free every id.
    pub fn reset(&mut self) {
        self.free.clear();
        self.free.extend((1..=MAX_SLOTS).rev());
        self.used = 0;
    }

    pub fn allocate(&mut self) -> Option<u8> {
        let id = self.free.pop()?;
        self.used |= 1 << id;
        Some(id)
    }

    /// Return `id` to the pool. Ids that are not in use are ignored.
    pub fn release(&mut self, id: u8) -> bool {
        if !self.is_used(id) {
            return false;
        }
        self.used &= !(1 << id);
        self.free.push(id);
        true
    }

    pub fn is_used(&self, id: u8) -> bool {
        (1..=MAX_SLOTS).contains(&id) && self.used & (1 << id) != 0
    }

    pub fn in_use(&self) -> usize {
        self.used.count_ones() as usize
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn hands_out_every_id_once() {
        let mut pool = SlotPool::new();
        let mut seen = Vec::new();
        while let Some(id) = pool.allocate() {
            seen.push(id);
        }
        assert_eq!(seen.len(), 127);
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 127);
        assert_eq!(seen.first(), Some(&1));
        assert_eq!(seen.last(), Some(&127));
    }

    #[test]
    fn release_is_idempotent() {
        let mut pool = SlotPool::new();
        let id = pool.allocate().unwrap();
        assert!(pool.release(id));
        assert!(!pool.release(id));
        assert!(!pool.release(0));
        assert!(!pool.release(255));
        assert_eq!(pool.available(), 127);
    }

    #[test]
    fn random_allocate_release_keeps_invariants() {
        let mut rng = StdRng::seed_from_u64(0x5107);
        let mut pool = SlotPool::new();
        let mut held: Vec<u8> = Vec::new();
        for _ in 0..10_000 {
            if rng.gen_bool(0.55) {
                if let Some(id) = pool.allocate() {
                    assert!(!held.contains(&id), "id {id} handed out twice");
                    held.push(id);
                } else {
                    assert_eq!(held.len(), 127);
                }
            } else if !held.is_empty() {
                let id = held.swap_remove(rng.gen_range(0..held.len()));
                assert!(pool.release(id));
            }
            assert_eq!(pool.in_use(), held.len());
            assert_eq!(pool.in_use() + pool.available(), 127);
            assert!(held.iter().all(|&id| (1..=MAX_SLOTS).contains(&id) && pool.is_used(id)));
        }
    }
}
