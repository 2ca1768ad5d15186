// ============================================================
// Layer 4 - Epoch Sampler
// ============================================================
// Decides which dataset indices a distributed worker visits in each
// epoch. Single-process modes use Burn's DataLoader instead.
//
// One worker (world_size = 1):
//   every index exactly once, in a fresh order every epoch.
//
// Several workers (world_size = W):
//   1. Permute 0..len with an RNG seeded by (seed + epoch).
//      Every worker uses the same seed, so they all compute the
//      same permutation without talking to each other.
//   2. Pad the permutation by wrapping around to its start until
//      the length is a multiple of W.
//   3. Worker r keeps positions r, r + W, r + 2W, ...
//
//   len = 5, W = 2, permutation [3 0 4 1 2]
//     padded  [3 0 4 1 2 3]
//     rank 0  [3 4 2]
//     rank 1  [0 1 3]
//
// Shards are disjoint apart from the wrapped padding and always
// equal in size, so every worker runs the same number of batches
// and reaches each gradient synchronisation point together.
//
// Uses Fisher-Yates shuffle via rand::seq::SliceRandom.
//
// Reference: rand crate documentation (StdRng, SliceRandom)

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Per-worker index sampler. Cheap to copy; holds no RNG state
/// between epochs.
#[derive(Debug, Clone, Copy)]
pub struct ShardSampler {
    len:        usize,
    rank:       usize,
    world_size: usize,
    seed:       u64,
}

impl ShardSampler {
    /// Sampler for worker `rank` of `world_size`.
    /// A zero world size is treated as one worker.
    pub fn new(len: usize, rank: usize, world_size: usize, seed: u64) -> Self {
        let world_size = world_size.max(1);
        Self { len, rank: rank.min(world_size - 1), world_size, seed }
    }

    /// Number of indices this worker gets per epoch.
    pub fn shard_len(&self) -> usize {
        self.len.div_ceil(self.world_size)
    }

    /// The indices this worker visits in `epoch`, in visiting order.
    pub fn epoch_indices(&self, epoch: usize) -> Vec<usize> {
        if self.len == 0 {
            return Vec::new();
        }

        let mut order: Vec<usize> = (0..self.len).collect();
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(epoch as u64));
        order.shuffle(&mut rng);

        let padded = self.shard_len() * self.world_size;
        (0..padded)
            .skip(self.rank)
            .step_by(self.world_size)
            .map(|pos| order[pos % self.len])
            .collect()
    }

    /// `epoch_indices` cut into chunks of at most `batch_size`.
    pub fn epoch_batches(&self, epoch: usize, batch_size: usize) -> Vec<Vec<usize>> {
        self.epoch_indices(epoch)
            .chunks(batch_size.max(1))
            .map(<[usize]>::to_vec)
            .collect()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_single_worker_sees_a_permutation() {
        let sampler = ShardSampler::new(10, 0, 1, 7);
        let mut idx = sampler.epoch_indices(0);
        idx.sort_unstable();
        assert_eq!(idx, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_order_changes_between_epochs() {
        let sampler = ShardSampler::new(50, 0, 1, 7);
        assert_ne!(sampler.epoch_indices(0), sampler.epoch_indices(1));
        assert_eq!(sampler.epoch_indices(3), sampler.epoch_indices(3));
    }

    #[test]
    fn test_shards_are_disjoint_and_cover_everything() {
        let samplers: Vec<_> = (0..3).map(|r| ShardSampler::new(12, r, 3, 1)).collect();
        let shards: Vec<Vec<usize>> = samplers.iter().map(|s| s.epoch_indices(4)).collect();

        let mut seen = HashSet::new();
        for shard in &shards {
            assert_eq!(shard.len(), 4);
            for &i in shard {
                assert!(seen.insert(i), "index {i} appears in two shards");
            }
        }
        assert_eq!(seen.len(), 12);
    }

    #[test]
    fn test_uneven_length_pads_to_equal_shards() {
        let shards: Vec<Vec<usize>> = (0..2)
            .map(|r| ShardSampler::new(5, r, 2, 9).epoch_indices(0))
            .collect();
        assert_eq!(shards[0].len(), 3);
        assert_eq!(shards[1].len(), 3);

        let all: HashSet<usize> = shards.iter().flatten().copied().collect();
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn test_workers_agree_on_the_epoch_permutation() {
        // Interleaving the shards rebuilds the same padded order on every call
        let rebuild = |epoch| {
            let a = ShardSampler::new(8, 0, 2, 3).epoch_indices(epoch);
            let b = ShardSampler::new(8, 1, 2, 3).epoch_indices(epoch);
            a.into_iter().zip(b).flat_map(|(x, y)| [x, y]).collect::<Vec<_>>()
        };
        assert_eq!(rebuild(2), rebuild(2));
        assert_eq!(rebuild(2), ShardSampler::new(8, 0, 1, 3).epoch_indices(2));
    }

    #[test]
    fn test_batches() {
        let batches = ShardSampler::new(7, 0, 1, 0).epoch_batches(0, 3);
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[test]
    fn test_empty_dataset() {
        assert!(ShardSampler::new(0, 1, 4, 0).epoch_indices(0).is_empty());
    }
}
