//! Chunk index: chunk hash -> claims touching that chunk
//!
//! A purely derived view over the claim arena. Buckets are created on first
//! use and dropped once empty, so a removed claim leaves nothing behind.

use crate::claim::Claim;
use crate::geometry::chunk_hash;
use crate::identity::ClaimId;
use std::collections::HashMap;

/// Spatial lookup table keyed by chunk hash
#[derive(Debug, Clone, Default)]
pub struct ChunkIndex {
    buckets: HashMap<i64, Vec<ClaimId>>,
}

impl ChunkIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `claim` to every bucket it spans
    pub fn index(&mut self, claim: &Claim) {
        for hash in claim.chunk_hashes() {
            let bucket = self.buckets.entry(hash).or_default();
            if !bucket.contains(&claim.id) {
                bucket.push(claim.id);
            }
        }
    }

    /// Remove `claim` from every bucket its current bounds span
    pub fn deindex(&mut self, claim: &Claim) {
        for hash in claim.chunk_hashes() {
            if let Some(bucket) = self.buckets.get_mut(&hash) {
                if let Some(pos) = bucket.iter().position(|id| *id == claim.id) {
                    bucket.remove(pos);
                }
                if bucket.is_empty() {
                    self.buckets.remove(&hash);
                }
            }
        }
    }

    /// Claims in the bucket for a chunk hash, in insertion order
    pub fn bucket(&self, hash: i64) -> &[ClaimId] {
        self.buckets.get(&hash).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Claims in the bucket for a chunk coordinate
    pub fn at_chunk(&self, chunk_x: i32, chunk_z: i32) -> &[ClaimId] {
        self.bucket(chunk_hash(chunk_x, chunk_z))
    }

    pub fn has_bucket(&self, hash: i64) -> bool {
        self.buckets.contains_key(&hash)
    }

    /// Number of non-empty buckets
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{BlockPos, Bounds};
    use crate::identity::PlayerId;

    fn claim(id: i64, a: (i32, i32), b: (i32, i32)) -> Claim {
        Claim::new(
            ClaimId(id),
            "world",
            Bounds::from_corners(BlockPos::new(a.0, 0, a.1), BlockPos::new(b.0, 0, b.1)),
            Some(PlayerId::random()),
        )
    }

    #[test]
    fn test_index_and_deindex() {
        let mut index = ChunkIndex::new();
        let a = claim(1, (0, 0), (20, 5));
        let b = claim(2, (0, 6), (5, 10));
        index.index(&a);
        index.index(&b);

        assert_eq!(index.at_chunk(0, 0), &[ClaimId(1), ClaimId(2)]);
        assert_eq!(index.at_chunk(1, 0), &[ClaimId(1)]);
        assert_eq!(index.bucket_count(), 2);

        index.deindex(&a);
        assert_eq!(index.at_chunk(0, 0), &[ClaimId(2)]);
        assert!(!index.has_bucket(chunk_hash(1, 0)));

        index.deindex(&b);
        assert_eq!(index.bucket_count(), 0);
    }

    #[test]
    fn test_index_is_idempotent() {
        let mut index = ChunkIndex::new();
        let a = claim(1, (0, 0), (3, 3));
        index.index(&a);
        index.index(&a);
        assert_eq!(index.at_chunk(0, 0).len(), 1);
    }

    #[test]
    fn test_resize_by_reindex() {
        let mut index = ChunkIndex::new();
        let mut a = claim(1, (0, 0), (3, 3));
        index.index(&a);

        index.deindex(&a);
        a.bounds = Bounds::from_corners(BlockPos::new(32, 0, 32), BlockPos::new(40, 0, 40));
        index.index(&a);

        assert!(index.at_chunk(0, 0).is_empty());
        assert_eq!(index.at_chunk(2, 2), &[ClaimId(1)]);
    }
}
