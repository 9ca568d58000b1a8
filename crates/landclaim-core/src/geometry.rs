//! Claim geometry
//!
//! Axis-aligned boxes over an integer block grid, partitioned horizontally
//! into 16x16 chunks:
//! - `BlockPos` - a single block coordinate
//! - `Location` - a block coordinate in a named world
//! - `Bounds` - normalized `[lesser, greater]` box, inclusive on both ends
//! - `ChunkPos` / [`chunk_hash`] - spatial index keys
//!
//! Claims extend upward through build height, so vertical containment only
//! checks the lower bound.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// log2 of the chunk edge length in blocks
pub const CHUNK_SHIFT: i32 = 4;

/// Chunk edge length in blocks
pub const CHUNK_SIZE: i32 = 1 << CHUNK_SHIFT;

/// Delimiter used in the persisted location string form
pub const LOCATION_DELIMITER: char = ';';

/// Upper bound on the chunk list allocated up front by [`Bounds::chunks`]
const PREALLOC_CHUNKS: usize = 4096;

/// A block coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The chunk column this block falls in
    pub fn chunk(&self) -> ChunkPos {
        ChunkPos::new(self.x >> CHUNK_SHIFT, self.z >> CHUNK_SHIFT)
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// A block coordinate in a named world
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub world: String,
    pub pos: BlockPos,
}

impl Location {
    pub fn new(world: impl Into<String>, x: i32, y: i32, z: i32) -> Self {
        Self {
            world: world.into(),
            pos: BlockPos::new(x, y, z),
        }
    }

    /// Chunk hash of the column containing this location
    pub fn chunk_hash(&self) -> i64 {
        self.pos.chunk().key()
    }
}

impl fmt::Display for Location {
    /// Persisted form: `world;x;y;z`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = LOCATION_DELIMITER;
        write!(
            f,
            "{}{d}{}{d}{}{d}{}",
            self.world, self.pos.x, self.pos.y, self.pos.z
        )
    }
}

impl FromStr for Location {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(LOCATION_DELIMITER).collect();
        if parts.len() < 4 {
            return Err(Error::InvalidLocation(format!(
                "expected four parts in \"{}\"",
                s
            )));
        }
        if parts[0].is_empty() {
            return Err(Error::InvalidLocation(format!("missing world in \"{}\"", s)));
        }
        let coord = |text: &str| {
            text.trim()
                .parse::<i32>()
                .map_err(|e| Error::InvalidLocation(format!("bad coordinate \"{}\": {}", text, e)))
        };
        Ok(Location::new(
            parts[0],
            coord(parts[1])?,
            coord(parts[2])?,
            coord(parts[3])?,
        ))
    }
}

/// A horizontal chunk coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Index key for this chunk, see [`chunk_hash`]
    pub fn key(&self) -> i64 {
        chunk_hash(self.x, self.z)
    }
}

/// Almost-unique key for a chunk column: `z XOR (x << 32)`.
///
/// Only used as a bucket key; collisions are tolerated because every lookup
/// re-checks geometry.
pub fn chunk_hash(chunk_x: i32, chunk_z: i32) -> i64 {
    (chunk_z as i64) ^ ((chunk_x as i64) << 32)
}

/// A normalized box, inclusive on both corners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bounds {
    lesser: BlockPos,
    greater: BlockPos,
}

impl Bounds {
    /// Build from any two opposite corners
    pub fn from_corners(a: BlockPos, b: BlockPos) -> Self {
        Self {
            lesser: BlockPos::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            greater: BlockPos::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    pub fn lesser(&self) -> BlockPos {
        self.lesser
    }

    pub fn greater(&self) -> BlockPos {
        self.greater
    }

    /// Lower the bottom face, keeping the top at least as high
    pub fn with_floor(mut self, floor: i32) -> Self {
        self.lesser.y = floor;
        if self.greater.y < floor {
            self.greater.y = floor;
        }
        self
    }

    /// X extent in blocks
    pub fn width(&self) -> i32 {
        self.greater.x - self.lesser.x + 1
    }

    /// Z extent in blocks
    pub fn height(&self) -> i32 {
        self.greater.z - self.lesser.z + 1
    }

    /// Horizontal footprint in blocks
    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    /// Whether `pos` is inside the footprint and not below the floor.
    ///
    /// With `ignore_height` the box is an infinite vertical column.
    pub fn contains(&self, pos: BlockPos, ignore_height: bool) -> bool {
        (ignore_height || pos.y >= self.lesser.y)
            && pos.x >= self.lesser.x
            && pos.x <= self.greater.x
            && pos.z >= self.lesser.z
            && pos.z <= self.greater.z
    }

    /// X and Z ranges both intersect. Y is ignored.
    pub fn overlaps(&self, other: &Bounds) -> bool {
        self.lesser.x <= other.greater.x
            && other.lesser.x <= self.greater.x
            && self.lesser.z <= other.greater.z
            && other.lesser.z <= self.greater.z
    }

    /// Every chunk column the footprint touches
    pub fn chunks(&self) -> Vec<ChunkPos> {
        let lo = self.lesser.chunk();
        let hi = self.greater.chunk();
        let span = |from: i32, to: i32| (to as i64 - from as i64 + 1) as usize;
        let count = span(lo.x, hi.x).saturating_mul(span(lo.z, hi.z));
        let mut chunks = Vec::with_capacity(count.min(PREALLOC_CHUNKS));
        for x in lo.x..=hi.x {
            for z in lo.z..=hi.z {
                chunks.push(ChunkPos::new(x, z));
            }
        }
        chunks
    }

    /// Index keys of every chunk column the footprint touches
    pub fn chunk_hashes(&self) -> Vec<i64> {
        self.chunks().iter().map(ChunkPos::key).collect()
    }
}
