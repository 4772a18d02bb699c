//! Breadth-first distance field over the maze grid. Rebuilt from the
//! player's cell whenever the ghost is due to move; cells absent from the
//! map are unreachable from the source.

use std::collections::{BTreeMap, VecDeque};

use crate::maze::MazeWorld;
use crate::types::Vec2;

/// Neighbor offsets in the crate-wide enumeration order: right, left,
/// down, up. Keep in sync with `Direction::ALL`.
pub const NEIGHBOR_OFFSETS: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

#[derive(Clone, Debug)]
pub struct DistanceField {
    pub source: Vec2,
    distances: BTreeMap<(i32, i32), u32>,
}

impl DistanceField {
    pub fn build(source: Vec2, world: &MazeWorld) -> Self {
        Self::build_with(source, |x, y| world.is_open(x, y))
    }

    /// Flood fill from `source` across cells accepted by `is_open`. The
    /// source itself is seeded only when open; a walled-in source yields an
    /// empty field.
    pub fn build_with(source: Vec2, mut is_open: impl FnMut(i32, i32) -> bool) -> Self {
        let mut distances = BTreeMap::new();
        let mut queue = VecDeque::new();
        if is_open(source.x, source.y) {
            distances.insert((source.x, source.y), 0);
            queue.push_back((source.x, source.y));
        }
        while let Some((x, y)) = queue.pop_front() {
            let next = distances[&(x, y)] + 1;
            for (dx, dy) in NEIGHBOR_OFFSETS {
                let (nx, ny) = (x + dx, y + dy);
                if is_open(nx, ny) && !distances.contains_key(&(nx, ny)) {
                    distances.insert((nx, ny), next);
                    queue.push_back((nx, ny));
                }
            }
        }
        Self { source, distances }
    }

    pub fn distance(&self, x: i32, y: i32) -> Option<u32> {
        self.distances.get(&(x, y)).copied()
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.distances.contains_key(&(x, y))
    }

    pub fn len(&self) -> usize {
        self.distances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distances.is_empty()
    }
}
