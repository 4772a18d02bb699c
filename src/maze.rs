//! Maze level data: the sparse open-cell set, puzzle doors, and the watering
//! hole goal. Levels are authored as CSV grids; see `parse_grid_csv`.

use std::collections::BTreeSet;

use crate::types::{DoorKind, DoorView, Vec2};

#[derive(Clone, Debug)]
pub struct Door {
    pub x: i32,
    pub y: i32,
    pub kind: DoorKind,
    pub open: bool,
}

#[derive(Clone, Debug)]
pub struct MazeWorld {
    pub width: i32,
    pub height: i32,
    /// Open corridor cells. Closed doors and the watering hole are NOT in
    /// this set; opening a door inserts its cell.
    pub paths: BTreeSet<(i32, i32)>,
    pub doors: Vec<Door>,
    pub watering_hole: Option<Vec2>,
    pub player_start: Vec2,
}

impl MazeWorld {
    pub fn is_open(&self, x: i32, y: i32) -> bool {
        self.paths.contains(&(x, y))
    }

    pub fn door_at(&self, x: i32, y: i32) -> Option<&Door> {
        self.doors.iter().find(|d| d.x == x && d.y == y)
    }

    pub fn open_door(&mut self, x: i32, y: i32) -> bool {
        for door in &mut self.doors {
            if door.x == x && door.y == y && !door.open {
                door.open = true;
                self.paths.insert((x, y));
                return true;
            }
        }
        false
    }

    pub fn is_watering_hole(&self, x: i32, y: i32) -> bool {
        self.watering_hole == Some(Vec2 { x, y })
    }

    /// Nearest open cell to `target` by Manhattan distance, excluding the
    /// target cell itself. Ties resolve by (distance, y, x) so the result is
    /// stable across runs.
    pub fn nearest_open_to(&self, target: Vec2) -> Option<Vec2> {
        let mut best: Option<(i32, i32, i32)> = None;
        for &(x, y) in &self.paths {
            let dist = (x - target.x).abs() + (y - target.y).abs();
            if dist == 0 {
                continue;
            }
            let key = (dist, y, x);
            if best.map_or(true, |b| key < b) {
                best = Some(key);
            }
        }
        best.map(|(_, y, x)| Vec2 { x, y })
    }

    pub fn door_views(&self) -> Vec<DoorView> {
        self.doors
            .iter()
            .map(|d| DoorView {
                x: d.x,
                y: d.y,
                kind: d.kind,
                open: d.open,
            })
            .collect()
    }
}

/// Parses the CSV grid format used by the level files.
///
/// The first row and first column are labels and are skipped, so cell (0,0)
/// is the second field of the second row. Cell letters: `o` open path,
/// `m`/`r`/`s` math/reading/sorting doors, `w` the watering hole. Anything
/// else (including blanks) is wall. Short or malformed rows contribute only
/// the fields they have.
pub fn parse_grid_csv(text: &str) -> MazeWorld {
    let mut paths = BTreeSet::new();
    let mut doors = Vec::new();
    let mut watering_hole = None;
    let mut player_start = None;
    let mut width = 0;
    let mut height = 0;

    for (row_index, line) in text.lines().enumerate() {
        if row_index == 0 {
            continue;
        }
        let y = row_index as i32 - 1;
        for (col_index, field) in line.split(',').enumerate() {
            if col_index == 0 {
                continue;
            }
            let x = col_index as i32 - 1;
            width = width.max(x + 1);
            height = height.max(y + 1);
            match field.trim() {
                "o" => {
                    paths.insert((x, y));
                    if player_start.is_none() {
                        player_start = Some(Vec2 { x, y });
                    }
                }
                "m" => doors.push(Door { x, y, kind: DoorKind::Math, open: false }),
                "r" => doors.push(Door { x, y, kind: DoorKind::Reading, open: false }),
                "s" => doors.push(Door { x, y, kind: DoorKind::Sorting, open: false }),
                "w" => watering_hole = Some(Vec2 { x, y }),
                _ => {}
            }
        }
    }

    MazeWorld {
        width,
        height,
        paths,
        doors,
        watering_hole,
        player_start: player_start.unwrap_or(Vec2 { x: 0, y: 0 }),
    }
}

/// Built-in level used when no level file is supplied.
pub const DEFAULT_GRID_CSV: &str = "\
,A,B,C,D,E,F,G,H,I,J,K,L
1,o,o,o,o,o,,o,o,o,o,o,o
2,o,,,,o,,o,,,,,o
3,o,,o,o,o,,o,o,o,o,,o
4,o,,o,,,,,,,o,,o
5,o,,o,o,o,o,o,o,,o,,o
6,o,,,,,,,o,,o,,o
7,o,o,o,o,o,o,,o,m,o,,o
8,,,,,,o,,o,,,,o
9,o,o,o,o,,o,,o,o,o,r,o
10,o,,,o,,o,,,,,,
11,o,,,o,o,o,o,o,o,o,s,w
12,o,o,,,,,,o,,,,
";

pub fn default_level() -> MazeWorld {
    parse_grid_csv(DEFAULT_GRID_CSV)
}
