use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::Direction;

pub(super) fn now_ms() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    now as u64
}

pub(super) fn offset(x: i32, y: i32, dir: Direction) -> (i32, i32) {
    match dir {
        Direction::Right => (x + 1, y),
        Direction::Left => (x - 1, y),
        Direction::Down => (x, y + 1),
        Direction::Up => (x, y - 1),
        Direction::None => (x, y),
    }
}
