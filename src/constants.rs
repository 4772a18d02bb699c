pub const TICK_RATE: u32 = 20;
pub const TICK_MS: u64 = 1000 / TICK_RATE as u64;

/// Pixel size of one maze grid cell. Player positions are kept in pixel
/// space and converted to grid cells by dividing by this value.
pub const CELL_SIZE: i32 = 40;

pub const PLAYER_BASE_SPEED: f32 = 6.0;

// Ghost loop-breaker tuning. These values were tuned behaviorally and travel
// together: a cell repeating LOOP_REPEAT_THRESHOLD times within the last
// POSITION_HISTORY_LENGTH moves switches the ghost into random movement for
// RANDOM_MODE_TURNS moves.
pub const POSITION_HISTORY_LENGTH: usize = 6;
pub const LOOP_REPEAT_THRESHOLD: usize = 3;
pub const RANDOM_MODE_TURNS: u32 = 4;

/// Delay before the "ghost defeated" presentation opens, so a still-open
/// puzzle-result modal has time to close first.
pub const DEFEAT_PRESENTATION_DELAY_MS: u64 = 500;

pub const DEFAULT_STARTING_HEARTS: i32 = 3;
pub const DEFAULT_STRENGTH_LEVELS: i32 = 5;
pub const DEFAULT_PUZZLES_TO_WEAKEN: i32 = 1;
