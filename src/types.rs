use serde::Serialize;

/// Movement directions. The variant order (right, left, down, up) is the
/// crate-wide neighbor enumeration order and doubles as the tie-break when
/// several equally short moves exist; do not reorder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Right,
    Left,
    Down,
    Up,
    None,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Self::Right, Self::Left, Self::Down, Self::Up];

    pub fn parse_move(value: &str) -> Option<Self> {
        match value {
            "right" => Some(Self::Right),
            "left" => Some(Self::Left),
            "down" => Some(Self::Down),
            "up" => Some(Self::Up),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Neutral,
    Hard,
}

impl Difficulty {
    /// "medium" is accepted as an alias of neutral; the browser UI has used
    /// both labels over time.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "easy" => Some(Self::Easy),
            "neutral" | "medium" => Some(Self::Neutral),
            "hard" => Some(Self::Hard),
            _ => None,
        }
    }
}

/// Strength tier derived from the ghost's integer strength, gating which
/// sprite the client shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GhostPhase {
    Strong,
    Medium,
    Weak,
    Defeated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DoorKind {
    Math,
    Reading,
    Sorting,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GameOverReason {
    Victory,
    HeartsGone,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Vec2 {
    pub x: i32,
    pub y: i32,
}

#[derive(Clone, Debug, Serialize)]
pub struct DoorView {
    pub x: i32,
    pub y: i32,
    pub kind: DoorKind,
    pub open: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct PlayerView {
    pub x: f32,
    pub y: f32,
    pub dir: Direction,
    pub hearts: i32,
}

#[derive(Clone, Debug, Serialize)]
pub struct GhostView {
    pub x: i32,
    pub y: i32,
    pub dir: Direction,
    pub strength: i32,
    pub active: bool,
    pub phase: GhostPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sprite: Option<String>,
    #[serde(rename = "randomModeTurns")]
    pub random_mode_turns: u32,
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct SessionFlags {
    #[serde(rename = "puzzleActive")]
    pub puzzle_active: bool,
    #[serde(rename = "caughtActive")]
    pub caught_active: bool,
    #[serde(rename = "defeatedActive")]
    pub defeated_active: bool,
    #[serde(rename = "gameOverActive")]
    pub game_over_active: bool,
    pub celebrating: bool,
}

/// Observable counters for the degenerate-but-expected ghost outcomes. These
/// never raise errors; the harness and debug UI read them instead.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct PursuitStats {
    pub moves: u64,
    #[serde(rename = "stuckTicks")]
    pub stuck_ticks: u64,
    #[serde(rename = "unreachableTicks")]
    pub unreachable_ticks: u64,
    #[serde(rename = "loopBreaks")]
    pub loop_breaks: u64,
    #[serde(rename = "puzzlesSolved")]
    pub puzzles_solved: i32,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    PuzzlePresented {
        x: i32,
        y: i32,
        kind: DoorKind,
    },
    DoorOpened {
        x: i32,
        y: i32,
    },
    GhostWeakened {
        strength: i32,
        phase: GhostPhase,
    },
    GhostDefeated,
    GhostCaughtPlayer {
        #[serde(rename = "heartsStolen")]
        hearts_stolen: i32,
        #[serde(rename = "heartsLeft")]
        hearts_left: i32,
    },
    PlayerReachedWateringHole,
    GameOver {
        reason: GameOverReason,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    pub tick: u64,
    #[serde(rename = "nowMs")]
    pub now_ms: u64,
    #[serde(rename = "elapsedMs")]
    pub elapsed_ms: u64,
    pub difficulty: Difficulty,
    pub player: PlayerView,
    pub ghost: GhostView,
    pub flags: SessionFlags,
    pub doors: Vec<DoorView>,
    pub stats: PursuitStats,
    pub events: Vec<RuntimeEvent>,
}

#[derive(Clone, Debug, Serialize)]
pub struct GameSummary {
    pub reason: GameOverReason,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
    #[serde(rename = "heartsLeft")]
    pub hearts_left: i32,
    #[serde(rename = "ghostDefeated")]
    pub ghost_defeated: bool,
    pub stats: PursuitStats,
}
