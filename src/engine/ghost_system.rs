//! Ghost pursuit: distance-field chasing, the loop-breaker heuristic,
//! catches, and the strength machine driven by solved puzzles.

use std::collections::VecDeque;

use super::pathfind::DistanceField;
use super::utils::offset;
use super::GameEngine;
use crate::config::GameSettings;
use crate::constants::{
    DEFEAT_PRESENTATION_DELAY_MS, LOOP_REPEAT_THRESHOLD, POSITION_HISTORY_LENGTH,
    RANDOM_MODE_TURNS,
};
use crate::maze::MazeWorld;
use crate::types::{Difficulty, Direction, GameOverReason, GhostPhase, RuntimeEvent, Vec2};

/// Sentinel for the previous-cell record when there is none, as right
/// after a spawn or a loop break.
const NO_LAST_POSITION: Vec2 = Vec2 { x: -999, y: -999 };

#[derive(Clone, Debug)]
pub struct GhostState {
    pub(crate) x: i32,
    pub(crate) y: i32,
    pub(crate) dir: Direction,
    pub(crate) strength: i32,
    pub(crate) active: bool,
    pub(crate) speed: f64,
    pub(crate) move_interval_ms: u64,
    pub(crate) last_move_at: u64,
    pub(crate) last_position: Vec2,
    pub(crate) history: VecDeque<Vec2>,
    pub(crate) random_mode_turns: u32,
    pub(crate) puzzles_since_weaken: i32,
}

impl GhostState {
    pub(crate) fn spawn(world: &MazeWorld, settings: &GameSettings, difficulty: Difficulty) -> Self {
        let start = Self::lair_cell(world);
        let speed = settings.ghost.speed_for(difficulty);
        Self {
            x: start.x,
            y: start.y,
            dir: Direction::None,
            strength: settings.ghost.strength_levels.max(1),
            active: settings.ghost.enabled,
            speed,
            move_interval_ms: move_interval(speed),
            last_move_at: 0,
            last_position: NO_LAST_POSITION,
            history: VecDeque::new(),
            random_mode_turns: 0,
            puzzles_since_weaken: 0,
        }
    }

    /// The ghost guards the watering hole: it spawns on the nearest open
    /// cell to it. Levels without a hole fall back to the farthest corner
    /// of the path set.
    fn lair_cell(world: &MazeWorld) -> Vec2 {
        world
            .watering_hole
            .and_then(|hole| world.nearest_open_to(hole))
            .or_else(|| {
                world
                    .paths
                    .iter()
                    .next_back()
                    .map(|&(x, y)| Vec2 { x, y })
            })
            .unwrap_or(world.player_start)
    }

    pub(crate) fn cell(&self) -> Vec2 {
        Vec2 { x: self.x, y: self.y }
    }

    pub(crate) fn phase(&self) -> GhostPhase {
        if self.strength <= 0 {
            GhostPhase::Defeated
        } else if self.strength >= 4 {
            GhostPhase::Strong
        } else if self.strength >= 2 {
            GhostPhase::Medium
        } else {
            GhostPhase::Weak
        }
    }

    pub(crate) fn sprite(&self, settings: &GameSettings) -> Option<String> {
        match self.phase() {
            GhostPhase::Strong => Some(settings.ghost.sprites.strong.clone()),
            GhostPhase::Medium => Some(settings.ghost.sprites.medium.clone()),
            GhostPhase::Weak => Some(settings.ghost.sprites.weak.clone()),
            GhostPhase::Defeated => None,
        }
    }
}

fn move_interval(speed: f64) -> u64 {
    if speed > 0.0 {
        (1000.0 / speed) as u64
    } else {
        u64::MAX
    }
}

impl GameEngine {
    /// Per-tick ghost update. Movement and the catch check both sit behind
    /// the pause gate so an open modal freezes pursuit entirely.
    pub(super) fn update_ghost(&mut self, now: u64) {
        if !self.ghost.active {
            return;
        }
        if self.gameplay_paused() || self.hearts <= 0 {
            return;
        }
        if now.saturating_sub(self.ghost.last_move_at) >= self.ghost.move_interval_ms {
            self.ghost_move_toward_player();
            self.ghost.last_move_at = now;
        }
        self.check_player_collision();
    }

    fn ghost_move_toward_player(&mut self) {
        if self.ghost.random_mode_turns > 0 {
            self.ghost_random_step();
            return;
        }
        let field = DistanceField::build(self.player_cell(), &self.world);
        let from = self.ghost.cell();
        let Some(current) = field.distance(from.x, from.y) else {
            self.stats.unreachable_ticks += 1;
            return;
        };
        let mut best_dist = current;
        let mut best_move: Option<(Direction, i32, i32)> = None;
        for dir in Direction::ALL {
            let (nx, ny) = offset(from.x, from.y, dir);
            if !self.world.is_open(nx, ny) {
                continue;
            }
            if let Some(dist) = field.distance(nx, ny) {
                // Strict improvement only; the first direction in
                // enumeration order wins ties.
                if dist < best_dist {
                    best_dist = dist;
                    best_move = Some((dir, nx, ny));
                }
            }
        }
        match best_move {
            Some((dir, nx, ny)) => self.apply_ghost_move(dir, nx, ny),
            None => self.stats.stuck_ticks += 1,
        }
    }

    /// Loop-breaker movement: ignore the distance field and wander
    /// uniformly among open neighbors until the counter runs out.
    fn ghost_random_step(&mut self) {
        let from = self.ghost.cell();
        let mut options = Vec::new();
        for dir in Direction::ALL {
            let (nx, ny) = offset(from.x, from.y, dir);
            if self.world.is_open(nx, ny) {
                options.push((dir, nx, ny));
            }
        }
        if options.is_empty() {
            self.stats.stuck_ticks += 1;
            return;
        }
        let (dir, nx, ny) = options[self.rng.pick_index(options.len())];
        self.apply_ghost_move(dir, nx, ny);
        self.ghost.random_mode_turns -= 1;
    }

    fn apply_ghost_move(&mut self, dir: Direction, nx: i32, ny: i32) {
        let from = self.ghost.cell();
        self.ghost.x = nx;
        self.ghost.y = ny;
        self.ghost.dir = dir;
        self.ghost.last_position = from;
        self.stats.moves += 1;
        self.note_ghost_position(Vec2 { x: nx, y: ny });
    }

    /// Records the cell just entered and trips the loop breaker when the
    /// same cell shows up three times within the recent window.
    pub(crate) fn note_ghost_position(&mut self, cell: Vec2) {
        self.ghost.history.push_back(cell);
        while self.ghost.history.len() > POSITION_HISTORY_LENGTH {
            self.ghost.history.pop_front();
        }
        let repeats = self.ghost.history.iter().filter(|c| **c == cell).count();
        if repeats >= LOOP_REPEAT_THRESHOLD {
            self.ghost.history.clear();
            self.ghost.last_position = NO_LAST_POSITION;
            self.ghost.random_mode_turns = RANDOM_MODE_TURNS;
            self.stats.loop_breaks += 1;
        }
    }

    fn check_player_collision(&mut self) {
        if self.ghost.cell() == self.player_cell() {
            self.catch_player();
        }
    }

    /// A catch while any end-of-round or overlay state is up is a no-op, so
    /// hearts are stolen at most once per contact.
    pub(crate) fn catch_player(&mut self) {
        if self.is_ended()
            || self.flags.game_over_active
            || self.flags.celebrating
            || self.flags.caught_active
            || self.hearts <= 0
        {
            return;
        }
        let stolen = self.settings.ghost.hearts_stolen.for_difficulty(self.difficulty);
        let left = self.apply_hearts_delta(-stolen);
        self.events.push(RuntimeEvent::GhostCaughtPlayer {
            hearts_stolen: stolen,
            hearts_left: left,
        });
        self.flags.caught_active = true;
        if left == 0 {
            self.end_game(GameOverReason::HeartsGone);
        }
    }

    /// Called once per solved puzzle. The counter restarts on every weaken,
    /// so the threshold is always measured from the last weakening even if
    /// a preset changes `puzzles_to_weaken` mid-session.
    pub fn on_puzzle_solved(&mut self) {
        self.stats.puzzles_solved += 1;
        if !self.ghost.active {
            return;
        }
        self.ghost.puzzles_since_weaken += 1;
        let needed = self.settings.ghost.puzzles_to_weaken.max(1);
        if self.ghost.puzzles_since_weaken >= needed {
            self.ghost.puzzles_since_weaken = 0;
            self.weaken_ghost();
        }
    }

    fn weaken_ghost(&mut self) {
        if self.ghost.strength <= 0 {
            return;
        }
        self.ghost.strength -= 1;
        self.events.push(RuntimeEvent::GhostWeakened {
            strength: self.ghost.strength,
            phase: self.ghost.phase(),
        });
        if self.ghost.strength <= 0 {
            self.ghost.active = false;
            self.schedule_defeat_presentation(DEFEAT_PRESENTATION_DELAY_MS);
        }
    }

    /// Difficulty can change mid-session; only the pursuit speed and the
    /// steal amount react, strength never resets upward.
    pub fn set_difficulty(&mut self, difficulty: Difficulty) {
        self.difficulty = difficulty;
        self.ghost.speed = self.settings.ghost.speed_for(difficulty);
        self.ghost.move_interval_ms = move_interval(self.ghost.speed);
    }

    pub(super) fn reset_ghost_to_start(&mut self) {
        let lair = GhostState::lair_cell(&self.world);
        self.ghost.x = lair.x;
        self.ghost.y = lair.y;
        self.ghost.dir = Direction::None;
        self.ghost.last_position = NO_LAST_POSITION;
        self.ghost.history.clear();
        self.ghost.random_mode_turns = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maze::parse_grid_csv;

    fn engine(csv: &str, difficulty: Difficulty) -> GameEngine {
        GameEngine::new(
            parse_grid_csv(csv),
            GameSettings::default(),
            difficulty,
            "level1",
            1,
        )
    }

    #[test]
    fn move_interval_follows_speed() {
        assert_eq!(move_interval(1.0), 1000);
        assert_eq!(move_interval(2.0), 500);
        assert_eq!(move_interval(0.5), 2000);
        assert_eq!(move_interval(0.0), u64::MAX);
    }

    #[test]
    fn phase_tiers_cover_the_strength_range() {
        let mut engine = engine(",A,B\n1,o,o\n", Difficulty::Neutral);
        engine.ghost.strength = 5;
        assert_eq!(engine.ghost.phase(), GhostPhase::Strong);
        engine.ghost.strength = 4;
        assert_eq!(engine.ghost.phase(), GhostPhase::Strong);
        engine.ghost.strength = 3;
        assert_eq!(engine.ghost.phase(), GhostPhase::Medium);
        engine.ghost.strength = 2;
        assert_eq!(engine.ghost.phase(), GhostPhase::Medium);
        engine.ghost.strength = 1;
        assert_eq!(engine.ghost.phase(), GhostPhase::Weak);
        engine.ghost.strength = 0;
        assert_eq!(engine.ghost.phase(), GhostPhase::Defeated);
        assert!(engine.ghost.sprite(&engine.settings).is_none());
    }

    #[test]
    fn strength_never_goes_below_zero() {
        let mut engine = engine(",A,B\n1,o,o\n", Difficulty::Neutral);
        engine.ghost.strength = 1;
        engine.on_puzzle_solved();
        assert_eq!(engine.ghost.strength, 0);
        assert!(!engine.ghost.active);
        engine.on_puzzle_solved();
        assert_eq!(engine.ghost.strength, 0);
    }

    #[test]
    fn puzzles_to_weaken_spaces_out_weakening() {
        let mut engine = engine(",A,B\n1,o,o\n", Difficulty::Neutral);
        engine.settings.ghost.puzzles_to_weaken = 2;
        engine.on_puzzle_solved();
        assert_eq!(engine.ghost.strength, 5);
        engine.on_puzzle_solved();
        assert_eq!(engine.ghost.strength, 4);
        engine.on_puzzle_solved();
        assert_eq!(engine.ghost.strength, 4);
        engine.on_puzzle_solved();
        assert_eq!(engine.ghost.strength, 3);
    }

    #[test]
    fn weaken_counter_survives_a_threshold_change() {
        let mut engine = engine(",A,B\n1,o,o\n", Difficulty::Neutral);
        engine.settings.ghost.puzzles_to_weaken = 3;
        engine.on_puzzle_solved();
        engine.on_puzzle_solved();
        assert_eq!(engine.ghost.strength, 5);
        assert_eq!(engine.ghost.puzzles_since_weaken, 2);
        // A preset lowers the threshold; the two solves already banked
        // count toward it, so the very next solve weakens.
        engine.settings.ghost.puzzles_to_weaken = 2;
        engine.on_puzzle_solved();
        assert_eq!(engine.ghost.strength, 4);
        assert_eq!(engine.ghost.puzzles_since_weaken, 0);
        engine.on_puzzle_solved();
        assert_eq!(engine.ghost.strength, 4);
        engine.on_puzzle_solved();
        assert_eq!(engine.ghost.strength, 3);
    }

    #[test]
    fn ghost_prefers_enumeration_order_on_ties() {
        // Ghost in the middle of a plus shape with the player two cells
        // right; only right strictly improves.
        let world = parse_grid_csv(",A,B,C,D,E\n1,,,o,,\n2,o,o,o,o,o\n3,,,o,,\n");
        let mut engine = GameEngine::new(world, GameSettings::default(), Difficulty::Neutral, "level1", 1);
        engine.ghost.x = 2;
        engine.ghost.y = 1;
        engine.ghost.last_position = NO_LAST_POSITION;
        engine.ghost.history.clear();
        engine.player.x = 4.0 * crate::constants::CELL_SIZE as f32;
        engine.player.y = 1.0 * crate::constants::CELL_SIZE as f32;
        engine.ghost_move_toward_player();
        assert_eq!((engine.ghost.x, engine.ghost.y), (3, 1));
        assert_eq!(engine.ghost.dir, Direction::Right);
    }

    #[test]
    fn ghost_may_retrace_its_previous_cell_when_it_improves() {
        let world = parse_grid_csv(",A,B,C\n1,o,o,o\n");
        let mut engine = GameEngine::new(world, GameSettings::default(), Difficulty::Neutral, "level1", 1);
        engine.ghost.x = 2;
        engine.ghost.y = 0;
        engine.ghost.last_position = Vec2 { x: 1, y: 0 };
        engine.ghost.history.clear();
        // Player sits at (0,0); stepping back through (1,0) is the only
        // improving move and must not be vetoed by the previous cell.
        for _ in 0..5 {
            engine.step(1000);
        }
        assert_eq!((engine.ghost.x, engine.ghost.y), (0, 0));
        assert_eq!(engine.stats.stuck_ticks, 0);
        assert!(engine.flags.caught_active);
    }

    #[test]
    fn set_difficulty_rescales_the_move_interval() {
        let mut engine = engine(",A,B\n1,o,o\n", Difficulty::Easy);
        assert_eq!(engine.ghost.move_interval_ms, 2000);
        engine.set_difficulty(Difficulty::Hard);
        assert_eq!(engine.ghost.move_interval_ms, 500);
        assert_eq!(engine.difficulty, Difficulty::Hard);
    }

    #[test]
    fn disabled_ghost_never_acts() {
        let mut engine = engine(",A,B\n1,o,o\n", Difficulty::Neutral);
        engine.settings.ghost.enabled = false;
        engine.ghost.active = false;
        engine.ghost.x = 0;
        engine.ghost.y = 0;
        engine.update_ghost(10_000);
        assert!(!engine.flags.caught_active);
        assert_eq!(engine.hearts, 3);
    }

    #[test]
    fn history_window_is_capped() {
        let mut engine = engine(",A,B\n1,o,o\n", Difficulty::Neutral);
        for i in 0..10 {
            engine.note_ghost_position(Vec2 { x: i, y: 0 });
        }
        assert!(engine.ghost.history.len() <= POSITION_HISTORY_LENGTH);
    }
}
