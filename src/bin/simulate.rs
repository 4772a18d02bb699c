//! Headless balance harness: runs scripted sessions where a pilot walks the
//! player toward the watering hole while the ghost hunts, and flags state
//! that should be impossible.

use clap::Parser;
use maze_marvels_server::config::GameSettings;
use maze_marvels_server::constants::{CELL_SIZE, TICK_MS};
use maze_marvels_server::engine::{DistanceField, GameEngine};
use maze_marvels_server::logging::emit_log;
use maze_marvels_server::maze::{self, MazeWorld};
use maze_marvels_server::rng::Rng;
use maze_marvels_server::types::{
    Difficulty, Direction, GameOverReason, RuntimeEvent, Snapshot, Vec2,
};
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Run a single custom scenario instead of the built-in sweep.
    #[arg(long)]
    single: bool,
    #[arg(long)]
    minutes: Option<i32>,
    #[arg(long)]
    difficulty: Option<String>,
    #[arg(long)]
    seed: Option<u64>,
    /// Probability that the pilot answers a puzzle correctly.
    #[arg(long)]
    solve_rate: Option<f32>,
    #[arg(long)]
    run_id: Option<String>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize)]
struct Scenario {
    name: String,
    minutes: i32,
    difficulty: Difficulty,
    seed: u32,
    #[serde(rename = "solveRate")]
    solve_rate: f32,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioResultLine {
    scenario: String,
    seed: u32,
    minutes: i32,
    difficulty: Difficulty,
    reason: GameOverReason,
    #[serde(rename = "durationMs")]
    duration_ms: u64,
    #[serde(rename = "heartsLeft")]
    hearts_left: i32,
    #[serde(rename = "puzzlesPresented")]
    puzzles_presented: i32,
    #[serde(rename = "doorsOpened")]
    doors_opened: i32,
    catches: i32,
    weakenings: i32,
    #[serde(rename = "ghostDefeated")]
    ghost_defeated: bool,
    #[serde(rename = "loopBreaks")]
    loop_breaks: u64,
    #[serde(rename = "stuckTicks")]
    stuck_ticks: u64,
    #[serde(rename = "unreachableTicks")]
    unreachable_ticks: u64,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    tick: u64,
    message: String,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioRunResult {
    #[serde(flatten)]
    result: ScenarioResultLine,
    #[serde(rename = "anomalyRecords")]
    anomaly_records: Vec<AnomalyRecord>,
    finished_tick: u64,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "runId")]
    run_id: String,
    #[serde(rename = "startedAtMs")]
    started_at_ms: u64,
    #[serde(rename = "finishedAtMs")]
    finished_at_ms: u64,
    #[serde(rename = "scenarioCount")]
    scenario_count: usize,
    #[serde(rename = "anomalyCount")]
    anomaly_count: usize,
    #[serde(rename = "averageDurationMs")]
    average_duration_ms: u64,
    #[serde(rename = "reasonCounts")]
    reason_counts: BTreeMap<String, usize>,
    scenarios: Vec<ScenarioResultLine>,
}

fn main() {
    let cli = Cli::parse();
    let scenarios = resolve_scenarios(&cli);
    let run_started_at_ms = now_ms();
    let seed_hint = scenarios.first().map(|scenario| scenario.seed).unwrap_or(0);
    let run_id = cli
        .run_id
        .clone()
        .unwrap_or_else(|| default_run_id(seed_hint, run_started_at_ms));
    let mut has_anomaly = false;
    let mut scenario_results = Vec::new();
    let mut reason_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut total_duration_ms = 0u64;
    let mut total_anomalies = 0usize;

    for scenario in scenarios {
        emit_log(
            "info",
            "scenario_started",
            json!({
                "runId": run_id,
                "scenario": scenario.name,
                "seed": scenario.seed,
                "minutes": scenario.minutes,
                "difficulty": scenario.difficulty,
                "solveRate": scenario.solve_rate,
            }),
        );
        let scenario_run = run_scenario(&scenario);

        for anomaly in &scenario_run.anomaly_records {
            emit_log(
                "warn",
                "anomaly_detected",
                json!({
                    "runId": run_id,
                    "scenario": scenario.name,
                    "seed": scenario.seed,
                    "tick": anomaly.tick,
                    "message": anomaly.message,
                }),
            );
        }

        if !scenario_run.result.anomalies.is_empty() {
            has_anomaly = true;
        }
        total_anomalies += scenario_run.anomaly_records.len();
        total_duration_ms += scenario_run.result.duration_ms;
        *reason_counts
            .entry(game_over_reason_key(scenario_run.result.reason))
            .or_insert(0) += 1;

        emit_log(
            "info",
            "scenario_finished",
            json!({
                "runId": run_id,
                "scenario": scenario.name,
                "seed": scenario.seed,
                "tick": scenario_run.finished_tick,
                "reason": scenario_run.result.reason,
                "durationMs": scenario_run.result.duration_ms,
                "anomalyCount": scenario_run.anomaly_records.len(),
            }),
        );

        println!(
            "{}",
            serde_json::to_string(&scenario_run.result).expect("scenario result should serialize")
        );
        scenario_results.push(scenario_run.result);
    }

    let run_finished_at_ms = now_ms();
    let summary = build_run_summary(
        run_id.clone(),
        run_started_at_ms,
        run_finished_at_ms,
        scenario_results,
        reason_counts,
        total_anomalies,
        total_duration_ms,
    );

    let mut summary_out_written: Option<String> = None;
    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(error) = write_summary(path, &summary) {
            emit_log(
                "error",
                "summary_write_failed",
                json!({
                    "runId": run_id,
                    "path": path.to_string_lossy(),
                    "error": error.to_string(),
                }),
            );
            std::process::exit(2);
        }
        summary_out_written = Some(path.to_string_lossy().to_string());
    }

    emit_log(
        "info",
        "run_finished",
        json!({
            "runId": run_id,
            "scenarioCount": summary.scenario_count,
            "anomalyCount": summary.anomaly_count,
            "averageDurationMs": summary.average_duration_ms,
            "reasonCounts": summary.reason_counts,
            "summaryOut": summary_out_written,
        }),
    );

    if has_anomaly {
        std::process::exit(1);
    }
}

/// Between-tick state of the scripted pilot. Dismissals are delayed a few
/// ticks to mimic a human closing the overlay.
struct Pilot {
    rng: Rng,
    solve_rate: f32,
    modal_wait: u32,
}

const MODAL_WAIT_TICKS: u32 = 10;

impl Pilot {
    fn new(seed: u32, solve_rate: f32) -> Self {
        Self {
            // Offset so the pilot never mirrors the engine's own stream.
            rng: Rng::new(seed ^ 0x5157_7e1d),
            solve_rate,
            modal_wait: 0,
        }
    }

    fn drive(&mut self, engine: &mut GameEngine, snapshot: &Snapshot, world: &MazeWorld) {
        let flags = snapshot.flags;
        if flags.puzzle_active || flags.caught_active || flags.defeated_active {
            if self.modal_wait > 0 {
                self.modal_wait -= 1;
                return;
            }
            self.modal_wait = MODAL_WAIT_TICKS;
            if flags.puzzle_active {
                engine.puzzle_result(self.rng.bool(self.solve_rate));
            } else if flags.caught_active {
                engine.dismiss_caught();
            } else {
                engine.dismiss_defeated();
            }
            return;
        }
        self.modal_wait = MODAL_WAIT_TICKS;
        engine.set_player_direction(direction_to_goal(snapshot, world));
    }
}

/// Picks the next step toward the watering hole, treating closed doors and
/// the hole itself as walkable so the pilot will knock on doors.
fn direction_to_goal(snapshot: &Snapshot, world: &MazeWorld) -> Direction {
    let Some(goal) = world.watering_hole else {
        return Direction::None;
    };
    let walkable = |x: i32, y: i32| {
        world.is_open(x, y) || world.door_at(x, y).is_some() || world.is_watering_hole(x, y)
    };
    let field = DistanceField::build_with(goal, walkable);
    let cell = Vec2 {
        x: (snapshot.player.x / CELL_SIZE as f32).round() as i32,
        y: (snapshot.player.y / CELL_SIZE as f32).round() as i32,
    };
    let Some(here) = field.distance(cell.x, cell.y) else {
        return Direction::None;
    };
    let steps = [
        (Direction::Right, cell.x + 1, cell.y),
        (Direction::Left, cell.x - 1, cell.y),
        (Direction::Down, cell.x, cell.y + 1),
        (Direction::Up, cell.x, cell.y - 1),
    ];
    for (dir, nx, ny) in steps {
        if let Some(dist) = field.distance(nx, ny) {
            if dist < here {
                return dir;
            }
        }
    }
    Direction::None
}

fn run_scenario(scenario: &Scenario) -> ScenarioRunResult {
    let world = maze::default_level();
    let mut engine = GameEngine::new(
        world.clone(),
        GameSettings::default(),
        scenario.difficulty,
        "level1",
        scenario.seed,
    );
    let mut pilot = Pilot::new(scenario.seed, scenario.solve_rate);

    let mut puzzles_presented = 0;
    let mut doors_opened = 0;
    let mut catches = 0;
    let mut weakenings = 0;
    let mut anomalies = Vec::new();
    let mut anomaly_records = Vec::new();
    let mut anomaly_seen = HashSet::new();
    let mut last_tick = 0u64;
    let mut previous: Option<Snapshot> = None;
    let tick_limit = (scenario.minutes.max(1) as u64) * 60_000 / TICK_MS;

    while !engine.is_ended() {
        engine.step(TICK_MS);
        let snapshot = engine.build_snapshot(true);
        last_tick = snapshot.tick;

        for message in collect_snapshot_anomalies(&snapshot, previous.as_ref()) {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                snapshot.tick,
                message,
            );
        }

        for event in &snapshot.events {
            match event {
                RuntimeEvent::PuzzlePresented { .. } => puzzles_presented += 1,
                RuntimeEvent::DoorOpened { .. } => doors_opened += 1,
                RuntimeEvent::GhostCaughtPlayer { .. } => catches += 1,
                RuntimeEvent::GhostWeakened { .. } => weakenings += 1,
                _ => {}
            }
        }

        pilot.drive(&mut engine, &snapshot, &world);
        previous = Some(snapshot);

        if last_tick > tick_limit {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                last_tick,
                "tick limit exceeded without a game over".to_string(),
            );
            break;
        }
    }

    let summary = engine.build_summary();
    ScenarioRunResult {
        result: ScenarioResultLine {
            scenario: scenario.name.clone(),
            seed: scenario.seed,
            minutes: scenario.minutes,
            difficulty: scenario.difficulty,
            reason: summary.reason,
            duration_ms: summary.duration_ms,
            hearts_left: summary.hearts_left,
            puzzles_presented,
            doors_opened,
            catches,
            weakenings,
            ghost_defeated: summary.ghost_defeated,
            loop_breaks: summary.stats.loop_breaks,
            stuck_ticks: summary.stats.stuck_ticks,
            unreachable_ticks: summary.stats.unreachable_ticks,
            anomalies,
        },
        anomaly_records,
        finished_tick: last_tick,
    }
}

/// Invariant checks on consecutive snapshots. Anything returned here is a
/// bug in the engine, not a playstyle outcome.
fn collect_snapshot_anomalies(snapshot: &Snapshot, previous: Option<&Snapshot>) -> Vec<String> {
    let mut anomalies = Vec::new();
    if snapshot.player.hearts < 0 {
        anomalies.push(format!("negative hearts: {}", snapshot.player.hearts));
    }
    if snapshot.ghost.strength < 0 {
        anomalies.push(format!("negative ghost strength: {}", snapshot.ghost.strength));
    }

    let Some(previous) = previous else {
        return anomalies;
    };
    if snapshot.ghost.strength > previous.ghost.strength {
        anomalies.push(format!(
            "ghost strength rose: {} -> {}",
            previous.ghost.strength, snapshot.ghost.strength
        ));
    }
    if !previous.ghost.active && snapshot.ghost.active {
        anomalies.push("defeated ghost reactivated".to_string());
    }
    let previously_paused = previous.flags.puzzle_active
        || previous.flags.caught_active
        || previous.flags.defeated_active;
    let still_paused = snapshot.flags.puzzle_active
        || snapshot.flags.caught_active
        || snapshot.flags.defeated_active;
    let ghost_moved = (snapshot.ghost.x, snapshot.ghost.y) != (previous.ghost.x, previous.ghost.y);
    if previously_paused && still_paused && ghost_moved {
        anomalies.push("ghost moved while a modal was open".to_string());
    }
    anomalies
}

fn resolve_scenarios(cli: &Cli) -> Vec<Scenario> {
    let seed = normalize_seed(cli.seed.unwrap_or_else(now_ms));
    let difficulty = cli
        .difficulty
        .as_deref()
        .and_then(Difficulty::parse)
        .unwrap_or(Difficulty::Neutral);
    let solve_rate = cli.solve_rate.unwrap_or(0.8).clamp(0.0, 1.0);

    if cli.single || cli.minutes.is_some() || cli.difficulty.is_some() {
        return vec![Scenario {
            name: format!("custom-{difficulty:?}").to_lowercase(),
            minutes: cli.minutes.unwrap_or(5).clamp(1, 30),
            difficulty,
            seed,
            solve_rate,
        }];
    }

    vec![
        Scenario {
            name: "stroll-easy".to_string(),
            minutes: 5,
            difficulty: Difficulty::Easy,
            seed,
            solve_rate,
        },
        Scenario {
            name: "chase-neutral".to_string(),
            minutes: 5,
            difficulty: Difficulty::Neutral,
            seed: normalize_seed(seed as u64 + 1),
            solve_rate,
        },
        Scenario {
            name: "gauntlet-hard".to_string(),
            minutes: 5,
            difficulty: Difficulty::Hard,
            seed: normalize_seed(seed as u64 + 2),
            solve_rate,
        },
    ]
}

fn normalize_seed(seed: u64) -> u32 {
    seed as u32
}

fn push_anomaly(
    anomalies: &mut Vec<String>,
    anomaly_records: &mut Vec<AnomalyRecord>,
    anomaly_seen: &mut HashSet<String>,
    tick: u64,
    message: String,
) {
    anomaly_records.push(AnomalyRecord {
        tick,
        message: message.clone(),
    });
    if anomaly_seen.insert(message.clone()) {
        anomalies.push(message);
    }
}

fn default_run_id(seed: u32, timestamp_ms: u64) -> String {
    format!("sim-{seed}-{timestamp_ms}")
}

fn build_run_summary(
    run_id: String,
    started_at_ms: u64,
    finished_at_ms: u64,
    scenarios: Vec<ScenarioResultLine>,
    reason_counts: BTreeMap<String, usize>,
    anomaly_count: usize,
    total_duration_ms: u64,
) -> RunSummary {
    let scenario_count = scenarios.len();
    let average_duration_ms = if scenario_count == 0 {
        0
    } else {
        total_duration_ms / scenario_count as u64
    };
    RunSummary {
        run_id,
        started_at_ms,
        finished_at_ms,
        scenario_count,
        anomaly_count,
        average_duration_ms,
        reason_counts,
        scenarios,
    }
}

fn game_over_reason_key(reason: GameOverReason) -> String {
    match reason {
        GameOverReason::Victory => "victory",
        GameOverReason::HeartsGone => "hearts_gone",
    }
    .to_string()
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary).expect("run summary should serialize");
    std::fs::write(path, summary_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_scenario_result(reason: GameOverReason, duration_ms: u64) -> ScenarioResultLine {
        ScenarioResultLine {
            scenario: "test".to_string(),
            seed: 42,
            minutes: 5,
            difficulty: Difficulty::Neutral,
            reason,
            duration_ms,
            hearts_left: 1,
            puzzles_presented: 0,
            doors_opened: 0,
            catches: 0,
            weakenings: 0,
            ghost_defeated: false,
            loop_breaks: 0,
            stuck_ticks: 0,
            unreachable_ticks: 0,
            anomalies: Vec::new(),
        }
    }

    #[test]
    fn default_run_id_contains_seed_and_timestamp() {
        assert_eq!(default_run_id(42, 123456789), "sim-42-123456789");
    }

    #[test]
    fn build_run_summary_calculates_average_duration() {
        let summary = build_run_summary(
            "sim-42-1".to_string(),
            1,
            2,
            vec![
                make_scenario_result(GameOverReason::HeartsGone, 60_000),
                make_scenario_result(GameOverReason::Victory, 90_000),
            ],
            BTreeMap::from([
                ("hearts_gone".to_string(), 1usize),
                ("victory".to_string(), 1usize),
            ]),
            1,
            150_000,
        );
        assert_eq!(summary.average_duration_ms, 75_000);
        assert_eq!(summary.scenario_count, 2);
    }

    #[test]
    fn write_summary_returns_error_when_parent_does_not_exist() {
        let now = now_ms();
        let target = std::env::temp_dir()
            .join(format!("maze-marvels-missing-{now}"))
            .join("summary.json");
        let summary = build_run_summary(
            "sim-1-1".to_string(),
            1,
            2,
            vec![make_scenario_result(GameOverReason::HeartsGone, 60_000)],
            BTreeMap::from([("hearts_gone".to_string(), 1usize)]),
            0,
            60_000,
        );
        assert!(write_summary(&target, &summary).is_err());
    }

    #[test]
    fn push_anomaly_keeps_records_and_deduplicates_summary_messages() {
        let mut anomalies = Vec::new();
        let mut records = Vec::new();
        let mut seen = HashSet::new();
        push_anomaly(
            &mut anomalies,
            &mut records,
            &mut seen,
            10,
            "same anomaly".to_string(),
        );
        push_anomaly(
            &mut anomalies,
            &mut records,
            &mut seen,
            11,
            "same anomaly".to_string(),
        );

        assert_eq!(anomalies.len(), 1);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].tick, 10);
        assert_eq!(records[1].tick, 11);
    }

    #[test]
    fn pilot_steers_toward_the_watering_hole() {
        let world = maze::default_level();
        let mut engine = GameEngine::new(
            world.clone(),
            GameSettings::default(),
            Difficulty::Easy,
            "level1",
            9,
        );
        let snapshot = engine.build_snapshot(false);
        let dir = direction_to_goal(&snapshot, &world);
        assert_ne!(dir, Direction::None);
    }

    #[test]
    fn scripted_scenario_always_reaches_a_verdict() {
        let scenario = Scenario {
            name: "test-run".to_string(),
            minutes: 5,
            difficulty: Difficulty::Neutral,
            seed: 1234,
            solve_rate: 1.0,
        };
        let run = run_scenario(&scenario);
        assert!(run.result.anomalies.is_empty(), "{:?}", run.result.anomalies);
        assert!(run.finished_tick > 0);
    }
}
