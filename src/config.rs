//! Game settings loaded from `game-config.json`. Every field has a fallback
//! so a missing or partial file never stops a session from starting; bad
//! input is logged and replaced by the defaults.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::constants::{DEFAULT_PUZZLES_TO_WEAKEN, DEFAULT_STARTING_HEARTS, DEFAULT_STRENGTH_LEVELS};
use crate::logging::emit_log;
use crate::types::Difficulty;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SpeedByDifficulty {
    pub easy: f64,
    pub neutral: f64,
    pub hard: f64,
}

impl Default for SpeedByDifficulty {
    fn default() -> Self {
        Self { easy: 0.5, neutral: 1.0, hard: 2.0 }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct HeartsStolen {
    pub easy: i32,
    pub neutral: i32,
    pub hard: i32,
}

impl Default for HeartsStolen {
    fn default() -> Self {
        Self { easy: 1, neutral: 2, hard: 3 }
    }
}

impl HeartsStolen {
    pub fn for_difficulty(&self, difficulty: Difficulty) -> i32 {
        match difficulty {
            Difficulty::Easy => self.easy,
            Difficulty::Neutral => self.neutral,
            Difficulty::Hard => self.hard,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SpriteSet {
    pub strong: String,
    pub medium: String,
    pub weak: String,
}

impl Default for SpriteSet {
    fn default() -> Self {
        Self {
            strong: "ghost-strong.png".to_string(),
            medium: "ghost-medium.png".to_string(),
            weak: "ghost-weak.png".to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct GhostSettings {
    pub enabled: bool,
    #[serde(rename = "speedByDifficulty")]
    pub speed_by_difficulty: SpeedByDifficulty,
    #[serde(rename = "heartsStolen")]
    pub hearts_stolen: HeartsStolen,
    #[serde(rename = "puzzlesToWeaken")]
    pub puzzles_to_weaken: i32,
    #[serde(rename = "strengthLevels")]
    pub strength_levels: i32,
    pub sprites: SpriteSet,
}

impl Default for GhostSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            speed_by_difficulty: SpeedByDifficulty::default(),
            hearts_stolen: HeartsStolen::default(),
            puzzles_to_weaken: DEFAULT_PUZZLES_TO_WEAKEN,
            strength_levels: DEFAULT_STRENGTH_LEVELS,
            sprites: SpriteSet::default(),
        }
    }
}

impl GhostSettings {
    pub fn speed_for(&self, difficulty: Difficulty) -> f64 {
        match difficulty {
            Difficulty::Easy => self.speed_by_difficulty.easy,
            Difficulty::Neutral => self.speed_by_difficulty.neutral,
            Difficulty::Hard => self.speed_by_difficulty.hard,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LevelSettings {
    #[serde(rename = "startingHearts")]
    pub starting_hearts: i32,
}

impl Default for LevelSettings {
    fn default() -> Self {
        Self { starting_hearts: DEFAULT_STARTING_HEARTS }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GameSettings {
    pub ghost: GhostSettings,
    pub levels: BTreeMap<String, LevelSettings>,
    pub presets: BTreeMap<String, Value>,
}

impl GameSettings {
    pub fn starting_hearts(&self, level: &str) -> i32 {
        self.levels
            .get(level)
            .map(|l| l.starting_hearts)
            .unwrap_or(DEFAULT_STARTING_HEARTS)
    }
}

/// Loads settings from a JSON file, falling back to the defaults on any
/// read or parse failure.
pub fn load(path: &Path) -> GameSettings {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            emit_log(
                "warn",
                "config_read_failed",
                json!({ "path": path.display().to_string(), "error": err.to_string() }),
            );
            return GameSettings::default();
        }
    };
    match serde_json::from_str(&text) {
        Ok(settings) => settings,
        Err(err) => {
            emit_log(
                "warn",
                "config_parse_failed",
                json!({ "path": path.display().to_string(), "error": err.to_string() }),
            );
            GameSettings::default()
        }
    }
}

/// Recursively merges `overlay` into `base`. Objects merge key by key;
/// every other value kind replaces the base value outright.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (slot, value) => *slot = value.clone(),
    }
}

/// Applies a named preset overlay on top of `settings`. Unknown presets are
/// logged and leave the settings unchanged.
pub fn apply_preset(settings: GameSettings, name: &str) -> GameSettings {
    let Some(overlay) = settings.presets.get(name).cloned() else {
        emit_log("warn", "preset_unknown", json!({ "preset": name }));
        return settings;
    };
    let mut base = match serde_json::to_value(&settings) {
        Ok(value) => value,
        Err(_) => return settings,
    };
    deep_merge(&mut base, &overlay);
    match serde_json::from_value(base) {
        Ok(merged) => merged,
        Err(err) => {
            emit_log(
                "warn",
                "preset_apply_failed",
                json!({ "preset": name, "error": err.to_string() }),
            );
            settings
        }
    }
}
