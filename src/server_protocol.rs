use serde_json::Value;

use crate::types::{Difficulty, Direction};

#[derive(Debug)]
pub enum ParsedClientMessage {
    Hello {
        name: String,
    },
    Start {
        difficulty: Option<Difficulty>,
        level: Option<String>,
        preset: Option<String>,
    },
    SetDifficulty {
        difficulty: Difficulty,
    },
    Input {
        dir: Direction,
    },
    PuzzleResult {
        solved: bool,
    },
    DismissCaught,
    DismissDefeated,
    Ping {
        t: f64,
    },
}

pub fn parse_client_message(raw: &str) -> Option<ParsedClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "hello" => {
            let name = object.get("name")?.as_str()?.to_string();
            Some(ParsedClientMessage::Hello { name })
        }
        "start" => {
            let difficulty = match object.get("difficulty") {
                None => None,
                Some(value) => Difficulty::parse(value.as_str()?),
            };
            if object.get("difficulty").is_some() && difficulty.is_none() {
                return None;
            }
            let level = match object.get("level") {
                None => None,
                Some(value) => Some(value.as_str()?.to_string()),
            };
            let preset = match object.get("preset") {
                None => None,
                Some(value) => Some(value.as_str()?.to_string()),
            };
            Some(ParsedClientMessage::Start {
                difficulty,
                level,
                preset,
            })
        }
        "set_difficulty" => {
            let difficulty = Difficulty::parse(object.get("difficulty")?.as_str()?)?;
            Some(ParsedClientMessage::SetDifficulty { difficulty })
        }
        "input" => {
            let dir = Direction::parse_move(object.get("dir")?.as_str()?)?;
            Some(ParsedClientMessage::Input { dir })
        }
        "puzzle_result" => {
            let solved = object.get("solved")?.as_bool()?;
            Some(ParsedClientMessage::PuzzleResult { solved })
        }
        "dismiss_caught" => Some(ParsedClientMessage::DismissCaught),
        "dismiss_defeated" => Some(ParsedClientMessage::DismissDefeated),
        "ping" => {
            let t = object.get("t")?.as_f64()?;
            if !t.is_finite() {
                return None;
            }
            Some(ParsedClientMessage::Ping { t })
        }
        _ => None,
    }
}
