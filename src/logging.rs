//! Structured log lines on stderr, one JSON object per line, so the
//! gameplay stream on stdout stays machine-readable.

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

pub fn emit_log(level: &str, event: &str, details: Value) {
    let line = json!({
        "ts": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "level": level,
        "event": event,
        "details": details,
    });
    eprintln!("{line}");
}
