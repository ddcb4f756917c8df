use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::BuiltinTool;
use crate::llm::ToolExecutionError;

/// Longest real-world UTC offset is +14:00.
const MAX_OFFSET_HOURS: i32 = 14;

pub struct CurrentDateTime;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateTimeParams {
    /// "+02:00", "-0530", "Z". Defaults to UTC.
    #[serde(default)]
    pub utc_offset: Option<String>,
}

impl BuiltinTool for CurrentDateTime {
    const NAME: &'static str = "get_current_datetime";
    const DESCRIPTION: &'static str =
        "Get the current date and time, optionally shifted to a UTC offset.";

    type Params = DateTimeParams;

    fn parameters() -> Value {
        json!({
            "type": "object",
            "properties": {
                "utcOffset": {
                    "type": "string",
                    "description": "UTC offset such as \"+02:00\" or \"-05:30\". Defaults to UTC."
                }
            }
        })
    }

    fn run(params: DateTimeParams) -> Result<String, ToolExecutionError> {
        let offset = match params.utc_offset.as_deref() {
            Some(raw) => parse_offset(raw)?,
            None => utc(),
        };
        let now = Utc::now().with_timezone(&offset);
        Ok(json!({
            "datetime": now.to_rfc3339(),
            "date": now.format("%Y-%m-%d").to_string(),
            "time": now.format("%H:%M:%S").to_string(),
            "weekday": now.format("%A").to_string(),
            "utcOffset": offset.to_string(),
        })
        .to_string())
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}

fn parse_offset(raw: &str) -> Result<FixedOffset, ToolExecutionError> {
    let invalid = || ToolExecutionError::new(format!("invalid UTC offset: {raw}"));
    let s = raw.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return Ok(utc());
    }

    let (sign, rest) = if let Some(rest) = s.strip_prefix('+') {
        (1, rest)
    } else if let Some(rest) = s.strip_prefix('-') {
        (-1, rest)
    } else {
        return Err(invalid());
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() == 4 => rest.split_at(2),
        None => (rest, "0"),
    };
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if !(0..=MAX_OFFSET_HOURS).contains(&hours) || !(0..60).contains(&minutes) {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}
