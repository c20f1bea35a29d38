use crate::core::predicate::quote_identifier;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Canonical severity every raw level string is mapped onto
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter, EnumString,
    Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Error,
    Warning,
    Info,
    Debug,
    Other,
}

/// Raw spellings (lowercase) and the level they normalize to
pub const LEVEL_ALIASES: &[(&str, Level)] = &[
    ("error", Level::Error),
    ("err", Level::Error),
    ("exception", Level::Error),
    ("critical", Level::Error),
    ("crit", Level::Error),
    ("fatal", Level::Error),
    ("alert", Level::Error),
    ("emerg", Level::Error),
    ("emergency", Level::Error),
    ("panic", Level::Error),
    ("warning", Level::Warning),
    ("warn", Level::Warning),
    ("info", Level::Info),
    ("information", Level::Info),
    ("informational", Level::Info),
    ("notice", Level::Info),
    ("debug", Level::Debug),
    ("trace", Level::Debug),
];

impl Level {
    /// Normalize a raw level string; unknown spellings become `Other`
    pub fn canonicalize(raw: &str) -> Level {
        let lowered = raw.trim().to_lowercase();
        LEVEL_ALIASES
            .iter()
            .find(|(alias, _)| *alias == lowered)
            .map(|(_, level)| *level)
            .unwrap_or(Level::Other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Info => "info",
            Level::Debug => "debug",
            Level::Other => "other",
        }
    }
}

/// SQL `CASE` expression mapping `column` onto canonical level names
///
/// Built from `LEVEL_ALIASES` so the backend and client mappings cannot diverge.
pub fn canonical_level_sql(column: &str) -> String {
    let arms: Vec<String> = LEVEL_ALIASES
        .iter()
        .map(|(alias, level)| format!("WHEN '{alias}' THEN '{}'", level.as_str()))
        .collect();
    format!(
        "CASE LOWER(TRIM({})) {} ELSE '{}' END",
        quote_identifier(column),
        arms.join(" "),
        Level::Other.as_str()
    )
}
