use std::{collections::HashMap, env, fs, path::PathBuf};

use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use derive_deref::{Deref, DerefMut};
use directories::BaseDirs;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize, de::Deserializer};

use crate::services::window_planner::SortOrder;
use crate::tui::action::Action;

/// Input context a key binding applies in
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    Global,
    Tree,
    Edit,
    LogicSelect,
    Logs,
    Overview,
}

const CONFIG: &str = include_str!("../.config/config.json5");

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub config_dir: PathBuf,
}

/// How the overview series is produced
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverviewMode {
    /// Aggregate query grouped by level and bucket
    #[default]
    Backend,
    /// Bucket the rows of the current window
    Client,
}

/// Where the diagnostic rows live and which columns carry what
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// SQLite database file; in-memory when unset
    pub database: Option<PathBuf>,
    pub table: String,
    /// Epoch seconds
    pub time_column: String,
    /// `YYYY-MM-DD` partition column
    pub date_column: Option<String>,
    /// Epoch nanoseconds; becomes the sort key when set
    pub precise_time_column: Option<String>,
    pub message_column: String,
    pub level_column: String,
    pub page_size: usize,
    pub overview: OverviewMode,
    pub order: SortOrder,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            database: None,
            table: "logs".to_string(),
            time_column: "timestamp".to_string(),
            date_column: None,
            precise_time_column: None,
            message_column: "message".to_string(),
            level_column: "level".to_string(),
            page_size: 200,
            overview: OverviewMode::Backend,
            order: SortOrder::Desc,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default, flatten)]
    pub config: AppConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub keybindings: KeyBindings,
}

lazy_static! {
    pub static ref PROJECT_NAME: String = env!("CARGO_CRATE_NAME").to_uppercase().to_string();
    pub static ref DATA_FOLDER: Option<PathBuf> =
        env::var(format!("{}_DATA", PROJECT_NAME.clone()))
            .ok()
            .map(PathBuf::from);
    pub static ref CONFIG_FOLDER: Option<PathBuf> =
        env::var(format!("{}_CONFIG", PROJECT_NAME.clone()))
            .ok()
            .map(PathBuf::from);
}

impl Config {
    /// Load the embedded defaults overlaid with the user's config file
    ///
    /// Without an explicit path the home config is used, seeded from the
    /// embedded defaults on first run. Key bindings missing from the user file
    /// fall back to the defaults per mode.
    pub fn from_path(config_path: Option<&PathBuf>) -> Result<Self, config::ConfigError> {
        let default_config: Config = json5::from_str(CONFIG)
            .map_err(|e| config::ConfigError::Message(format!("embedded config: {e}")))?;
        let data_dir = get_data_dir();
        let config_dir = get_config_dir();
        let mut builder = config::Config::builder()
            .set_default("data_dir", data_dir.to_string_lossy().to_string())?
            .set_default("config_dir", config_dir.to_string_lossy().to_string())?;

        let selected_path = match config_path {
            Some(p) => expand_tilde(p),
            None => {
                let home_cfg = default_home_config_path();
                if !home_cfg.exists() {
                    if let Some(parent) = home_cfg.parent() {
                        let _ = fs::create_dir_all(parent);
                    }
                    let _ = fs::write(&home_cfg, CONFIG);
                }
                home_cfg
            }
        };

        builder = builder.add_source(
            config::File::from(selected_path)
                .format(config::FileFormat::Json5)
                .required(true),
        );

        let mut cfg: Self = builder.build()?.try_deserialize()?;

        for (mode, default_bindings) in default_config.keybindings.iter() {
            let user_bindings = cfg.keybindings.entry(*mode).or_default();
            for (keys, action) in default_bindings.iter() {
                user_bindings.entry(keys.clone()).or_insert(*action);
            }
        }

        Ok(cfg)
    }

    /// Embedded defaults only, no file lookups
    pub fn embedded() -> Result<Self> {
        let mut cfg: Config = json5::from_str(CONFIG)?;
        cfg.config.data_dir = get_data_dir();
        cfg.config.config_dir = get_config_dir();
        Ok(cfg)
    }

    /// Where save/load of the filter tree reads and writes
    pub fn filter_file(&self) -> PathBuf {
        self.config.data_dir.join("filter.json")
    }

    pub fn action_for_keys(&self, mode: Mode, keys: &[KeyEvent]) -> Option<Action> {
        self.keybindings.get(&mode)?.get(keys).copied()
    }

    /// Resolve a single key press in `mode`, falling back to the global bindings
    pub fn action_for_key(&self, mode: Mode, key: KeyEvent) -> Option<Action> {
        if key.kind != KeyEventKind::Press {
            return None;
        }
        self.action_for_keys(mode, &[key])
            .or_else(|| self.action_for_keys(Mode::Global, &[key]))
    }

    pub fn key_for_action(&self, mode: Mode, action: Action) -> Option<String> {
        self.keybindings
            .get(&mode)?
            .iter()
            .filter(|(_, bound)| **bound == action)
            .map(|(keys, _)| keys.iter().map(key_event_to_string).collect::<Vec<_>>().join(" "))
            .min()
    }

    /// One-line `key: action` hints for the status bar
    pub fn instructions(&self, mode: Mode, actions: &[Action]) -> String {
        actions
            .iter()
            .map(|action| match self.key_for_action(mode, *action) {
                Some(key) => format!("{key}: {}", action.description()),
                None => action.description().to_string(),
            })
            .collect::<Vec<_>>()
            .join("  ")
    }
}

fn expand_tilde(path: &PathBuf) -> PathBuf {
    if let (Some(s), Some(base)) = (path.to_str(), BaseDirs::new()) {
        if let Some(rest) = s.strip_prefix('~') {
            return PathBuf::from(format!("{}{rest}", base.home_dir().to_string_lossy()));
        }
    }
    path.clone()
}

fn default_home_config_path() -> PathBuf {
    match BaseDirs::new() {
        Some(base) => base.home_dir().join(".diagtui-config.json5"),
        None => PathBuf::from(".diagtui-config.json5"),
    }
}

pub fn get_data_dir() -> PathBuf {
    DATA_FOLDER
        .clone()
        .unwrap_or_else(|| PathBuf::from(".").join(".data"))
}

pub fn get_config_dir() -> PathBuf {
    CONFIG_FOLDER
        .clone()
        .unwrap_or_else(|| PathBuf::from(".").join(".config"))
}

#[derive(Clone, Debug, Default, Deref, DerefMut)]
pub struct KeyBindings(pub HashMap<Mode, HashMap<Vec<KeyEvent>, Action>>);

impl<'de> Deserialize<'de> for KeyBindings {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let parsed_map = HashMap::<Mode, HashMap<String, Action>>::deserialize(deserializer)?;

        let mut keybindings = HashMap::with_capacity(parsed_map.len());
        for (mode, inner_map) in parsed_map {
            let mut converted = HashMap::with_capacity(inner_map.len());
            for (key_string, action) in inner_map {
                let keys = parse_key_sequence(&key_string).map_err(serde::de::Error::custom)?;
                converted.insert(keys, action);
            }
            keybindings.insert(mode, converted);
        }

        Ok(KeyBindings(keybindings))
    }
}

fn parse_key_event(raw: &str) -> Result<KeyEvent, String> {
    let raw_lower = raw.to_ascii_lowercase();
    let (remaining, modifiers) = extract_modifiers(&raw_lower);
    parse_key_code_with_modifiers(remaining, modifiers)
}

fn extract_modifiers(raw: &str) -> (&str, KeyModifiers) {
    let mut modifiers = KeyModifiers::empty();
    let mut current = raw;

    loop {
        if let Some(rest) = current.strip_prefix("ctrl-") {
            modifiers.insert(KeyModifiers::CONTROL);
            current = rest;
        } else if let Some(rest) = current.strip_prefix("alt-") {
            modifiers.insert(KeyModifiers::ALT);
            current = rest;
        } else if let Some(rest) = current.strip_prefix("shift-") {
            modifiers.insert(KeyModifiers::SHIFT);
            current = rest;
        } else {
            break;
        }
    }

    (current, modifiers)
}

fn parse_key_code_with_modifiers(
    raw: &str,
    mut modifiers: KeyModifiers,
) -> Result<KeyEvent, String> {
    let code = match raw {
        "esc" => KeyCode::Esc,
        "enter" => KeyCode::Enter,
        "left" => KeyCode::Left,
        "right" => KeyCode::Right,
        "up" => KeyCode::Up,
        "down" => KeyCode::Down,
        "home" => KeyCode::Home,
        "end" => KeyCode::End,
        "pageup" => KeyCode::PageUp,
        "pagedown" => KeyCode::PageDown,
        "backtab" => {
            modifiers.insert(KeyModifiers::SHIFT);
            KeyCode::BackTab
        }
        "backspace" => KeyCode::Backspace,
        "delete" => KeyCode::Delete,
        "insert" => KeyCode::Insert,
        "space" => KeyCode::Char(' '),
        "minus" | "hyphen" => KeyCode::Char('-'),
        "tab" => KeyCode::Tab,
        f if f.len() > 1 && f.starts_with('f') => match f[1..].parse::<u8>() {
            Ok(n @ 1..=12) => KeyCode::F(n),
            _ => return Err(format!("Unable to parse {raw}")),
        },
        c if c.chars().count() == 1 => {
            let mut ch = c.chars().next().ok_or_else(|| format!("Unable to parse {raw}"))?;
            if modifiers.contains(KeyModifiers::SHIFT) {
                ch = ch.to_ascii_uppercase();
            }
            KeyCode::Char(ch)
        }
        _ => return Err(format!("Unable to parse {raw}")),
    };
    Ok(KeyEvent::new(code, modifiers))
}

pub fn key_event_to_string(key_event: &KeyEvent) -> String {
    let code = match key_event.code {
        KeyCode::Backspace => "backspace".to_string(),
        KeyCode::Enter => "enter".to_string(),
        KeyCode::Left => "left".to_string(),
        KeyCode::Right => "right".to_string(),
        KeyCode::Up => "up".to_string(),
        KeyCode::Down => "down".to_string(),
        KeyCode::Home => "home".to_string(),
        KeyCode::End => "end".to_string(),
        KeyCode::PageUp => "pageup".to_string(),
        KeyCode::PageDown => "pagedown".to_string(),
        KeyCode::Tab => "tab".to_string(),
        KeyCode::BackTab => "backtab".to_string(),
        KeyCode::Delete => "delete".to_string(),
        KeyCode::Insert => "insert".to_string(),
        KeyCode::Esc => "esc".to_string(),
        KeyCode::F(n) => format!("f{n}"),
        KeyCode::Char(' ') => "space".to_string(),
        KeyCode::Char(c) => c.to_string(),
        _ => String::new(),
    };

    let mut parts = Vec::with_capacity(4);
    if key_event.modifiers.intersects(KeyModifiers::CONTROL) {
        parts.push("ctrl".to_string());
    }
    // BackTab already implies shift
    if key_event.modifiers.intersects(KeyModifiers::SHIFT) && key_event.code != KeyCode::BackTab {
        parts.push("shift".to_string());
    }
    if key_event.modifiers.intersects(KeyModifiers::ALT) {
        parts.push("alt".to_string());
    }
    parts.push(code);
    parts.join("-")
}

/// Parse `<ctrl-a>`, `q` or `<g><g>` style sequences
pub fn parse_key_sequence(raw: &str) -> Result<Vec<KeyEvent>, String> {
    if raw.chars().filter(|c| *c == '>').count() != raw.chars().filter(|c| *c == '<').count() {
        return Err(format!("Unable to parse `{raw}`"));
    }
    let raw = if !raw.contains("><") {
        let raw = raw.strip_prefix('<').unwrap_or(raw);
        raw.strip_suffix('>').unwrap_or(raw)
    } else {
        raw
    };
    raw.split("><")
        .map(|seq| {
            let seq = seq.strip_prefix('<').unwrap_or(seq);
            seq.strip_suffix('>').unwrap_or(seq)
        })
        .map(parse_key_event)
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_simple_keys() {
        assert_eq!(
            parse_key_event("a").unwrap(),
            KeyEvent::new(KeyCode::Char('a'), KeyModifiers::empty())
        );
        assert_eq!(
            parse_key_event("enter").unwrap(),
            KeyEvent::new(KeyCode::Enter, KeyModifiers::empty())
        );
        assert_eq!(
            parse_key_event("f5").unwrap(),
            KeyEvent::new(KeyCode::F(5), KeyModifiers::empty())
        );
    }

    #[test]
    fn test_with_modifiers() {
        assert_eq!(
            parse_key_event("ctrl-s").unwrap(),
            KeyEvent::new(KeyCode::Char('s'), KeyModifiers::CONTROL)
        );
        assert_eq!(
            parse_key_event("ctrl-alt-a").unwrap(),
            KeyEvent::new(KeyCode::Char('a'), KeyModifiers::CONTROL | KeyModifiers::ALT)
        );
        assert_eq!(
            parse_key_event("backtab").unwrap(),
            KeyEvent::new(KeyCode::BackTab, KeyModifiers::SHIFT)
        );
    }

    #[test]
    fn test_invalid_keys() {
        assert!(parse_key_event("invalid-key").is_err());
        assert!(parse_key_event("f13").is_err());
        assert!(parse_key_sequence("<ctrl-a").is_err());
    }

    #[test]
    fn test_key_round_trip_text() {
        let key = KeyEvent::new(KeyCode::Char('a'), KeyModifiers::CONTROL | KeyModifiers::ALT);
        assert_eq!(key_event_to_string(&key), "ctrl-alt-a");
        let back_tab = parse_key_event("backtab").unwrap();
        assert_eq!(key_event_to_string(&back_tab), "backtab");
    }

    #[test]
    fn test_sequence_parsing() {
        let keys = parse_key_sequence("<g><g>").unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(parse_key_sequence("<q>").unwrap(), parse_key_sequence("q").unwrap());
    }

    #[test]
    fn embedded_config_binds_every_mode() {
        let cfg = Config::embedded().unwrap();
        assert_eq!(cfg.source, SourceConfig::default());
        for mode in [Mode::Global, Mode::Tree, Mode::Edit, Mode::LogicSelect, Mode::Logs, Mode::Overview] {
            assert!(cfg.keybindings.contains_key(&mode), "{mode:?} has no bindings");
        }
        let quit = KeyEvent::new(KeyCode::Char('q'), KeyModifiers::CONTROL);
        assert_eq!(cfg.action_for_key(Mode::Tree, quit), Some(Action::Quit));
    }

    #[test]
    fn user_file_overrides_source_and_keeps_default_bindings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json5");
        fs::write(
            &path,
            r#"{
                source: { table: "events", page_size: 50, overview: "client", precise_time_column: "ts_ns" },
                keybindings: { Logs: { "<x>": "DrillIn" } },
            }"#,
        )
        .unwrap();
        let cfg = Config::from_path(Some(&path)).unwrap();
        assert_eq!(cfg.source.table, "events");
        assert_eq!(cfg.source.page_size, 50);
        assert_eq!(cfg.source.overview, OverviewMode::Client);
        assert_eq!(cfg.source.precise_time_column.as_deref(), Some("ts_ns"));
        assert_eq!(cfg.source.time_column, "timestamp");

        let x = KeyEvent::new(KeyCode::Char('x'), KeyModifiers::empty());
        assert_eq!(cfg.action_for_key(Mode::Logs, x), Some(Action::DrillIn));
        let next = KeyEvent::new(KeyCode::Char('n'), KeyModifiers::empty());
        assert_eq!(cfg.action_for_key(Mode::Logs, next), Some(Action::NextPage));
    }
}
