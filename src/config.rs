use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{Quiz, QuizWithId, TurnPolicy};

/// Server-wide game settings loaded from `game.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GameConfig {
    pub feedback_delay_ms: u64,
    pub turn_policy: TurnPolicy,
    pub room_idle_ttl_secs: u64,
    pub max_rooms: usize,
    /// A socket that sends nothing, not even a pong, for this long is dropped.
    pub socket_idle_timeout_secs: u64,
    /// Empty means any origin may open the WebSocket.
    pub allowed_origins: Vec<String>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            feedback_delay_ms: 5000,
            turn_policy: TurnPolicy::AllPlayers,
            room_idle_ttl_secs: 600,
            max_rooms: 500,
            socket_idle_timeout_secs: 60,
            allowed_origins: Vec::new(),
        }
    }
}

impl GameConfig {
    pub fn feedback_delay(&self) -> Duration {
        Duration::from_millis(self.feedback_delay_ms)
    }

    pub fn room_idle_ttl(&self) -> Duration {
        Duration::from_secs(self.room_idle_ttl_secs)
    }

    pub fn socket_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.socket_idle_timeout_secs.max(1))
    }
}

/// The config directory: `$CONFIG_PATH`, or `config`.
pub fn config_dir() -> PathBuf {
    PathBuf::from(std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config".to_string()))
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ConfigError + '_ {
    move |source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ConfigError> {
    let data = serde_json::to_string_pretty(value).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    fs::write(path, data).map_err(io_error(path))
}

/// Initialize the config directory with defaults if missing.
pub fn init(base: &Path) -> Result<(), ConfigError> {
    if !base.exists() {
        fs::create_dir_all(base).map_err(io_error(base))?;
    }

    let game_path = base.join("game.json");
    if !game_path.exists() {
        write_json(&game_path, &GameConfig::default())?;
    }

    let quiz_dir = base.join("quizz");
    if !quiz_dir.exists() {
        fs::create_dir_all(&quiz_dir).map_err(io_error(&quiz_dir))?;

        let example = serde_json::json!({
            "topic": "Road Trip Classics",
            "language": "en",
            "questions": [
                {
                    "question": "What color is a standard stop sign?",
                    "options": ["Red", "Blue", "Green", "Yellow"],
                    "correctAnswer": 0
                },
                {
                    "question": "How many wheels does a typical car have?",
                    "options": ["Three", "Four", "Five", "Six"],
                    "correctAnswer": 1
                }
            ]
        });
        write_json(&quiz_dir.join("example.json"), &example)?;
    }

    Ok(())
}

/// Load the game configuration.
pub fn load_game_config(base: &Path) -> Result<GameConfig, ConfigError> {
    let path = base.join("game.json");
    let data = fs::read_to_string(&path).map_err(io_error(&path))?;
    serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Load all quizzes from the quizz directory. Unreadable files are logged and skipped.
pub fn load_quizzes(base: &Path) -> Vec<QuizWithId> {
    let quiz_dir = base.join("quizz");
    if !quiz_dir.exists() {
        return vec![];
    }

    let entries = match fs::read_dir(&quiz_dir) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Failed to read quizz directory: {}", e);
            return vec![];
        }
    };

    let mut quizzes = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();

        match fs::read_to_string(&path) {
            Ok(data) => match serde_json::from_str::<Quiz>(&data) {
                Ok(quiz) => quizzes.push(QuizWithId { id, quiz }),
                Err(e) => tracing::error!("Failed to parse quiz {}: {}", path.display(), e),
            },
            Err(e) => tracing::error!("Failed to read quiz {}: {}", path.display(), e),
        }
    }

    quizzes.sort_by(|a, b| a.id.cmp(&b.id));
    quizzes
}

/// Shorten user-supplied text before it reaches the logs.
pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    let mut out: String = text
        .chars()
        .filter(|c| !c.is_control())
        .take(max_chars)
        .collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}
