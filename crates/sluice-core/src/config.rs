use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_MAX_TOOL_CALL_BYTES: usize = 1024 * 1024; // 1 MB per tool call buffer
pub const DEFAULT_REPLAY_CHUNK_SIZE: usize = 64;

/// Top-level config (sluice.toml + SLUICE_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SluiceConfig {
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
}

/// How the line framer splits raw chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FramingMode {
    /// Newline-delimited lines (SSE transport).
    #[default]
    Eol,
    /// Top-level `{` ... `}` blocks, tracked by nesting depth.
    Bracket,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Mode for standalone framers. The composed pipeline always frames by EOL.
    #[serde(default)]
    pub framing: FramingMode,
    /// Argument bytes kept per tool call; later fragments are dropped.
    #[serde(default = "default_max_tool_call_bytes")]
    pub max_tool_call_bytes: usize,
    /// Run the best-effort JSON repair pass on completed tool calls.
    #[serde(default = "bool_true")]
    pub repair_tool_arguments: bool,
    /// Forward each image index only once.
    #[serde(default = "bool_true")]
    pub dedupe_images: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            framing: FramingMode::Eol,
            max_tool_call_bytes: DEFAULT_MAX_TOOL_CALL_BYTES,
            repair_tool_arguments: true,
            dedupe_images: true,
        }
    }
}

/// Settings for the transcript replay tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Characters per simulated transport chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Pause between chunks, in milliseconds.
    #[serde(default)]
    pub delay_ms: u64,
    /// Print every domain event, not only the final segments.
    #[serde(default = "bool_true")]
    pub print_events: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_REPLAY_CHUNK_SIZE,
            delay_ms: 0,
            print_events: true,
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_max_tool_call_bytes() -> usize {
    DEFAULT_MAX_TOOL_CALL_BYTES
}
fn default_chunk_size() -> usize {
    DEFAULT_REPLAY_CHUNK_SIZE
}

impl SluiceConfig {
    /// Load config from a TOML file with SLUICE_* env var overrides.
    ///
    /// Nested keys are separated by a double underscore, e.g.
    /// `SLUICE_STREAM__MAX_TOOL_CALL_BYTES=4096`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        debug!(path = %path, "loading config");

        Self::from_figment(
            Figment::new()
                .merge(Toml::file(&path))
                .merge(Env::prefixed("SLUICE_").split("__")),
        )
    }

    /// Extract config from an already assembled figment.
    pub fn from_figment(figment: Figment) -> crate::error::Result<Self> {
        figment
            .extract()
            .map_err(|e| crate::error::SluiceError::Config(e.to_string()))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.sluice/sluice.toml", home)
}
