use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

const DEFAULT_PORT: u16 = 4400;
const DEFAULT_HORIZON_DAYS: u32 = 30;
const DEFAULT_COMPLETION_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4";

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

// ─── GenerationConfig ─────────────────────────────────────────────────────────

/// Completion-API configuration (`[generation]` in config.toml).
///
/// The API key is never stored in the file — it comes from the
/// `ROUTINED_API_KEY` (or `OPENAI_API_KEY`) environment variable.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Base URL of the OpenAI-compatible completion API.
    pub api_base_url: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// Sampling temperature (default: 0.7, matching the generation prompt's tuning).
    pub temperature: f32,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// API key resolved from the environment at load time. Not serialized.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_COMPLETION_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            request_timeout_secs: 60,
            api_key: None,
        }
    }
}

// ─── MaterializerConfig ───────────────────────────────────────────────────────

/// Task materializer tuning (`[materializer]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MaterializerConfig {
    /// Days materialized ahead when a range has no explicit end (default: 30).
    pub horizon_days: u32,
}

impl Default for MaterializerConfig {
    fn default() -> Self {
        Self {
            horizon_days: DEFAULT_HORIZON_DAYS,
        }
    }
}

// ─── TOML file layer ──────────────────────────────────────────────────────────

/// `{data_dir}/config.toml` — all fields are optional overrides.
#[derive(Debug, Default, Deserialize)]
struct TomlConfig {
    port: Option<u16>,
    log: Option<String>,
    log_format: Option<String>,
    bind_address: Option<String>,
    generation: Option<GenerationConfig>,
    materializer: Option<MaterializerConfig>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            warn!("ignoring malformed config.toml at {}: {e}", path.display());
            None
        }
    }
}

// ─── DaemonConfig ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub log: String,
    /// Log output format: "pretty" (default) | "json".
    pub log_format: String,
    /// Bind address for the HTTP server (default: "127.0.0.1").
    pub bind_address: String,
    pub generation: GenerationConfig,
    pub materializer: MaterializerConfig,
}

impl DaemonConfig {
    /// Build config from CLI/env args + optional TOML file.
    ///
    /// Priority (highest to lowest):
    ///   1. CLI / env — passed as `Some(value)` from clap
    ///   2. TOML file at `{data_dir}/config.toml`
    ///   3. Built-in defaults
    pub fn new(
        port: Option<u16>,
        data_dir: Option<PathBuf>,
        log: Option<String>,
        bind_address: Option<String>,
    ) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);

        // Load TOML as the lowest-priority override layer
        let toml = load_toml(&data_dir).unwrap_or_default();

        let port = port.or(toml.port).unwrap_or(DEFAULT_PORT);
        let log = log.or(toml.log).unwrap_or_else(|| "info".to_string());

        let log_format = std::env::var("ROUTINED_LOG_FORMAT")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.log_format)
            .unwrap_or_else(|| "pretty".to_string());

        let bind_address = bind_address
            .or(std::env::var("ROUTINED_BIND").ok().filter(|s| !s.is_empty()))
            .or(toml.bind_address)
            .unwrap_or_else(default_bind_address);

        let mut generation = toml.generation.unwrap_or_default();
        generation.api_key = std::env::var("ROUTINED_API_KEY")
            .ok()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.is_empty());

        let materializer = toml.materializer.unwrap_or_default();

        Self {
            port,
            data_dir,
            log,
            log_format,
            bind_address,
            generation,
            materializer,
        }
    }
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        // ~/Library/Application Support/routined
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("routined");
        }
    }
    #[cfg(target_os = "linux")]
    {
        // $XDG_DATA_HOME/routined or ~/.local/share/routined
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("routined");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("routined");
        }
    }
    #[cfg(target_os = "windows")]
    {
        // %APPDATA%\routined
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("routined");
        }
    }
    // Fallback
    PathBuf::from(".routined")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_nothing_given() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = DaemonConfig::new(None, Some(dir.path().to_path_buf()), None, None);
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.log, "info");
        assert_eq!(cfg.bind_address, "127.0.0.1");
        assert_eq!(cfg.materializer.horizon_days, 30);
        assert_eq!(cfg.generation.model, DEFAULT_MODEL);
    }

    #[test]
    fn cli_overrides_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "port = 5000\nlog = \"debug\"\n\n[materializer]\nhorizon_days = 7\n",
        )
        .unwrap();

        // TOML layer applies where the CLI is silent.
        let cfg = DaemonConfig::new(None, Some(dir.path().to_path_buf()), None, None);
        assert_eq!(cfg.port, 5000);
        assert_eq!(cfg.log, "debug");
        assert_eq!(cfg.materializer.horizon_days, 7);

        // CLI wins over TOML.
        let cfg = DaemonConfig::new(
            Some(6000),
            Some(dir.path().to_path_buf()),
            Some("warn".to_string()),
            None,
        );
        assert_eq!(cfg.port, 6000);
        assert_eq!(cfg.log, "warn");
    }

    #[test]
    fn malformed_toml_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "port = \"not a number").unwrap();
        let cfg = DaemonConfig::new(None, Some(dir.path().to_path_buf()), None, None);
        assert_eq!(cfg.port, DEFAULT_PORT);
    }

    #[test]
    fn generation_section_parses() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "[generation]\nmodel = \"gpt-4o\"\ntemperature = 0.2\n",
        )
        .unwrap();
        let cfg = DaemonConfig::new(None, Some(dir.path().to_path_buf()), None, None);
        assert_eq!(cfg.generation.model, "gpt-4o");
        assert!((cfg.generation.temperature - 0.2).abs() < f32::EPSILON);
        // Untouched fields keep their defaults.
        assert_eq!(cfg.generation.api_base_url, DEFAULT_COMPLETION_URL);
    }
}
