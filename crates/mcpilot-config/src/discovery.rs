//! Config file discovery.
//!
//! Search order (first hit wins):
//! 1. `--config <path>` when given
//! 2. `./mcpilot.json`, then `./mcpilot.toml`
//! 3. `<config dir>/config.json`, then `<config dir>/config.toml`
//!
//! The config dir is `MCPILOT_CONFIG_DIR` when set, otherwise the platform
//! default (`~/.config/mcpilot` on Linux).

use std::path::{Path, PathBuf};
use std::sync::Once;

use crate::{ConfigError, McpilotConfig, Result};

/// Project-local config filenames, in priority order.
const PROJECT_CONFIG_FILES: [&str; 2] = ["mcpilot.json", "mcpilot.toml"];

/// Config filenames inside the user config directory.
const USER_CONFIG_FILES: [&str; 2] = ["config.json", "config.toml"];

/// Application name for XDG directory resolution.
const APP_NAME: &str = "mcpilot";

/// Environment variable to override the config directory.
const CONFIG_DIR_ENV: &str = "MCPILOT_CONFIG_DIR";

static DOTENV: Once = Once::new();

/// A config together with the file it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The parsed configuration, with environment overrides applied.
    pub config: McpilotConfig,
    /// The file it was read from.
    pub source: PathBuf,
}

/// Load `.env` from the working directory, once per process.
///
/// A missing `.env` is not an error.
pub fn load_dotenv() {
    DOTENV.call_once(|| {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
    });
}

/// Load configuration from `explicit`, or discover it.
///
/// `DS_API_KEY` / `DS_BASE_URL` (including from `.env`) are applied on top.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(explicit, Path::new("."), None)
}

/// Load configuration with explicit control over the search roots.
///
/// `project_dir` replaces the working directory and `config_dir` replaces
/// both `MCPILOT_CONFIG_DIR` and the platform default.
pub fn load_config_with_options(
    explicit: Option<&Path>,
    project_dir: &Path,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    load_dotenv();

    let source = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let candidates = candidate_paths(project_dir, config_dir);
            match candidates.iter().find(|p| p.is_file()) {
                Some(found) => found.clone(),
                None => return Err(ConfigError::NotFound { searched: candidates }),
            }
        }
    };

    let mut config = load_config_file(&source)?;
    config.apply_env_overrides();
    tracing::info!(
        path = %source.display(),
        servers = config.mcp_servers.len(),
        "configuration loaded"
    );

    Ok(LoadedConfig { config, source })
}

/// Load config from a specific file path (no discovery, no env overrides).
///
/// The format follows the extension: `.json` or `.toml`.
pub fn load_config_file(path: &Path) -> Result<McpilotConfig> {
    let display = path.display().to_string();
    let format = path.extension().and_then(|e| e.to_str());
    if !matches!(format, Some("json" | "toml")) {
        return Err(ConfigError::UnsupportedFormat { path: display });
    }

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: display.clone(),
        source: e,
    })?;

    if format == Some("json") {
        serde_json::from_str(&contents).map_err(|source| ConfigError::ParseJson {
            path: display,
            source,
        })
    } else {
        toml::from_str(&contents).map_err(|source| ConfigError::ParseToml {
            path: display,
            source,
        })
    }
}

/// Get the user config directory for mcpilot.
///
/// Checks `MCPILOT_CONFIG_DIR` first, then falls back to the platform default.
pub fn user_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Every path discovery looks at, in order.
fn candidate_paths(project_dir: &Path, config_dir: Option<&Path>) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = PROJECT_CONFIG_FILES
        .iter()
        .map(|f| project_dir.join(f))
        .collect();

    let user_dir = config_dir.map(Path::to_path_buf).or_else(user_config_dir);
    if let Some(dir) = user_dir {
        paths.extend(USER_CONFIG_FILES.iter().map(|f| dir.join(f)));
    }
    paths
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
