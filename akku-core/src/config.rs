//! Configuration for the Akku pipeline.
//!
//! Uses `figment` for layered configuration: defaults -> user config -> workspace
//! config -> environment.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the workspace-local configuration file.
pub const WORKSPACE_CONFIG_FILE: &str = "akku.toml";

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of records stored per dataset.
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
    /// Fixed seed for client-side sampling. `None` draws from OS entropy.
    #[serde(default)]
    pub sampling_seed: Option<u64>,
    /// Timeout applied to every HTTP request, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub outputs: OutputsConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_size: default_sample_size(),
            sampling_seed: None,
            request_timeout_secs: default_request_timeout(),
            store: StoreConfig::default(),
            sources: SourcesConfig::default(),
            outputs: OutputsConfig::default(),
        }
    }
}

fn default_sample_size() -> usize {
    2500
}

fn default_request_timeout() -> u64 {
    120
}

/// Document store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path of the SQLite file backing the store.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Logical database name; collections are scoped to it.
    #[serde(default = "default_database")]
    pub database: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            database: default_database(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("akku.db")
}

fn default_database() -> String {
    "AkkuProject".to_string()
}

/// Remote dataset endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Rows-view export of the Washington State EV population data.
    #[serde(default = "default_ev_url")]
    pub ev_url: String,
    /// CDC nutrition resource endpoint; `$limit` is appended at fetch time.
    #[serde(default = "default_nutrition_url")]
    pub nutrition_url: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            ev_url: default_ev_url(),
            nutrition_url: default_nutrition_url(),
        }
    }
}

fn default_ev_url() -> String {
    "https://data.wa.gov/api/views/f6w7-q2d2/rows.json?accessType=DOWNLOAD".to_string()
}

fn default_nutrition_url() -> String {
    "https://chronicdata.cdc.gov/resource/hn4x-zwk7.json".to_string()
}

/// Output directories for file artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputsConfig {
    #[serde(default = "default_csv_dir")]
    pub csv_dir: PathBuf,
    #[serde(default = "default_analysis_dir")]
    pub analysis_dir: PathBuf,
    #[serde(default = "default_visualization_dir")]
    pub visualization_dir: PathBuf,
}

impl Default for OutputsConfig {
    fn default() -> Self {
        Self {
            csv_dir: default_csv_dir(),
            analysis_dir: default_analysis_dir(),
            visualization_dir: default_visualization_dir(),
        }
    }
}

fn default_csv_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_analysis_dir() -> PathBuf {
    PathBuf::from("analysis_outputs")
}

fn default_visualization_dir() -> PathBuf {
    PathBuf::from("visualizations")
}

impl PipelineConfig {
    /// Resolve relative store and output paths against `workspace`.
    pub fn resolve_paths(mut self, workspace: &Path) -> Self {
        let resolve = |p: PathBuf| {
            if p.is_absolute() {
                p
            } else {
                workspace.join(p)
            }
        };
        self.store.path = resolve(self.store.path);
        self.outputs.csv_dir = resolve(self.outputs.csv_dir);
        self.outputs.analysis_dir = resolve(self.outputs.analysis_dir);
        self.outputs.visualization_dir = resolve(self.outputs.visualization_dir);
        self
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `AKKU_`, `__` for nesting)
/// 2. Explicit config file, or the workspace-local `akku.toml`
/// 3. User config (`~/.config/akku/config.toml`)
/// 4. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<PipelineConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(PipelineConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "akku", "akku") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(path) = explicit {
        figment = figment.merge(Toml::file(path));
    } else if let Some(ws) = workspace {
        let ws_config = ws.join(WORKSPACE_CONFIG_FILE);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // AKKU_SAMPLE_SIZE, AKKU_STORE__PATH, AKKU_OUTPUTS__CSV_DIR, ...
    figment = figment.merge(Env::prefixed("AKKU_").split("__"));

    figment.extract().map_err(Box::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.sample_size, 2500);
        assert_eq!(config.request_timeout_secs, 120);
        assert!(config.sampling_seed.is_none());
        assert_eq!(config.store.database, "AkkuProject");
        assert_eq!(config.outputs.analysis_dir, PathBuf::from("analysis_outputs"));
    }

    #[test]
    fn test_workspace_file_then_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                WORKSPACE_CONFIG_FILE,
                r#"
                sample_size = 100
                sampling_seed = 7

                [store]
                database = "Scratch"
                "#,
            )?;
            jail.set_env("AKKU_SAMPLE_SIZE", "50");
            jail.set_env("AKKU_OUTPUTS__CSV_DIR", "exports");

            let config = load_config(Some(jail.directory()), None).map_err(|e| *e)?;
            assert_eq!(config.sample_size, 50);
            assert_eq!(config.sampling_seed, Some(7));
            assert_eq!(config.store.database, "Scratch");
            assert_eq!(config.outputs.csv_dir, PathBuf::from("exports"));
            assert_eq!(config.store.path, PathBuf::from("akku.db"));
            Ok(())
        });
    }

    #[test]
    fn test_explicit_file_wins_over_workspace_file() {
        Jail::expect_with(|jail| {
            jail.create_file(WORKSPACE_CONFIG_FILE, "sample_size = 10")?;
            jail.create_file("other.toml", "sample_size = 20")?;
            let explicit = jail.directory().join("other.toml");

            let config = load_config(Some(jail.directory()), Some(&explicit)).map_err(|e| *e)?;
            assert_eq!(config.sample_size, 20);
            Ok(())
        });
    }

    #[test]
    fn test_resolve_paths_keeps_absolute() {
        let mut config = PipelineConfig::default();
        config.outputs.csv_dir = PathBuf::from("/var/exports");
        let config = config.resolve_paths(Path::new("/work"));
        assert_eq!(config.store.path, PathBuf::from("/work/akku.db"));
        assert_eq!(config.outputs.csv_dir, PathBuf::from("/var/exports"));
    }
}
