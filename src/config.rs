use crate::theme::ThemeMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

const APP_DIR: &str = "pagesmith";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub presets_dir: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_preset: Option<String>,
    pub theme: ThemeMode,
    pub light_theme: String,
    pub dark_theme: String,
    pub reference_collapsed: bool,
    pub autosave_ms: u64,
    pub tab_width: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            presets_dir: dirs::config_dir().map(|dir| dir.join(APP_DIR).join("presets")),
            data_dir: dirs::data_dir().map(|dir| dir.join(APP_DIR)),
            default_preset: None,
            theme: ThemeMode::Light,
            light_theme: "InspiredGitHub".to_string(),
            dark_theme: "base16-ocean.dark".to_string(),
            reference_collapsed: false,
            autosave_ms: 400,
            tab_width: 4,
        }
    }
}

impl Config {
    /// Draft storage root, falling back to `./.pagesmith` when the platform
    /// has no data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!(".{APP_DIR}")))
    }

    pub fn syntect_theme(&self) -> &str {
        match self.theme {
            ThemeMode::Light => &self.light_theme,
            ThemeMode::Dark => &self.dark_theme,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct PartialConfig {
    presets_dir: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    default_preset: Option<String>,
    theme: Option<ThemeMode>,
    light_theme: Option<String>,
    dark_theme: Option<String>,
    reference_collapsed: Option<bool>,
    autosave_ms: Option<u64>,
    tab_width: Option<usize>,
}

fn or_default<T>(value: Option<T>, default: T, changed: &mut bool) -> T {
    match value {
        Some(v) => v,
        None => {
            *changed = true;
            default
        }
    }
}

impl PartialConfig {
    /// Fills the gaps from `Config::default()`. The flag reports whether any
    /// field was missing, so the file can be rewritten in full.
    fn apply_defaults(self) -> (Config, bool) {
        let defaults = Config::default();
        let mut changed = false;

        let presets_dir = match self.presets_dir {
            Some(v) => Some(v),
            None => {
                changed = true;
                defaults.presets_dir
            }
        };
        let data_dir = match self.data_dir {
            Some(v) => Some(v),
            None => {
                changed = true;
                defaults.data_dir
            }
        };

        (
            Config {
                presets_dir,
                data_dir,
                default_preset: self.default_preset,
                theme: or_default(self.theme, defaults.theme, &mut changed),
                light_theme: or_default(self.light_theme, defaults.light_theme, &mut changed),
                dark_theme: or_default(self.dark_theme, defaults.dark_theme, &mut changed),
                reference_collapsed: or_default(
                    self.reference_collapsed,
                    defaults.reference_collapsed,
                    &mut changed,
                ),
                autosave_ms: or_default(self.autosave_ms, defaults.autosave_ms, &mut changed),
                tab_width: or_default(self.tab_width, defaults.tab_width, &mut changed),
            },
            changed,
        )
    }
}

pub fn config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("Could not determine config directory")?;
    Ok(base.join(APP_DIR).join("config.toml"))
}

pub fn ensure_config_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(())
}

pub fn load_config() -> Result<Config> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        let cfg = Config::default();
        write_config_to(path, &cfg)?;
        return Ok(cfg);
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let partial: PartialConfig = toml::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    let (cfg, changed) = partial.apply_defaults();
    if changed {
        log::debug!("filling missing config fields in {}", path.display());
        write_config_to(path, &cfg)?;
    }
    Ok(cfg)
}

pub fn write_config(cfg: &Config) -> Result<()> {
    write_config_to(&config_path()?, cfg)
}

pub fn write_config_to(path: &Path, cfg: &Config) -> Result<()> {
    ensure_config_dir(path)?;
    let text = toml::to_string_pretty(cfg).context("Failed to serialize config")?;
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub fn open_config_in_editor() -> Result<()> {
    let path = config_path()?;
    if !path.exists() {
        let cfg = Config::default();
        write_config(&cfg)?;
    }

    let editor = env::var("EDITOR").unwrap_or_else(|_| "nvim".to_string());
    let mut parts = match shell_words::split(&editor) {
        Ok(p) if !p.is_empty() => p,
        _ => vec![editor],
    };
    let cmd = parts.remove(0);
    let status = Command::new(cmd)
        .args(parts)
        .arg(&path)
        .status()
        .with_context(|| format!("Failed to launch editor for {}", path.display()))?;
    if !status.success() {
        anyhow::bail!("Editor exited with status {}", status);
    }
    Ok(())
}
