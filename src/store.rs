//! Configuration files on disk: location, baseline materialization and
//! two-stage loading.

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::{GlobalConfig, LayoutConfig, ScanConfig};
use crate::error::{ScanError, ScanResult};

/// Shipped default configuration, keyed by path relative to the config root.
pub const DEFAULTS: &str = include_str!("../config/defaults.json");

/// SHA-256 of [`DEFAULTS`] with all whitespace removed.
pub const DEFAULTS_SHA256: &str = "6b19a8acc80ed11a6a90da2dc51c40bb44dc8c9d4dd55598b42dcbfec3b75b04";

const GLOBAL_STEM: &str = "global";
const LAYOUT_DIR: &str = "layout";

/// Hex SHA-256 of `text` after stripping every whitespace character.
pub fn baseline_checksum(text: &str) -> String {
    let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let digest = Sha256::digest(cleaned.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn verify_baseline(name: &str, text: &str, expected: &str) -> ScanResult<()> {
    let actual = baseline_checksum(text);
    if actual != expected {
        return Err(ScanError::ChecksumMismatch {
            name: name.to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

/// Deserialize a JSON or TOML config file, chosen by extension.
pub fn read_config<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&text).with_context(|| format!("parsing config toml {}", path.display())),
        _ => serde_json::from_str(&text).with_context(|| format!("parsing config json {}", path.display())),
    }
}

/// `<dir>/<stem>.json`, else `<dir>/<stem>.toml`.
fn find_config_file(dir: &Path, stem: &str) -> Option<PathBuf> {
    ["json", "toml"]
        .iter()
        .map(|ext| dir.join(format!("{}.{}", stem, ext)))
        .find(|p| p.is_file())
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// A config directory holding `global.{json,toml}` and `layout/<name>.{json,toml}`.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    root: PathBuf,
}

impl ConfigStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The explicit directory if given, else `<config dir>/vidscan` when it
    /// exists, else `./config`.
    pub fn locate(explicit: Option<&Path>) -> Self {
        if let Some(dir) = explicit {
            return Self::new(dir);
        }
        if let Some(mut d) = dirs::config_dir() {
            d.push("vidscan");
            if d.is_dir() {
                return Self::new(d);
            }
        }
        Self::new("config")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Verify the embedded baseline and write any of its files that are
    /// missing. Returns the files created.
    pub fn ensure_defaults(&self) -> Result<Vec<PathBuf>> {
        verify_baseline("config/defaults.json", DEFAULTS, DEFAULTS_SHA256)?;
        let baseline: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(DEFAULTS).context("parsing embedded default config")?;

        let mut created = Vec::new();
        for (name, value) in baseline.iter().filter(|(k, _)| !k.starts_with('_')) {
            let target = self.root.join(name);
            let toml_twin = target.with_extension("toml");
            if target.exists() || toml_twin.exists() {
                continue;
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
            }
            let text = serde_json::to_string_pretty(value).context("serializing default config")?;
            fs::write(&target, text + "\n").with_context(|| format!("writing {}", target.display()))?;
            warn!(
                "Created default configuration file: {}. Please review and modify its content.",
                target.display()
            );
            created.push(target);
        }
        Ok(created)
    }

    /// Names of every layout in the layout directory, sorted.
    pub fn layout_names(&self) -> Vec<String> {
        let mut names: Vec<String> = WalkDir::new(self.root.join(LAYOUT_DIR))
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| matches!(p.extension().and_then(|e| e.to_str()), Some("json" | "toml")))
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn load_global(&self) -> Result<GlobalConfig> {
        let path = find_config_file(&self.root, GLOBAL_STEM)
            .ok_or_else(|| anyhow!("Config file not found: {}", self.root.join("global.json").display()))?;
        debug!("loading global config from {}", path.display());
        let mut global: GlobalConfig = read_config(&path)?;

        for font in &mut global.fonts {
            font.path = resolve(&self.root, &font.path);
        }
        if let Some(logo) = global.logo_file.take() {
            global.logo_file = Some(resolve(&self.root, &logo));
        }
        Ok(global)
    }

    pub fn load_layout(&self, name: &str) -> Result<LayoutConfig> {
        let dir = self.root.join(LAYOUT_DIR);
        let path = find_config_file(&dir, name).ok_or_else(|| {
            anyhow!(
                "Layout '{}' not found in {} (available: {})",
                name,
                dir.display(),
                self.layout_names().join(", ")
            )
        })?;
        debug!("loading layout from {}", path.display());
        read_config(&path)
    }

    /// Materialize defaults, load, validate content and check referenced files.
    pub fn load(&self, layout_name: &str) -> Result<ScanConfig> {
        self.ensure_defaults()?;
        let global = self.load_global()?;
        let layout = self.load_layout(layout_name)?;
        let config = ScanConfig::new(global, layout).context("Config validation failed")?;
        config.check_files()?;
        info!("Configuration loaded successfully from layout: {}", layout_name);
        Ok(config)
    }
}
