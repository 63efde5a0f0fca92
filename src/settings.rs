use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::error::{ErrorKind, NodeError};

pub const DEFAULT_CONFIG_PATH: &str = "config/metadata-nodes.toml";
pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const MAX_TIMEOUT_SECS: u64 = 600;

pub const ENV_EXIFTOOL: &str = "METADATA_NODES_EXIFTOOL";
pub const ENV_EXIFTOOL_TIMEOUT_SECS: &str = "METADATA_NODES_EXIFTOOL_TIMEOUT_SECS";
pub const ENV_OUTPUT_DIR: &str = "METADATA_NODES_OUTPUT_DIR";

const EXIFTOOL_CANDIDATES: [&str; 3] = [
    "/usr/local/bin/exiftool",
    "/opt/homebrew/bin/exiftool",
    "/usr/bin/exiftool",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExifToolSettings {
    pub binary: PathBuf,
    pub timeout: Duration,
}

impl Default for ExifToolSettings {
    fn default() -> Self {
        Self {
            binary: default_exiftool_path(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub exiftool: ExifToolSettings,
    pub output_dir: PathBuf,
}

/// One configuration layer; unset fields fall through to the layer below.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SettingsOverlay {
    pub exiftool_path: Option<String>,
    pub exiftool_timeout_secs: Option<u64>,
    pub output_dir: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("failed to read settings '{path}': {message}")]
    ReadFile { path: String, message: String },
    #[error("failed to parse settings JSON '{path}': {message}")]
    ParseJson { path: String, message: String },
    #[error("failed to parse settings TOML '{path}': {message}")]
    ParseToml { path: String, message: String },
    #[error("settings root must be an object")]
    RootMustBeObject,
    #[error("settings field '{field}' has invalid type")]
    InvalidFieldType { field: String },
    #[error("settings field '{field}' must be between 1 and {max}, got {value}")]
    OutOfRange { field: String, value: u64, max: u64 },
}

impl From<SettingsError> for NodeError {
    fn from(error: SettingsError) -> Self {
        NodeError::new(ErrorKind::Config, error.to_string())
    }
}

impl Settings {
    /// Defaults, then the settings file, then the process environment, then `overrides`.
    pub fn resolve(
        root: &Path,
        explicit_config: Option<&str>,
        overrides: &SettingsOverlay,
    ) -> Result<Self, SettingsError> {
        let file = load_settings_file(root, explicit_config)?;
        let env = overlay_from_env(|key| std::env::var(key).ok())?;
        Self::from_layers(root, &[&file, &env, overrides])
    }

    /// Later layers win.
    pub fn from_layers(root: &Path, layers: &[&SettingsOverlay]) -> Result<Self, SettingsError> {
        let merged = layers
            .iter()
            .fold(SettingsOverlay::default(), |acc, layer| merge_overlays(&acc, layer));

        let timeout_secs = merged.exiftool_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if !(1..=MAX_TIMEOUT_SECS).contains(&timeout_secs) {
            return Err(SettingsError::OutOfRange {
                field: String::from("exiftool.timeout_secs"),
                value: timeout_secs,
                max: MAX_TIMEOUT_SECS,
            });
        }

        let binary = merged
            .exiftool_path
            .map(PathBuf::from)
            .unwrap_or_else(default_exiftool_path);
        let output_dir = merged
            .output_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
        let output_dir = if output_dir.is_absolute() {
            output_dir
        } else {
            root.join(output_dir)
        };

        Ok(Self {
            exiftool: ExifToolSettings {
                binary,
                timeout: Duration::from_secs(timeout_secs),
            },
            output_dir,
        })
    }
}

/// First installed candidate, or the conventional location when none is.
pub fn default_exiftool_path() -> PathBuf {
    EXIFTOOL_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
        .unwrap_or_else(|| PathBuf::from(EXIFTOOL_CANDIDATES[0]))
}

pub fn merge_overlays(base: &SettingsOverlay, top: &SettingsOverlay) -> SettingsOverlay {
    SettingsOverlay {
        exiftool_path: top
            .exiftool_path
            .clone()
            .or_else(|| base.exiftool_path.clone()),
        exiftool_timeout_secs: top.exiftool_timeout_secs.or(base.exiftool_timeout_secs),
        output_dir: top.output_dir.clone().or_else(|| base.output_dir.clone()),
    }
}

pub fn load_settings_file(
    root: &Path,
    explicit_path: Option<&str>,
) -> Result<SettingsOverlay, SettingsError> {
    if let Some(path) = explicit_path
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .map(|p| if p.is_absolute() { p } else { root.join(p) })
    {
        if !path.exists() {
            return Err(SettingsError::ReadFile {
                path: path.display().to_string(),
                message: String::from("file does not exist"),
            });
        }
        return load_overlay_by_extension(path.as_path());
    }
    load_optional_overlay_from_toml_path(root.join(DEFAULT_CONFIG_PATH).as_path())
}

/// Reads the `METADATA_NODES_*` variables through `lookup`.
pub fn overlay_from_env<F>(lookup: F) -> Result<SettingsOverlay, SettingsError>
where
    F: Fn(&str) -> Option<String>,
{
    let read = |key: &str| {
        lookup(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    let timeout = match read(ENV_EXIFTOOL_TIMEOUT_SECS) {
        Some(raw) => Some(raw.parse::<u64>().map_err(|_| {
            SettingsError::InvalidFieldType {
                field: String::from(ENV_EXIFTOOL_TIMEOUT_SECS),
            }
        })?),
        None => None,
    };
    Ok(SettingsOverlay {
        exiftool_path: read(ENV_EXIFTOOL),
        exiftool_timeout_secs: timeout,
        output_dir: read(ENV_OUTPUT_DIR),
    })
}

pub fn parse_settings_overlay_json(value: &Value) -> Result<SettingsOverlay, SettingsError> {
    let root = value.as_object().ok_or(SettingsError::RootMustBeObject)?;
    let section = root.get("metadata_nodes").unwrap_or(value);
    let section = section.as_object().ok_or(SettingsError::RootMustBeObject)?;

    let mut out = SettingsOverlay::default();
    if let Some(v) = section.get("output_dir") {
        out.output_dir = Some(parse_string(v, "output_dir")?);
    }
    if let Some(exiftool) = section.get("exiftool") {
        let exiftool = exiftool
            .as_object()
            .ok_or_else(|| SettingsError::InvalidFieldType {
                field: String::from("exiftool"),
            })?;
        if let Some(v) = exiftool.get("path") {
            out.exiftool_path = Some(parse_string(v, "exiftool.path")?);
        }
        if let Some(v) = exiftool.get("timeout_secs") {
            out.exiftool_timeout_secs = Some(parse_u64(v, "exiftool.timeout_secs")?);
        }
    }
    Ok(out)
}

fn load_overlay_by_extension(path: &Path) -> Result<SettingsOverlay, SettingsError> {
    match path
        .extension()
        .and_then(|v| v.to_str())
        .map(|v| v.to_ascii_lowercase())
    {
        Some(ext) if ext == "json" => load_optional_overlay_from_json_path(path),
        _ => load_optional_overlay_from_toml_path(path),
    }
}

fn load_optional_overlay_from_json_path(path: &Path) -> Result<SettingsOverlay, SettingsError> {
    if !path.exists() {
        return Ok(SettingsOverlay::default());
    }
    let raw = read_file(path)?;
    let parsed =
        serde_json::from_str::<Value>(raw.as_str()).map_err(|error| SettingsError::ParseJson {
            path: path.display().to_string(),
            message: error.to_string(),
        })?;
    parse_settings_overlay_json(&parsed)
}

fn load_optional_overlay_from_toml_path(path: &Path) -> Result<SettingsOverlay, SettingsError> {
    if !path.exists() {
        return Ok(SettingsOverlay::default());
    }
    let raw = read_file(path)?;
    let parsed =
        toml::from_str::<toml::Value>(raw.as_str()).map_err(|error| SettingsError::ParseToml {
            path: path.display().to_string(),
            message: error.to_string(),
        })?;
    let json_value = serde_json::to_value(parsed).map_err(|error| SettingsError::ParseToml {
        path: path.display().to_string(),
        message: error.to_string(),
    })?;
    parse_settings_overlay_json(&json_value)
}

fn read_file(path: &Path) -> Result<String, SettingsError> {
    fs::read_to_string(path).map_err(|error| SettingsError::ReadFile {
        path: path.display().to_string(),
        message: error.to_string(),
    })
}

fn parse_string(value: &Value, field: &str) -> Result<String, SettingsError> {
    let parsed = value
        .as_str()
        .map(str::trim)
        .ok_or_else(|| SettingsError::InvalidFieldType {
            field: field.to_string(),
        })?;
    if parsed.is_empty() {
        return Err(SettingsError::InvalidFieldType {
            field: field.to_string(),
        });
    }
    Ok(parsed.to_string())
}

fn parse_u64(value: &Value, field: &str) -> Result<u64, SettingsError> {
    value
        .as_u64()
        .ok_or_else(|| SettingsError::InvalidFieldType {
            field: field.to_string(),
        })
}
