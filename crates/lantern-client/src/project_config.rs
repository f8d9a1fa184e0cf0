//! `lantern.yaml` project configuration.
//!
//! Resolution order for every setting: CLI flag, then `lantern.yaml`, then
//! the built-in default.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::cli::CliArgs;

pub const CONFIG_FILE: &str = "lantern.yaml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub default_scene: Option<String>,
    #[serde(default)]
    pub default_graph: Option<String>,
    #[serde(default)]
    pub window: WindowConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_vsync")]
    pub vsync: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            width: default_width(),
            height: default_height(),
            vsync: default_vsync(),
        }
    }
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_title() -> String {
    "Lantern".to_string()
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn default_vsync() -> bool {
    true
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse lantern.yaml: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("no {what} given on the command line or in lantern.yaml")]
    Missing { what: &'static str },
}

/// Walk up from `start_dir` looking for `lantern.yaml`.
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    let mut dir = start_dir.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE);
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

pub fn load_config(path: &Path) -> Result<ProjectConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_yaml::from_str(&contents)?)
}

/// Everything the engine needs to start, with paths made absolute.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchSettings {
    pub project_root: PathBuf,
    pub scene: PathBuf,
    pub graph: PathBuf,
    pub window: WindowConfig,
}

/// Merge CLI flags over the project config found from `cwd`.
pub fn resolve(args: &CliArgs, cwd: &Path) -> Result<LaunchSettings, ConfigError> {
    let (root, config) = match &args.project {
        Some(project) => {
            let root = cwd.join(project);
            let config_path = root.join(CONFIG_FILE);
            let config = if config_path.exists() {
                Some(load_config(&config_path)?)
            } else {
                None
            };
            (root, config)
        }
        None => match find_config(cwd) {
            Some(config_path) => {
                let config = load_config(&config_path)?;
                let root = config_path
                    .parent()
                    .map_or_else(|| cwd.to_path_buf(), Path::to_path_buf);
                (root, Some(config))
            }
            None => (cwd.to_path_buf(), None),
        },
    };

    if let Some(config) = &config {
        tracing::info!("Loaded project: {} v{}", config.name, config.version);
    }
    let scene = args
        .scene
        .clone()
        .or_else(|| config.as_ref().and_then(|c| c.default_scene.clone()))
        .ok_or(ConfigError::Missing { what: "scene" })?;
    let graph = args
        .graph
        .clone()
        .or_else(|| config.as_ref().and_then(|c| c.default_graph.clone()))
        .ok_or(ConfigError::Missing { what: "graph" })?;

    Ok(LaunchSettings {
        scene: root.join(scene),
        graph: root.join(graph),
        window: config.map(|c| c.window).unwrap_or_default(),
        project_root: root,
    })
}
