// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Identifies which file introduced a configuration change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConfigLayer {
    Base,
    Site,
    Run,
}

impl ConfigLayer {
    pub fn label(self) -> &'static str {
        match self {
            ConfigLayer::Base => "base",
            ConfigLayer::Site => "site",
            ConfigLayer::Run => "run",
        }
    }
}

/// A single leaf that changed while applying a layer.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigDiffEvent {
    pub layer: ConfigLayer,
    /// Dotted path of the leaf, e.g. `interaction.n_emb`.
    pub path: String,
    pub previous: Option<Value>,
    pub current: Option<Value>,
}

/// Collection of configuration layers that are merged in order.
#[derive(Clone, Debug, Default)]
pub struct ConfigLayering {
    pub base: Option<PathBuf>,
    pub site: Option<PathBuf>,
    pub run: Option<PathBuf>,
}

impl ConfigLayering {
    /// Discovers configuration files using the environment and the standard
    /// `~/.spiraltorch` locations. Files that do not exist are ignored.
    pub fn discover() -> Self {
        let root = std::env::var("SPIRAL_CONFIG_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_root());
        Self::discover_in(&root)
    }

    /// Same as [`ConfigLayering::discover`] but rooted at an explicit directory.
    /// Per-layer environment overrides still apply.
    pub fn discover_in(root: &Path) -> Self {
        let pick = |var: &str, file: &str| {
            std::env::var(var)
                .map(PathBuf::from)
                .ok()
                .or_else(|| Some(root.join(file)))
                .and_then(existing_path)
        };
        ConfigLayering {
            base: pick("SPIRAL_CONFIG_BASE", "base.toml"),
            site: pick("SPIRAL_CONFIG_SITE", "site.toml"),
            run: pick("SPIRAL_CONFIG_RUN", "run.json"),
        }
    }

    /// Overrides the base layer path.
    pub fn with_base<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.base = Some(path.into());
        self
    }

    /// Overrides the site layer path.
    pub fn with_site<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.site = Some(path.into());
        self
    }

    /// Overrides the run layer path.
    pub fn with_run<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.run = Some(path.into());
        self
    }
}

fn existing_path(path: PathBuf) -> Option<PathBuf> {
    if path.exists() {
        Some(path)
    } else {
        None
    }
}

fn default_root() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => {
            let config_dir = home.join(".spiraltorch").join("config");
            if config_dir.exists() {
                config_dir
            } else {
                home.join(".spiraltorch")
            }
        }
        None => PathBuf::from("."),
    }
}

/// Result of merging layered configuration files.
#[derive(Clone, Debug)]
pub struct LayeredConfig {
    layering: ConfigLayering,
    value: Value,
    events: Vec<ConfigDiffEvent>,
}

impl LayeredConfig {
    /// Loads the configured layers, merging base → site → run.
    pub fn load(layering: ConfigLayering) -> Result<Self, LayeredConfigError> {
        let mut value = Value::Object(Default::default());
        let mut events = Vec::new();

        if let Some(path) = layering.base.as_ref() {
            if let Some(layer) = load_toml(path)? {
                apply_layer(&mut value, &layer, ConfigLayer::Base, &mut events);
            }
        }
        if let Some(path) = layering.site.as_ref() {
            if let Some(layer) = load_toml(path)? {
                apply_layer(&mut value, &layer, ConfigLayer::Site, &mut events);
            }
        }
        if let Some(path) = layering.run.as_ref() {
            if let Some(layer) = load_json(path)? {
                apply_layer(&mut value, &layer, ConfigLayer::Run, &mut events);
            }
        }

        for event in &events {
            ::tracing::debug!(
                layer = event.layer.label(),
                path = %event.path,
                previous = ?event.previous,
                current = ?event.current,
                "config layer applied"
            );
        }

        Ok(LayeredConfig {
            layering,
            value,
            events,
        })
    }

    /// Wraps an already merged document, e.g. one assembled in memory.
    pub fn from_value(value: Value) -> Self {
        LayeredConfig {
            layering: ConfigLayering::default(),
            value,
            events: Vec::new(),
        }
    }

    /// Returns the merged configuration as a `serde_json::Value`.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Returns the file paths the configuration was loaded from.
    pub fn layering(&self) -> &ConfigLayering {
        &self.layering
    }

    /// Returns the diff events emitted while applying the layers.
    pub fn events(&self) -> &[ConfigDiffEvent] {
        &self.events
    }

    /// Extracts a typed view of a nested configuration section. The path is
    /// expressed as a slice of keys that will be traversed in order.
    pub fn section<T>(&self, path: &[&str]) -> Result<Option<T>, serde_json::Error>
    where
        T: DeserializeOwned,
    {
        let mut node = &self.value;
        for key in path {
            match node {
                Value::Object(map) => match map.get(*key) {
                    Some(value) => node = value,
                    None => return Ok(None),
                },
                _ => return Ok(None),
            }
        }
        serde_json::from_value(node.clone()).map(Some)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LayeredConfigError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse TOML {path:?}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to parse JSON {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn read_layer(path: &Path) -> Result<Option<String>, LayeredConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    fs::read_to_string(path)
        .map(Some)
        .map_err(|source| LayeredConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn load_toml(path: &Path) -> Result<Option<Value>, LayeredConfigError> {
    let Some(text) = read_layer(path)? else {
        return Ok(None);
    };
    let value: toml::Value = toml::from_str(&text).map_err(|source| LayeredConfigError::Toml {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::to_value(value)
        .map(Some)
        .map_err(|source| LayeredConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
}

fn load_json(path: &Path) -> Result<Option<Value>, LayeredConfigError> {
    let Some(text) = read_layer(path)? else {
        return Ok(None);
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| LayeredConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
}

fn apply_layer(
    dest: &mut Value,
    layer: &Value,
    kind: ConfigLayer,
    events: &mut Vec<ConfigDiffEvent>,
) {
    let before = dest.clone();
    merge(dest, layer);
    diff(&before, dest, &mut Vec::new(), kind, events);
}

fn merge(dest: &mut Value, src: &Value) {
    match (dest, src) {
        (Value::Object(dest_map), Value::Object(src_map)) => {
            for (key, value) in src_map {
                match dest_map.get_mut(key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        dest_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (dest_slot, src_value) => {
            *dest_slot = src_value.clone();
        }
    }
}

fn diff(
    before: &Value,
    after: &Value,
    path: &mut Vec<String>,
    layer: ConfigLayer,
    out: &mut Vec<ConfigDiffEvent>,
) {
    if before == after {
        return;
    }

    match (before, after) {
        (Value::Object(before_map), Value::Object(after_map)) => {
            let mut keys: Vec<&String> = before_map.keys().chain(after_map.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                path.push(key.clone());
                let before_child = before_map.get(key).unwrap_or(&Value::Null);
                let after_child = after_map.get(key).unwrap_or(&Value::Null);
                diff(before_child, after_child, path, layer, out);
                path.pop();
            }
        }
        (_, Value::Object(after_map)) => {
            // A scalar (or nothing) was replaced by a table: report each new leaf.
            for (key, child) in after_map {
                path.push(key.clone());
                diff(&Value::Null, child, path, layer, out);
                path.pop();
            }
        }
        _ => {
            let previous = (!before.is_null()).then(|| before.clone());
            let current = (!after.is_null()).then(|| after.clone());
            out.push(ConfigDiffEvent {
                layer,
                path: path.join("."),
                previous,
                current,
            });
        }
    }
}
