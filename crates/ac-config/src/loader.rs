// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::Config;

/// Ordered list of config file locations searched from lowest to highest
/// priority. Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("/etc/agentcore/config.toml"));

    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("agentcore/config.toml"));
    }

    paths.push(PathBuf::from(".agentcore/config.toml"));
    paths.push(PathBuf::from("agentcore.toml"));

    paths
}

/// Load configuration by merging all discovered TOML files.
/// `extra` may supply an explicit path (e.g. a `--config` CLI flag).
pub fn load(extra: Option<&Path>) -> anyhow::Result<Config> {
    let mut merged = toml::Value::Table(toml::map::Map::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let layer: toml::Value = toml::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            merge_toml(&mut merged, layer);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        let text = std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
        let layer: toml::Value =
            toml::from_str(&text).with_context(|| format!("parsing {}", p.display()))?;
        merge_toml(&mut merged, layer);
    }

    let config: Config = if matches!(merged, toml::Value::Table(ref t) if t.is_empty()) {
        Config::default()
    } else {
        merged.try_into().unwrap_or_default()
    };
    Ok(config)
}

/// Deep-merge `src` into `dst`; `src` wins on scalar conflicts.
fn merge_toml(dst: &mut toml::Value, src: toml::Value) {
    match (dst, src) {
        (toml::Value::Table(d), toml::Value::Table(s)) => {
            for (k, v) in s {
                let entry = d.entry(k).or_insert(toml::Value::Table(toml::map::Map::new()));
                merge_toml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn val(s: &str) -> toml::Value {
        toml::from_str(s).unwrap()
    }

    #[test]
    fn merge_scalar_src_wins() {
        let mut dst = val("x = 1");
        let src = val("x = 2");
        merge_toml(&mut dst, src);
        assert_eq!(dst["x"].as_integer(), Some(2));
    }

    #[test]
    fn merge_preserves_keys_not_in_src() {
        let mut dst = val("a = 1\nb = 2");
        let src = val("b = 99");
        merge_toml(&mut dst, src);
        assert_eq!(dst["a"].as_integer(), Some(1));
        assert_eq!(dst["b"].as_integer(), Some(99));
    }

    #[test]
    fn merge_nested_tables() {
        let mut dst = val("[model]\nprovider = \"mock\"\nname = \"a\"");
        let src = val("[model]\nname = \"b\"");
        merge_toml(&mut dst, src);
        assert_eq!(dst["model"]["provider"].as_str(), Some("mock"));
        assert_eq!(dst["model"]["name"].as_str(), Some("b"));
    }

    #[test]
    fn load_returns_error_when_explicit_path_missing() {
        let result = load(Some(Path::new("/tmp/agentcore_nonexistent_config_xyz.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn load_with_no_extra_path_returns_defaults() {
        let cfg = load(None).unwrap();
        assert_eq!(cfg.agent.max_tool_rounds, Config::default().agent.max_tool_rounds);
    }

    #[test]
    fn load_explicit_file_overrides_defaults() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[model]\nprovider = \"anthropic\"\nname = \"test-model\"").unwrap();
        let cfg = load(Some(f.path())).unwrap();
        assert_eq!(cfg.model.name, "test-model");
    }
}
