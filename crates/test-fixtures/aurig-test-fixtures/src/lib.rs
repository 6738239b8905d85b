//! Named JSON fixtures shared by aurig tests and benches.
//!
//! `fixtures/manifest.json` maps fixture names to paths relative to the
//! workspace `fixtures/` directory.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Deserialize;

static MANIFEST: Lazy<Result<Manifest, String>> = Lazy::new(|| {
    let raw = include_str!("../../../../fixtures/manifest.json");
    serde_json::from_str(raw).map_err(|e| format!("fixtures manifest should parse: {e}"))
});

#[derive(Debug, Deserialize)]
struct Manifest {
    profiles: HashMap<String, String>,
    curves: HashMap<String, CurveEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CurveEntry {
    Path(String),
    Detailed {
        path: String,
        #[serde(default)]
        profile: Option<String>,
    },
}

impl CurveEntry {
    fn as_path(&self) -> &str {
        match self {
            CurveEntry::Path(path) => path,
            CurveEntry::Detailed { path, .. } => path,
        }
    }

    fn profile(&self) -> Option<&str> {
        match self {
            CurveEntry::Path(_) => None,
            CurveEntry::Detailed { profile, .. } => profile.as_deref(),
        }
    }
}

fn manifest() -> Result<&'static Manifest> {
    MANIFEST.as_ref().map_err(|e| anyhow!(e.clone()))
}

fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures")
}

fn resolve_path(rel: &str) -> PathBuf {
    fixtures_root().join(rel)
}

fn read_to_string(rel: &str) -> Result<String> {
    let path = resolve_path(rel);
    fs::read_to_string(&path)
        .with_context(|| format!("failed to read fixture at {}", path.display()))
}

fn load_json<T: DeserializeOwned>(rel: &str) -> Result<T> {
    let text = read_to_string(rel)?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse JSON fixture {rel}"))
}

fn lookup<'a, T>(map: &'a HashMap<String, T>, kind: &str, name: &str) -> Result<&'a T> {
    map.get(name)
        .ok_or_else(|| anyhow!("unknown {kind} fixture '{name}'"))
}

fn sorted_keys<T>(map: &HashMap<String, T>) -> Vec<String> {
    let mut keys: Vec<String> = map.keys().cloned().collect();
    keys.sort();
    keys
}

/// Mapping profiles.
pub mod profiles {
    use super::*;

    pub fn keys() -> Result<Vec<String>> {
        Ok(sorted_keys(&manifest()?.profiles))
    }

    pub fn json(name: &str) -> Result<String> {
        let rel = lookup(&manifest()?.profiles, "profile", name)?;
        read_to_string(rel)
    }

    pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
        let rel = lookup(&manifest()?.profiles, "profile", name)?;
        super::load_json(rel)
    }

    pub fn path(name: &str) -> Result<PathBuf> {
        let rel = lookup(&manifest()?.profiles, "profile", name)?;
        Ok(resolve_path(rel))
    }
}

/// Sparse curve sets, optionally tagged with the profile they were authored for.
pub mod curves {
    use super::*;

    pub fn keys() -> Result<Vec<String>> {
        Ok(sorted_keys(&manifest()?.curves))
    }

    pub fn json(name: &str) -> Result<String> {
        let entry = lookup(&manifest()?.curves, "curve set", name)?;
        read_to_string(entry.as_path())
    }

    pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
        let entry = lookup(&manifest()?.curves, "curve set", name)?;
        super::load_json(entry.as_path())
    }

    /// Profile fixture name the curve set targets, if recorded.
    pub fn profile(name: &str) -> Result<Option<String>> {
        let entry = lookup(&manifest()?.curves, "curve set", name)?;
        Ok(entry.profile().map(str::to_string))
    }

    pub fn path(name: &str) -> Result<PathBuf> {
        let entry = lookup(&manifest()?.curves, "curve set", name)?;
        Ok(resolve_path(entry.as_path()))
    }
}
