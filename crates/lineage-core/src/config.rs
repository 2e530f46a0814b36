use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use crate::dag::replay::MergePolicy;

/// Environment variable overriding [`ReplayConfig::merge_policy`].
pub const ENV_MERGE_POLICY: &str = "LINEAGE_MERGE_POLICY";
/// Environment variable overriding [`HashConfig::float_decimals`].
pub const ENV_FLOAT_DECIMALS: &str = "LINEAGE_FLOAT_DECIMALS";
/// Environment variable overriding [`EventLogConfig::max_append_retries`].
pub const ENV_MAX_APPEND_RETRIES: &str = "LINEAGE_MAX_APPEND_RETRIES";

/// Largest accepted [`HashConfig::float_decimals`]. Seventeen places already
/// exceed what an `f32` can distinguish.
pub const MAX_FLOAT_DECIMALS: u32 = 17;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub hash: HashConfig,
    #[serde(default)]
    pub event_log: EventLogConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
}

/// Numeric formatting policy for embedding values in content hashes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashConfig {
    /// Render every embedding component with this many fixed decimal places.
    ///
    /// `None` keeps the shortest representation that round-trips the `f32`.
    #[serde(default)]
    pub float_decimals: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLogConfig {
    #[serde(default = "default_max_append_retries")]
    pub max_append_retries: u32,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            max_append_retries: default_max_append_retries(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayConfig {
    #[serde(default)]
    pub merge_policy: MergePolicy,
}

/// Load engine config from a TOML file.
///
/// A missing file yields the defaults; a present but malformed file is an
/// error.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        return Ok(EngineConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let config = toml::from_str::<EngineConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    validate(&config).with_context(|| format!("Invalid {}", path.display()))?;
    tracing::info!(path = %path.display(), "loaded lineage config");
    Ok(config)
}

/// Load config from `path` and apply `LINEAGE_*` environment overrides.
pub fn resolve_config(path: &Path) -> Result<EngineConfig> {
    let config = load_config(path)?;
    apply_overrides(config, |key| env::var(key).ok())
}

/// Apply overrides looked up through `lookup`.
///
/// Split from [`resolve_config`] so the override rules can be exercised
/// without touching the process environment.
pub fn apply_overrides<F>(mut config: EngineConfig, lookup: F) -> Result<EngineConfig>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(ENV_MERGE_POLICY) {
        config.replay.merge_policy = parse_merge_policy(&raw)
            .with_context(|| format!("Invalid {ENV_MERGE_POLICY}"))?;
    }

    if let Some(raw) = lookup(ENV_FLOAT_DECIMALS) {
        let trimmed = raw.trim();
        config.hash.float_decimals = if trimmed.is_empty() || trimmed == "shortest" {
            None
        } else {
            Some(
                trimmed
                    .parse()
                    .with_context(|| format!("Invalid {ENV_FLOAT_DECIMALS}: {raw}"))?,
            )
        };
    }

    if let Some(raw) = lookup(ENV_MAX_APPEND_RETRIES) {
        config.event_log.max_append_retries = raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {ENV_MAX_APPEND_RETRIES}: {raw}"))?;
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &EngineConfig) -> Result<()> {
    if let Some(places) = config
        .hash
        .float_decimals
        .filter(|places| *places > MAX_FLOAT_DECIMALS)
    {
        bail!("float_decimals = {places} exceeds the maximum of {MAX_FLOAT_DECIMALS}");
    }
    Ok(())
}

fn parse_merge_policy(raw: &str) -> Result<MergePolicy> {
    match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
        "latest_edge" | "latest" => Ok(MergePolicy::LatestEdge),
        "earliest_edge" | "earliest" => Ok(MergePolicy::EarliestEdge),
        other => bail!("unknown merge policy '{other}': expected latest_edge or earliest_edge"),
    }
}

const fn default_max_append_retries() -> u32 {
    3
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("temp dir must be created");
        let config = load_config(&dir.path().join("lineage.toml")).expect("defaults");
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.event_log.max_append_retries, 3);
        assert_eq!(config.replay.merge_policy, MergePolicy::LatestEdge);
        assert_eq!(config.hash.float_decimals, None);
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempfile::tempdir().expect("temp dir must be created");
        let path = dir.path().join("lineage.toml");
        std::fs::write(&path, "[replay]\nmerge_policy = \"earliest_edge\"\n")
            .expect("config written");

        let config = load_config(&path).expect("config parses");
        assert_eq!(config.replay.merge_policy, MergePolicy::EarliestEdge);
        assert_eq!(config.event_log, EventLogConfig::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir must be created");
        let path = dir.path().join("lineage.toml");
        std::fs::write(&path, "[hash\nfloat_decimals = ").expect("config written");

        let err = load_config(&path).expect_err("malformed toml");
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn overrides_replace_file_values() {
        let lookup = lookup_from(&[
            (ENV_MERGE_POLICY, "earliest"),
            (ENV_FLOAT_DECIMALS, "6"),
            (ENV_MAX_APPEND_RETRIES, " 10 "),
        ]);
        let config = apply_overrides(EngineConfig::default(), lookup).expect("overrides");
        assert_eq!(config.replay.merge_policy, MergePolicy::EarliestEdge);
        assert_eq!(config.hash.float_decimals, Some(6));
        assert_eq!(config.event_log.max_append_retries, 10);
    }

    #[test]
    fn shortest_resets_float_decimals() {
        let mut base = EngineConfig::default();
        base.hash.float_decimals = Some(4);
        let config = apply_overrides(base, lookup_from(&[(ENV_FLOAT_DECIMALS, "shortest")]))
            .expect("overrides");
        assert_eq!(config.hash.float_decimals, None);
    }

    #[test]
    fn bad_override_is_rejected() {
        let err = apply_overrides(
            EngineConfig::default(),
            lookup_from(&[(ENV_MERGE_POLICY, "random")]),
        )
        .expect_err("unknown policy");
        assert!(format!("{err:#}").contains("unknown merge policy"));

        assert!(
            apply_overrides(
                EngineConfig::default(),
                lookup_from(&[(ENV_MAX_APPEND_RETRIES, "-1")]),
            )
            .is_err()
        );
    }

    #[test]
    fn oversized_float_decimals_are_rejected() {
        let err = apply_overrides(
            EngineConfig::default(),
            lookup_from(&[(ENV_FLOAT_DECIMALS, "4000000000")]),
        )
        .expect_err("too many decimals");
        assert!(format!("{err:#}").contains("exceeds the maximum"));

        let config = apply_overrides(
            EngineConfig::default(),
            lookup_from(&[(ENV_FLOAT_DECIMALS, "17")]),
        )
        .expect("limit itself is accepted");
        assert_eq!(config.hash.float_decimals, Some(MAX_FLOAT_DECIMALS));

        let dir = tempfile::tempdir().expect("temp dir must be created");
        let path = dir.path().join("lineage.toml");
        std::fs::write(&path, "[hash]\nfloat_decimals = 100\n").expect("config written");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn defaults_round_trip_through_toml() {
        let config = EngineConfig::default();
        let text = toml::to_string(&config).expect("serialize");
        let back: EngineConfig = toml::from_str(&text).expect("parse");
        assert_eq!(back, config);
    }
}
