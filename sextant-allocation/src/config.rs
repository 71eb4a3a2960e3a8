//! Allocator configuration
//!
//! Settings are read from a flat, hierarchical key-value bag. Node-level
//! keys live under `gateway.*` (with legacy `gateway.local.*` aliases kept
//! for older deployments); index-level keys live under `index.*` and
//! override the node-level value where both exist.

use crate::routing::IndexMetadata;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// Timeout for the node-listing fan-out
pub const LIST_TIMEOUT: &str = "gateway.list_timeout";
/// Legacy alias for [`LIST_TIMEOUT`]
pub const LIST_TIMEOUT_LEGACY: &str = "gateway.local.list_timeout";
/// Default quorum mode for primary allocation
pub const INITIAL_SHARDS: &str = "gateway.initial_shards";
/// Legacy alias for [`INITIAL_SHARDS`]
pub const INITIAL_SHARDS_LEGACY: &str = "gateway.local.initial_shards";
/// Per-index quorum mode override
pub const INDEX_INITIAL_SHARDS: &str = "index.recovery.initial_shards";
/// The index lives on a filesystem every data node can see
pub const INDEX_SHARED_FILESYSTEM: &str = "index.shared_filesystem";
/// On a shared filesystem, recover the primary on any node
pub const INDEX_SHARED_FS_RECOVER_ANY: &str = "index.shared_filesystem.recover_on_any_node";

const DEFAULT_LIST_TIMEOUT_SECS: u64 = 30;

/// Flat key-value settings bag
///
/// Lookups are string-keyed; typed accessors take a slice of keys and
/// resolve first-found-wins, so a current key can shadow its legacy alias.
/// Unparseable values fall back to the supplied default with a warning,
/// never an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings(HashMap<String, String>);

impl Settings {
    /// Create an empty settings bag
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly for tests and embedded setups
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Get a raw value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|s| s.as_str())
    }

    /// Get the first value found among `keys`
    pub fn get_first(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.get(key))
    }

    /// Get a boolean, first-found-wins among `keys`
    pub fn bool_first(&self, keys: &[&str], default: bool) -> bool {
        match self.get_first(keys) {
            None => default,
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "true" => true,
                "false" => false,
                other => {
                    warn!(
                        "Ignoring unparseable boolean setting {:?} for {:?}, using {}",
                        other, keys, default
                    );
                    default
                }
            },
        }
    }

    /// Get a duration in whole seconds, first-found-wins among `keys`
    pub fn secs_first(&self, keys: &[&str], default: Duration) -> Duration {
        match self.get_first(keys) {
            None => default,
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) => Duration::from_secs(secs),
                Err(_) => {
                    warn!(
                        "Ignoring unparseable duration setting {:?} for {:?}, using {:?}",
                        raw, keys, default
                    );
                    default
                }
            },
        }
    }
}

/// How many on-disk copies of a shard must be discoverable before its
/// primary is allocated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialShards {
    /// Majority of copies (`quorum`)
    Quorum,
    /// Majority minus one (`quorum-1`, `half`)
    QuorumMinusOne,
    /// A single copy (`one`)
    One,
    /// Every copy (`full`, `all`)
    Full,
    /// Every copy minus one (`full-1`, `all-1`)
    FullMinusOne,
    /// An explicit copy count
    Exact(usize),
}

impl InitialShards {
    /// Parse a setting value. Returns `None` for unrecognized values; the
    /// caller decides the fallback (and logs it).
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "quorum" => Some(InitialShards::Quorum),
            "quorum-1" | "half" => Some(InitialShards::QuorumMinusOne),
            "one" => Some(InitialShards::One),
            "full" | "all" => Some(InitialShards::Full),
            "full-1" | "all-1" => Some(InitialShards::FullMinusOne),
            other => other.parse::<usize>().ok().map(InitialShards::Exact),
        }
    }

    /// Number of discovered on-disk copies required before the primary may
    /// be allocated, given the index's configured replica count.
    pub fn required_copies(&self, replicas: u32) -> usize {
        let replicas = replicas as usize;
        match self {
            InitialShards::Quorum => {
                if replicas + 1 >= 3 {
                    (1 + replicas) / 2 + 1
                } else {
                    1
                }
            }
            InitialShards::QuorumMinusOne => {
                if replicas >= 3 {
                    (1 + replicas) / 2
                } else {
                    1
                }
            }
            InitialShards::One => 1,
            InitialShards::Full => replicas + 1,
            InitialShards::FullMinusOne => {
                if replicas >= 2 {
                    replicas
                } else {
                    1
                }
            }
            InitialShards::Exact(count) => *count,
        }
    }
}

/// Resolved node-level allocator settings
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Hard bound on the node-listing fan-out
    pub list_timeout: Duration,
    /// Node-level default quorum mode
    pub initial_shards: InitialShards,
}

impl GatewaySettings {
    /// Resolve from a node-level settings bag
    pub fn from_settings(settings: &Settings) -> Self {
        let list_timeout = settings.secs_first(
            &[LIST_TIMEOUT, LIST_TIMEOUT_LEGACY],
            Duration::from_secs(DEFAULT_LIST_TIMEOUT_SECS),
        );
        let initial_shards = match settings.get_first(&[INITIAL_SHARDS, INITIAL_SHARDS_LEGACY]) {
            None => InitialShards::Quorum,
            Some(raw) => InitialShards::parse(raw).unwrap_or_else(|| {
                warn!(
                    "Ignoring unparseable {} value {:?}, requiring a single copy",
                    INITIAL_SHARDS, raw
                );
                InitialShards::One
            }),
        };
        Self {
            list_timeout,
            initial_shards,
        }
    }

    /// Quorum mode for a specific index: the index-level override wins over
    /// the node-level default.
    pub fn initial_shards_for(&self, index: &IndexMetadata) -> InitialShards {
        match index.settings.get(INDEX_INITIAL_SHARDS) {
            None => self.initial_shards,
            Some(raw) => InitialShards::parse(raw).unwrap_or_else(|| {
                warn!(
                    "Ignoring unparseable {} value {:?}, requiring a single copy",
                    INDEX_INITIAL_SHARDS, raw
                );
                InitialShards::One
            }),
        }
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self::from_settings(&Settings::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_settings_first_found_wins() {
        let settings = Settings::new()
            .with(LIST_TIMEOUT_LEGACY, "10")
            .with(LIST_TIMEOUT, "5");
        assert_eq!(
            settings.secs_first(
                &[LIST_TIMEOUT, LIST_TIMEOUT_LEGACY],
                Duration::from_secs(30)
            ),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_settings_legacy_alias_fallback() {
        let settings = Settings::new().with(LIST_TIMEOUT_LEGACY, "10");
        assert_eq!(
            settings.secs_first(
                &[LIST_TIMEOUT, LIST_TIMEOUT_LEGACY],
                Duration::from_secs(30)
            ),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_settings_defaults_on_garbage() {
        let settings = Settings::new()
            .with(LIST_TIMEOUT, "soon")
            .with(INDEX_SHARED_FILESYSTEM, "yes-please");
        assert_eq!(
            settings.secs_first(&[LIST_TIMEOUT], Duration::from_secs(30)),
            Duration::from_secs(30)
        );
        assert!(!settings.bool_first(&[INDEX_SHARED_FILESYSTEM], false));
    }

    #[test]
    fn test_settings_from_json() {
        let settings: Settings = serde_json::from_value(serde_json::json!({
            "gateway.initial_shards": "full",
            "gateway.list_timeout": "15",
        }))
        .unwrap();
        let gateway = GatewaySettings::from_settings(&settings);
        assert_eq!(gateway.initial_shards, InitialShards::Full);
        assert_eq!(gateway.list_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_initial_shards_parse() {
        assert_eq!(InitialShards::parse("quorum"), Some(InitialShards::Quorum));
        assert_eq!(
            InitialShards::parse("quorum-1"),
            Some(InitialShards::QuorumMinusOne)
        );
        assert_eq!(
            InitialShards::parse("half"),
            Some(InitialShards::QuorumMinusOne)
        );
        assert_eq!(InitialShards::parse("one"), Some(InitialShards::One));
        assert_eq!(InitialShards::parse("full"), Some(InitialShards::Full));
        assert_eq!(InitialShards::parse("all"), Some(InitialShards::Full));
        assert_eq!(
            InitialShards::parse("full-1"),
            Some(InitialShards::FullMinusOne)
        );
        assert_eq!(
            InitialShards::parse("all-1"),
            Some(InitialShards::FullMinusOne)
        );
        assert_eq!(InitialShards::parse("3"), Some(InitialShards::Exact(3)));
        assert_eq!(InitialShards::parse("most of them"), None);
    }

    #[test]
    fn test_required_copies_quorum() {
        // One primary plus one replica is too small for a meaningful quorum
        assert_eq!(InitialShards::Quorum.required_copies(0), 1);
        assert_eq!(InitialShards::Quorum.required_copies(1), 1);
        assert_eq!(InitialShards::Quorum.required_copies(2), 2);
        assert_eq!(InitialShards::Quorum.required_copies(3), 3);
        assert_eq!(InitialShards::Quorum.required_copies(4), 3);
    }

    #[test]
    fn test_required_copies_quorum_minus_one() {
        assert_eq!(InitialShards::QuorumMinusOne.required_copies(2), 1);
        assert_eq!(InitialShards::QuorumMinusOne.required_copies(3), 2);
        assert_eq!(InitialShards::QuorumMinusOne.required_copies(5), 3);
    }

    #[test]
    fn test_required_copies_full_variants() {
        assert_eq!(InitialShards::Full.required_copies(0), 1);
        assert_eq!(InitialShards::Full.required_copies(2), 3);
        assert_eq!(InitialShards::FullMinusOne.required_copies(1), 1);
        assert_eq!(InitialShards::FullMinusOne.required_copies(2), 2);
        assert_eq!(InitialShards::FullMinusOne.required_copies(4), 4);
    }

    #[test]
    fn test_gateway_settings_defaults() {
        let gateway = GatewaySettings::default();
        assert_eq!(gateway.list_timeout, Duration::from_secs(30));
        assert_eq!(gateway.initial_shards, InitialShards::Quorum);
    }

    #[test]
    fn test_gateway_settings_unparseable_initial_shards() {
        let settings = Settings::new().with(INITIAL_SHARDS, "plenty");
        let gateway = GatewaySettings::from_settings(&settings);
        assert_eq!(gateway.initial_shards, InitialShards::One);
    }

    #[test]
    fn test_index_override_wins() {
        let gateway = GatewaySettings::from_settings(
            &Settings::new().with(INITIAL_SHARDS, "full"),
        );
        let index = IndexMetadata::new(2)
            .with_settings(Settings::new().with(INDEX_INITIAL_SHARDS, "one"));
        assert_eq!(gateway.initial_shards_for(&index), InitialShards::One);

        let plain = IndexMetadata::new(2);
        assert_eq!(gateway.initial_shards_for(&plain), InitialShards::Full);
    }

    proptest! {
        #[test]
        fn prop_integer_values_parse_exact(count in 0usize..1024) {
            let parsed = InitialShards::parse(&count.to_string());
            prop_assert_eq!(parsed, Some(InitialShards::Exact(count)));
        }

        #[test]
        fn prop_required_copies_within_copy_count(replicas in 0u32..64) {
            for mode in [
                InitialShards::Quorum,
                InitialShards::QuorumMinusOne,
                InitialShards::One,
                InitialShards::Full,
                InitialShards::FullMinusOne,
            ] {
                let required = mode.required_copies(replicas);
                prop_assert!(required >= 1);
                prop_assert!(required <= replicas as usize + 1);
            }
        }
    }
}
