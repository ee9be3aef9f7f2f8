//! Engine configuration.
//!
//! Plain serde structs; the host loads them from its own TOML config
//! file and hands them to the factory, archiver and preference engine.

use std::path::PathBuf;

use chrono::Duration;
use serde::Deserialize;

use rookery_core::{StoreMethod, StoreMucMessages};

use crate::prefs::ServerPolicy;

/// Top-level archive engine configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Directory holding one database file per domain. `None` keeps
    /// every store in memory.
    pub data_dir: Option<PathBuf>,
    /// Extract tags from message bodies on the write path.
    pub tag_support: bool,
    pub policy: PolicyConfig,
    /// Items older than this many days are eligible for expiry sweeps.
    pub retention_days: Option<u32>,
}

impl ArchiveConfig {
    pub fn retention_period(&self) -> Option<Duration> {
        self.retention_days.map(|days| Duration::days(i64::from(days)))
    }
}

/// Server-mandated policy, uniform across domains.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub required_store_method: StoreMethod,
    pub store_muc_messages: StoreMucMessages,
}

impl ServerPolicy for PolicyConfig {
    fn required_store_method(&self, _domain: &str) -> StoreMethod {
        self.required_store_method
    }

    fn store_muc_messages(&self, _domain: &str) -> StoreMucMessages {
        self.store_muc_messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_leave_archiving_to_owners() {
        let config = ArchiveConfig::default();
        assert!(config.data_dir.is_none());
        assert!(!config.tag_support);
        assert!(config.retention_period().is_none());
        assert_eq!(config.policy.required_store_method("any"), StoreMethod::False);
        assert_eq!(config.policy.store_muc_messages("any"), StoreMucMessages::User);
    }

    #[test]
    fn parses_from_toml() {
        let config: ArchiveConfig = toml::from_str(
            r#"
            data_dir = "/var/lib/rookery"
            tag_support = true
            retention_days = 30

            [policy]
            required_store_method = "message"
            store_muc_messages = "true"
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir.as_deref(), Some(std::path::Path::new("/var/lib/rookery")));
        assert!(config.tag_support);
        assert_eq!(config.retention_period(), Some(Duration::days(30)));
        assert_eq!(
            config.policy.required_store_method("example.com"),
            StoreMethod::Message
        );
        assert_eq!(
            config.policy.store_muc_messages("example.com"),
            StoreMucMessages::True
        );
    }
}
