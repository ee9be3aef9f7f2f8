//! Per-owner preference engine, reconciled against server policy.

use std::sync::Arc;

use jid::BareJid;
use tracing::{debug, instrument};

use rookery_core::{ArchiveError, Preset, Settings, StoreMethod, StoreMucMessages};

use crate::repository::MessageArchive;

/// Server-mandated archiving policy, looked up per domain.
///
/// Injected into the preference engine at construction; the static
/// implementation lives in [`crate::config::PolicyConfig`].
pub trait ServerPolicy: Send + Sync {
    /// Minimum store method the server enforces. Anything other than
    /// [`StoreMethod::False`] means owners cannot disable archiving.
    fn required_store_method(&self, domain: &str) -> StoreMethod;

    /// Server stance on archiving group-chat messages.
    fn store_muc_messages(&self, domain: &str) -> StoreMucMessages;
}

/// Validates and persists preference transitions for one repository.
///
/// Updates are read-modify-write without a version token: concurrent
/// updates for the same owner are last-writer-wins.
pub struct PreferenceEngine<R: MessageArchive> {
    repo: Arc<R>,
    policy: Arc<dyn ServerPolicy>,
}

impl<R: MessageArchive> PreferenceEngine<R> {
    pub fn new(repo: Arc<R>, policy: Arc<dyn ServerPolicy>) -> Self {
        Self { repo, policy }
    }

    /// Last persisted settings, or the documented default (auto-archive
    /// on, no roster restriction) when the owner never stored any.
    pub async fn get_settings(&self, owner: &BareJid) -> Result<Settings, ArchiveError> {
        Ok(self.repo.load_settings(owner).await?.unwrap_or_default())
    }

    /// Apply a named preset, enforcing server policy first.
    #[instrument(skip(self), fields(owner = %owner, preset = preset_name))]
    pub async fn update_settings(
        &self,
        owner: &BareJid,
        preset_name: &str,
    ) -> Result<Settings, ArchiveError> {
        let preset: Preset = preset_name.parse()?;
        let domain = owner.domain().as_str();

        // Every successful update clears per-owner group-chat
        // archiving, so a server that forces it rejects all updates.
        if self.policy.store_muc_messages(domain) == StoreMucMessages::True {
            return Err(ArchiveError::PolicyViolation(
                "server configuration forces automatic archiving of group-chat messages".into(),
            ));
        }

        let required = self.policy.required_store_method(domain);
        let mut settings = self.get_settings(owner).await?;

        match preset {
            Preset::Always => {
                settings.auto = true;
                settings.roster_only = false;
            }
            Preset::Never => {
                if required != StoreMethod::False {
                    return Err(ArchiveError::PolicyViolation(
                        "server configuration does not allow disabling message archiving".into(),
                    ));
                }
                settings.auto = false;
                settings.roster_only = false;
            }
            Preset::Roster => {
                if required != StoreMethod::False {
                    return Err(ArchiveError::PolicyViolation(
                        "server configuration does not allow disabling message archiving".into(),
                    ));
                }
                settings.auto = true;
                settings.roster_only = true;
            }
        }

        settings.store_method = StoreMethod::Message;
        settings.archive_muc = false;

        self.repo.store_settings(owner, &settings).await?;
        debug!(preset = %preset, "preferences updated");

        Ok(settings)
    }

    /// Write-path decision: should a message for this owner be
    /// archived at all?
    ///
    /// A forced store method archives regardless of preference.
    /// Group-chat archiving follows server policy; only the `User`
    /// stance consults the owner's auto-archive flag.
    pub async fn should_archive(
        &self,
        owner: &BareJid,
        is_groupchat: bool,
        peer_in_roster: bool,
    ) -> Result<bool, ArchiveError> {
        let domain = owner.domain().as_str();

        if is_groupchat {
            return match self.policy.store_muc_messages(domain) {
                StoreMucMessages::True => Ok(true),
                StoreMucMessages::False => Ok(false),
                StoreMucMessages::User => {
                    let settings = self.get_settings(owner).await?;
                    Ok(settings.auto)
                }
            };
        }

        if self.policy.required_store_method(domain) != StoreMethod::False {
            return Ok(true);
        }

        let settings = self.get_settings(owner).await?;
        Ok(settings.auto && (!settings.roster_only || peer_in_roster))
    }
}
