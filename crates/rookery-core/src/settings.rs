//! Per-owner archiving preferences and the server policy vocabulary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ArchiveError;

/// How much of a message the server keeps.
///
/// Ordered from weakest to strongest so a server-mandated minimum can
/// be compared against a preference.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum StoreMethod {
    /// Archiving not required.
    #[default]
    False,
    /// Body text only.
    Body,
    /// Whole messages.
    Message,
    /// Entire stream.
    Stream,
}

impl StoreMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreMethod::False => "false",
            StoreMethod::Body => "body",
            StoreMethod::Message => "message",
            StoreMethod::Stream => "stream",
        }
    }
}

impl FromStr for StoreMethod {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "false" => Ok(StoreMethod::False),
            "body" => Ok(StoreMethod::Body),
            "message" => Ok(StoreMethod::Message),
            "stream" => Ok(StoreMethod::Stream),
            other => Err(ArchiveError::InvalidRequest(format!(
                "unknown store method '{other}'"
            ))),
        }
    }
}

impl fmt::Display for StoreMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server stance on archiving group-chat messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreMucMessages {
    /// Left to the owner's preferences.
    #[default]
    User,
    /// Never archived.
    False,
    /// Always archived, whatever the owner prefers.
    True,
}

/// Named preference bundles exposed to protocol callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Always,
    Never,
    Roster,
}

impl Preset {
    pub fn as_str(self) -> &'static str {
        match self {
            Preset::Always => "always",
            Preset::Never => "never",
            Preset::Roster => "roster",
        }
    }
}

impl FromStr for Preset {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always" => Ok(Preset::Always),
            "never" => Ok(Preset::Never),
            "roster" => Ok(Preset::Roster),
            other => Err(ArchiveError::InvalidRequest(format!(
                "unknown preference preset '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-owner archiving preference state.
///
/// Persisted as an opaque serialized blob keyed by owner;
/// read-modify-write with last-writer-wins semantics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Automatic archiving of the owner's messages.
    pub auto: bool,
    /// Restrict archiving to peers present in the owner's roster.
    pub roster_only: bool,
    pub store_method: StoreMethod,
    /// Per-owner group-chat archiving. Cleared on every preference
    /// update; group-chat archiving is governed by server policy.
    pub archive_muc: bool,
}

impl Default for Settings {
    /// State reported before the owner ever stored preferences:
    /// auto-archiving on, no roster restriction.
    fn default() -> Self {
        Self {
            auto: true,
            roster_only: false,
            store_method: StoreMethod::Message,
            archive_muc: false,
        }
    }
}

impl Settings {
    /// The preset these settings present as.
    pub fn preset(&self) -> Preset {
        if !self.auto {
            Preset::Never
        } else if self.roster_only {
            Preset::Roster
        } else {
            Preset::Always
        }
    }

    pub fn to_blob(&self) -> Result<String, ArchiveError> {
        serde_json::to_string(self)
            .map_err(|e| ArchiveError::StorageUnavailable(format!("settings encode: {e}")))
    }

    pub fn from_blob(blob: &str) -> Result<Self, ArchiveError> {
        serde_json::from_str(blob)
            .map_err(|e| ArchiveError::StorageUnavailable(format!("settings decode: {e}")))
    }
}
