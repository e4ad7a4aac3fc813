// ── Status algebra ──
//
// OperationStatus is a four-point severity lattice with a rollup over
// children. DomainStatus bundles everything known about one domain and is
// always replaced as a whole.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Manager-side operational status, ordered by severity.
///
/// `Up < Partial < Unknown < Down`: an unknown state is treated as more
/// serious than a partially working one.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Up,
    Partial,
    #[default]
    Unknown,
    Down,
}

impl OperationStatus {
    pub fn is_more_serious_than(self, other: Self) -> bool {
        self > other
    }

    /// The more serious of two statuses.
    pub fn worst(self, other: Self) -> Self {
        self.max(other)
    }

    /// Roll child statuses up into one.
    ///
    /// No children is `Unknown`; children that all agree yield that status;
    /// any disagreement is `Partial`.
    pub fn rollup<I>(children: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        let mut children = children.into_iter();
        let Some(first) = children.next() else {
            return Self::Unknown;
        };
        if children.all(|s| s == first) {
            first
        } else {
            Self::Partial
        }
    }

    /// Parse a device-reported op-state. Unrecognized values are `Unknown`.
    pub fn from_device(raw: &str) -> Self {
        raw.trim().parse().unwrap_or(Self::Unknown)
    }
}

/// Administrative state of a domain or service.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum AdminStatus {
    Enabled,
    Disabled,
    #[default]
    Unknown,
}

impl AdminStatus {
    pub fn from_device(raw: &str) -> Self {
        raw.trim().parse().unwrap_or(Self::Unknown)
    }
}

/// Traffic-drain state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
#[serde(rename_all = "kebab-case")]
pub enum QuiesceStatus {
    Quiesced,
    QuiesceInProgress,
    Unquiesced,
    UnquiesceInProgress,
    Error,
    #[default]
    Unknown,
}

impl QuiesceStatus {
    pub fn from_device(raw: Option<&str>) -> Self {
        raw.map_or(Self::Unknown, |s| s.trim().parse().unwrap_or(Self::Unknown))
    }
}

/// Everything known about one domain at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DomainStatus {
    pub admin: AdminStatus,
    pub op: OperationStatus,
    pub quiesce: QuiesceStatus,
    /// Running configuration differs from the saved configuration.
    pub needs_save: bool,
    pub debug_state: bool,
}
