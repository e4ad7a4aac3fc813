// ── Subscription state ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Device-reported subscription state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubscriptionState {
    /// Live, and every delivery so far was acknowledged.
    Active,
    /// No subscription, usually because the device rebooted.
    None,
    /// At least one delivery went unacknowledged and was dropped.
    Fault,
}

/// Result of a subscribe call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Active,
    /// The id is already registered, with this callback.
    Duplicate { callback_url: String },
}

/// A subscription as the manager tracks it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub topics: Vec<String>,
    pub callback_url: String,
    pub state: SubscriptionState,
}
