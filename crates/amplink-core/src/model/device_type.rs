// ── Device and model type tokens ──
//
// Open-ended identifiers: a handful of canonical tokens are known, but any
// string constructs a valid value. Equality is by normalized token
// (trimmed, upper-cased). Deployment compatibility is a separate,
// table-driven relation that is coarser than equality and not derived
// from it.

use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

fn normalize(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

// ── ModelType ────────────────────────────────────────────────────────

/// Hardware model token, e.g. `9004` or `7199`.
#[derive(Debug, Clone)]
pub struct ModelType(Cow<'static, str>);

/// Hardware generations known to the compatibility table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFamily {
    /// 9001 / 9002, plus the legacy either-of-two alias.
    Gen1,
    /// 9003 / 9235.
    Gen2,
    /// 9004 / 9005 / 9006.
    Gen3,
    /// Current hardware.
    Current,
}

impl ModelFamily {
    /// Families an unrecognized token is never compatible with: every
    /// family but the newest.
    fn is_explicitly_older(self) -> bool {
        matches!(self, Self::Gen1 | Self::Gen2 | Self::Gen3)
    }
}

impl ModelType {
    pub const M9001: Self = Self(Cow::Borrowed("9001"));
    pub const M9002: Self = Self(Cow::Borrowed("9002"));
    /// Legacy alias reported by old firmware that could not tell the two
    /// Gen1 models apart.
    pub const M9001_OR_9002: Self = Self(Cow::Borrowed("9001/9002"));
    pub const M9003: Self = Self(Cow::Borrowed("9003"));
    pub const M9235: Self = Self(Cow::Borrowed("9235"));
    pub const M9004: Self = Self(Cow::Borrowed("9004"));
    pub const M9005: Self = Self(Cow::Borrowed("9005"));
    pub const M9006: Self = Self(Cow::Borrowed("9006"));
    pub const M7198: Self = Self(Cow::Borrowed("7198"));
    pub const M7199: Self = Self(Cow::Borrowed("7199"));
    pub const M8436: Self = Self(Cow::Borrowed("8436"));

    const KNOWN: &'static [(Self, ModelFamily)] = &[
        (Self::M9001, ModelFamily::Gen1),
        (Self::M9002, ModelFamily::Gen1),
        (Self::M9001_OR_9002, ModelFamily::Gen1),
        (Self::M9003, ModelFamily::Gen2),
        (Self::M9235, ModelFamily::Gen2),
        (Self::M9004, ModelFamily::Gen3),
        (Self::M9005, ModelFamily::Gen3),
        (Self::M9006, ModelFamily::Gen3),
        (Self::M7198, ModelFamily::Current),
        (Self::M7199, ModelFamily::Current),
        (Self::M8436, ModelFamily::Current),
    ];

    /// Construct from any token. Known tokens resolve to their canonical
    /// instance; anything else becomes a new value.
    pub fn new(raw: &str) -> Self {
        let token = normalize(raw);
        Self::KNOWN
            .iter()
            .find(|(known, _)| known.0 == token)
            .map_or_else(|| Self(Cow::Owned(token)), |(known, _)| known.clone())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn family(&self) -> Option<ModelFamily> {
        Self::KNOWN
            .iter()
            .find(|(known, _)| known.0 == self.0)
            .map(|(_, family)| *family)
    }

    pub fn is_known(&self) -> bool {
        self.family().is_some()
    }

    /// Exact match with one directional special case: the legacy
    /// `9001/9002` alias matches either Gen1 model, but neither model
    /// matches the alias.
    pub fn matches(&self, other: &Self) -> bool {
        if self == other {
            return true;
        }
        *self == Self::M9001_OR_9002 && (*other == Self::M9001 || *other == Self::M9002)
    }

    /// Whether an image built for `self` may be deployed to `other`.
    ///
    /// Known models are compatible within their family. An unrecognized
    /// token is treated as future hardware in the newest family:
    /// compatible with `Current` models and other unrecognized tokens,
    /// never with the explicitly older Gen1, Gen2 and Gen3 families.
    pub fn is_compatible_with(&self, other: &Self) -> bool {
        if self == other {
            return true;
        }
        match (self.family(), other.family()) {
            (Some(a), Some(b)) => a == b,
            (None, Some(known)) | (Some(known), None) => !known.is_explicitly_older(),
            (None, None) => true,
        }
    }
}

// ── DeviceType ───────────────────────────────────────────────────────

/// Appliance product token, e.g. `XI52`.
#[derive(Debug, Clone)]
pub struct DeviceType(Cow<'static, str>);

impl DeviceType {
    pub const XS40: Self = Self(Cow::Borrowed("XS40"));
    pub const XI50: Self = Self(Cow::Borrowed("XI50"));
    pub const XI52: Self = Self(Cow::Borrowed("XI52"));
    pub const XA35: Self = Self(Cow::Borrowed("XA35"));
    pub const XB60: Self = Self(Cow::Borrowed("XB60"));
    pub const XB62: Self = Self(Cow::Borrowed("XB62"));
    pub const XM70: Self = Self(Cow::Borrowed("XM70"));
    pub const XE82: Self = Self(Cow::Borrowed("XE82"));
    pub const XG45: Self = Self(Cow::Borrowed("XG45"));
    pub const XC10: Self = Self(Cow::Borrowed("XC10"));
    pub const IDG: Self = Self(Cow::Borrowed("IDG"));

    /// Canonical tokens with their compatibility group.
    const KNOWN: &'static [(Self, u8)] = &[
        (Self::XS40, 0),
        (Self::XI50, 1),
        (Self::XI52, 1),
        (Self::XA35, 2),
        (Self::XB60, 3),
        (Self::XB62, 3),
        (Self::XM70, 4),
        (Self::XE82, 5),
        (Self::XG45, 6),
        (Self::XC10, 7),
        (Self::IDG, 8),
    ];

    pub fn new(raw: &str) -> Self {
        let token = normalize(raw);
        Self::KNOWN
            .iter()
            .find(|(known, _)| known.0 == token)
            .map_or_else(|| Self(Cow::Owned(token)), |(known, _)| known.clone())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn group(&self) -> Option<u8> {
        Self::KNOWN
            .iter()
            .find(|(known, _)| known.0 == self.0)
            .map(|(_, group)| *group)
    }

    pub fn is_known(&self) -> bool {
        self.group().is_some()
    }

    /// Whether configuration for `self` may be deployed to `other`.
    ///
    /// Product revisions in the same line are compatible; an
    /// unrecognized type is compatible only with itself.
    pub fn is_compatible_with(&self, other: &Self) -> bool {
        if self == other {
            return true;
        }
        matches!((self.group(), other.group()), (Some(a), Some(b)) if a == b)
    }
}

// ── Shared value-type plumbing ───────────────────────────────────────

macro_rules! token_impls {
    ($ty:ident) => {
        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.0 == other.0
            }
        }

        impl Eq for $ty {}

        impl Hash for $ty {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.0.hash(state);
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $ty {
            fn from(raw: &str) -> Self {
                Self::new(raw)
            }
        }

        impl FromStr for $ty {
            type Err = std::convert::Infallible;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                Ok(Self::new(raw))
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                Ok(Self::new(&raw))
            }
        }
    };
}

token_impls!(ModelType);
token_impls!(DeviceType);
