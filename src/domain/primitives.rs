//! Domain primitives: identifiers, time, and the clock seam.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Time in milliseconds since Unix epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TimeMs(pub i64);

impl TimeMs {
    /// Create a TimeMs from milliseconds.
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Get the underlying milliseconds value.
    pub fn as_ms(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for TimeMs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wall-clock seam so sagas can be tested against a pinned time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time in milliseconds since Unix epoch.
    fn now_ms(&self) -> TimeMs;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> TimeMs {
        TimeMs::new(Utc::now().timestamp_millis())
    }
}

/// Test clock pinned to a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub TimeMs);

impl FixedClock {
    /// Create a clock pinned to the given milliseconds value.
    pub fn at(ms: i64) -> Self {
        FixedClock(TimeMs::new(ms))
    }
}

impl Clock for FixedClock {
    fn now_ms(&self) -> TimeMs {
        self.0
    }
}

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub String);

        impl $name {
            /// Wrap a raw string identifier.
            pub fn new(id: impl Into<String>) -> Self {
                $name(id.into())
            }

            /// Get the identifier as a string reference.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }
    };
}

string_id! {
    /// A user account identifier.
    UserId
}

string_id! {
    /// A vault identifier (generated at creation).
    VaultId
}

string_id! {
    /// A position identifier (generated at open).
    PositionId
}

string_id! {
    /// The mint address of a vault's underlying asset.
    MintAddress
}

impl VaultId {
    /// Generate a fresh vault identifier.
    pub fn generate() -> Self {
        VaultId(uuid::Uuid::new_v4().to_string())
    }
}

impl PositionId {
    /// Generate a fresh position identifier.
    pub fn generate() -> Self {
        PositionId(uuid::Uuid::new_v4().to_string())
    }
}

/// Well-known asset id for the settlement asset.
pub const SOL_ASSET_ID: &str = "SOL";
