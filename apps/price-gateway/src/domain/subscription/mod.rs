//! Subscription Tracking Types
//!
//! Domain types for tracking which instruments a single downstream
//! connection has asked for.
//!
//! # Design
//!
//! The shared subscription table lives in the broadcast hub and maps
//! instrument → connections. Each connection additionally keeps its own
//! [`ClientSubscriptions`] record, so that teardown only touches the
//! instruments that connection actually subscribed to instead of scanning
//! the whole table.

use std::collections::HashSet;
use std::fmt;

use uuid::Uuid;

use super::streaming::InstrumentSymbol;

// =============================================================================
// Connection Identity
// =============================================================================

/// Unique identifier for one downstream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocate a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// =============================================================================
// Subscription Action
// =============================================================================

/// Action requested by a client control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionAction {
    /// Start receiving updates for the listed instruments.
    Subscribe,
    /// Stop receiving updates for the listed instruments.
    Unsubscribe,
}

impl SubscriptionAction {
    /// Parse an action name, ignoring case.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "subscribe" => Some(Self::Subscribe),
            "unsubscribe" => Some(Self::Unsubscribe),
            _ => None,
        }
    }

    /// Wire name of the action.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
        }
    }
}

// =============================================================================
// Per-Connection Record
// =============================================================================

/// Instruments one connection is currently subscribed to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientSubscriptions {
    instruments: HashSet<InstrumentSymbol>,
}

impl ClientSubscriptions {
    /// Create an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a subscription. Returns `true` if it was not already present.
    pub fn record(&mut self, instrument: InstrumentSymbol) -> bool {
        self.instruments.insert(instrument)
    }

    /// Forget a subscription. Returns `true` if it was present.
    pub fn forget(&mut self, instrument: &InstrumentSymbol) -> bool {
        self.instruments.remove(instrument)
    }

    /// Whether `instrument` is recorded.
    #[must_use]
    pub fn contains(&self, instrument: &InstrumentSymbol) -> bool {
        self.instruments.contains(instrument)
    }

    /// Number of recorded instruments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    /// Whether nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    /// Iterate recorded instruments in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &InstrumentSymbol> {
        self.instruments.iter()
    }
}

impl IntoIterator for ClientSubscriptions {
    type Item = InstrumentSymbol;
    type IntoIter = std::collections::hash_set::IntoIter<InstrumentSymbol>;

    fn into_iter(self) -> Self::IntoIter {
        self.instruments.into_iter()
    }
}

// =============================================================================
// Tests
// =============================================================================
