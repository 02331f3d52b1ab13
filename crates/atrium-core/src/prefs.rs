// Recipient notification preferences
//
// Preferences are owned by the portal's user-settings screens; the pipeline
// only reads them. A recipient with no stored preference row gets the
// default: every kind enabled, periodic cadence.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::event::EventKind;

/// How often a recipient wants to hear about activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    /// Send on the next pipeline tick, ignoring the minimum resend interval
    Immediate,

    /// Batch into the periodic digest
    Periodic,
}

impl Default for Cadence {
    fn default() -> Self {
        Cadence::Periodic
    }
}

impl Cadence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cadence::Immediate => "immediate",
            Cadence::Periodic => "periodic",
        }
    }

    pub fn parse(s: &str) -> Option<Cadence> {
        match s {
            "immediate" => Some(Cadence::Immediate),
            "periodic" => Some(Cadence::Periodic),
            _ => None,
        }
    }
}

/// A recipient's notification settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientPrefs {
    /// Event kinds the recipient wants recorded for them
    pub enabled_kinds: HashSet<EventKind>,

    /// Delivery cadence
    pub cadence: Cadence,
}

impl Default for RecipientPrefs {
    fn default() -> Self {
        Self {
            enabled_kinds: EventKind::ALL.into_iter().collect(),
            cadence: Cadence::Periodic,
        }
    }
}

impl RecipientPrefs {
    /// Preferences with only the given kinds enabled
    pub fn with_kinds(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self {
            enabled_kinds: kinds.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Set the cadence
    pub fn with_cadence(mut self, cadence: Cadence) -> Self {
        self.cadence = cadence;
        self
    }

    /// Whether events of this kind should be recorded for the recipient
    pub fn allows(&self, kind: EventKind) -> bool {
        self.enabled_kinds.contains(&kind)
    }
}
