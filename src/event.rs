// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Dispatch Envelopes
//!
//! Everything that reaches the gate arrives in one of two shapes: a fresh
//! command from the application, or a confirmation that a record exists in
//! the log (either replayed at startup or delivered by the live change feed).

use crate::types::action::Action;

#[derive(Clone, Debug, PartialEq)]
pub enum Envelope {
    /// An action dispatched by the application.
    Command(Action),

    /// An action known to be durable.
    ///
    /// `init` marks bootstrap replay; those confirmations never had a matching
    /// pending write in this process.
    Confirmed { init: bool, action: Action },
}

impl Envelope {
    pub fn replayed(action: Action) -> Self {
        Envelope::Confirmed { init: true, action }
    }

    pub fn confirmed(action: Action) -> Self {
        Envelope::Confirmed { init: false, action }
    }

    /// Human-readable name of the envelope kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Command(_) => "Command",
            Envelope::Confirmed { init: true, .. } => "Replayed",
            Envelope::Confirmed { init: false, .. } => "Confirmed",
        }
    }
}
