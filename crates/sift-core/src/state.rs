// sipsift - The Siphon SIP Traffic Inspector
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

/// Progress of an INVITE dialog, derived from its observed message flow.
///
/// Only calls started by INVITE carry a state; dialogs started by other
/// methods (OPTIONS pings, REGISTER, standalone MESSAGE) have none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// INVITE seen, no final answer yet
    Setup,
    /// ACK for the setup INVITE seen
    InCall,
    /// CANCEL during setup
    Cancelled,
    /// Final error answer to the setup INVITE
    Rejected,
    /// 480/486/600 during setup
    Busy,
    /// 3xx during setup
    Diverted,
    /// BYE after the call was established
    Completed,
}

impl CallState {
    /// Returns the display name used in attribute rendering.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::Setup => "CALL SETUP",
            CallState::InCall => "IN CALL",
            CallState::Cancelled => "CANCELLED",
            CallState::Rejected => "REJECTED",
            CallState::Busy => "BUSY",
            CallState::Diverted => "DIVERTED",
            CallState::Completed => "COMPLETED",
        }
    }

    /// Whether the dialog is still expected to produce media: it stays in
    /// the active list exactly while this holds.
    pub fn is_active(&self) -> bool {
        matches!(self, CallState::Setup | CallState::InCall)
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
