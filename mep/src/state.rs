use std::fmt;

/// The channel-assignment state machine (§4.3).
///
/// ```text
///         CreateChannel/start
///   Idle ───────────────────▶ Requested ──assigned──▶ Assigned
///    ▲                                                  │
///    └─────────── DestroyChannel ───────────────────────┘
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum ChannelState {
    #[default]
    Idle,
    Requested,
    Assigned,
}

impl ChannelState {
    pub const fn is_idle(self) -> bool {
        matches!(self, ChannelState::Idle)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelState::Idle => "idle",
            ChannelState::Requested => "requested",
            ChannelState::Assigned => "assigned",
        };
        f.write_str(name)
    }
}
