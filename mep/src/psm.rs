use std::fmt;

/// Identifies the protocol state machine that owns a media endpoint.
///
/// Carried on trace records so a post-mortem reader can tell which call
/// leg a `ChannelTrace`/`ConnectionTrace` entry belongs to; otherwise
/// opaque to the media-endpoint subsystem.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PsmId(u32);

impl PsmId {
    /// Placeholder used on trace records when the peer side of a
    /// connection could not be resolved (e.g. a malformed or stale slot),
    /// so a failure is still traced rather than silently dropped.
    pub const UNKNOWN: PsmId = PsmId(u32::MAX);

    pub const fn new(id: u32) -> Self {
        PsmId(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PsmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PsmId {
    fn from(value: u32) -> Self {
        PsmId(value)
    }
}
