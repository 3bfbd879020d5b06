use std::fmt;

/// The four-valued outcome every mutating media-endpoint operation returns.
///
/// Named `MepResult` rather than `Result` so it does not collide with
/// [`std::result::Result`]; it carries no payload because the operations
/// that produce it are not exceptional-control-flow APIs — `Ok` and its
/// siblings are all equally "the call completed", just with different
/// observable outcomes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MepResult {
    Ok = 0,
    NoResource = 1,
    Denied = 2,
    Error = 3,
}

impl MepResult {
    /// The stable tracer display string for this outcome (§6: `ChannelTrace`
    /// / `ConnectionTrace` render `result` this way).
    pub const fn as_trace_str(self) -> &'static str {
        match self {
            MepResult::Ok => "ok",
            MepResult::NoResource => "noResource",
            MepResult::Denied => "denied",
            MepResult::Error => "error",
        }
    }

    pub const fn is_ok(self) -> bool {
        matches!(self, MepResult::Ok)
    }
}

impl fmt::Display for MepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_trace_str())
    }
}
