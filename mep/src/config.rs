/// Configuration for a [`crate::pool::MepPool`] and the endpoints it hosts.
///
/// Constructed with [`MepConfig::new`] and customized through `with_*`
/// methods, the way the reference connection pool in this codebase's
/// ancestry configures itself (`PoolConfig::new(..).with_idle_connection_timeout(..)`).
#[derive(Debug, Clone)]
pub struct MepConfig {
    slot_capacity: usize,
    tracing_enabled: bool,
}

/// Default slot-table capacity: `MAX = 8`, i.e. 9 usable slots (§3, §9).
pub const DEFAULT_SLOT_CAPACITY: usize = 9;

impl MepConfig {
    pub fn new() -> Self {
        Self {
            slot_capacity: DEFAULT_SLOT_CAPACITY,
            tracing_enabled: true,
        }
    }

    /// Sets the number of connection slots each endpoint carries.
    ///
    /// Must fit in a [`mep_core::SlotId`] (signed 16-bit); panics otherwise,
    /// since this is a construction-time configuration error, not a runtime
    /// condition callers can recover from.
    pub fn with_slot_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity >= 1, "slot_capacity must be at least 1");
        assert!(
            capacity <= i16::MAX as usize,
            "slot_capacity must fit in a 16-bit slot id"
        );
        self.slot_capacity = capacity;
        self
    }

    /// Globally disables trace-record emission regardless of per-tool
    /// flags, so the crate can be embedded in a host that has not wired a
    /// tracer yet without paying for record construction.
    pub fn with_tracing_enabled(mut self, enabled: bool) -> Self {
        self.tracing_enabled = enabled;
        self
    }

    pub fn slot_capacity(&self) -> usize {
        self.slot_capacity
    }

    pub fn tracing_enabled(&self) -> bool {
        self.tracing_enabled
    }
}

impl Default for MepConfig {
    fn default() -> Self {
        Self::new()
    }
}
