use std::fmt;

use mep_core::{ChannelAddress, H248CtxtId, H248TermId, MepResult};

use crate::psm::PsmId;

/// Which tracer tool a record belongs to; gates emission independently of
/// the tracer being switched on at all (§9 design note: "Tracing gating").
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TraceTool {
    Channel,
    Connection,
}

/// Emitted on each `ModifyChannel` (any overload).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ChannelTrace {
    pub psm: PsmId,
    pub context_id: H248CtxtId,
    pub term_id: H248TermId,
    pub port: ChannelAddress,
    pub tx: bool,
    pub result: MepResult,
}

impl fmt::Display for ChannelTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ChannelTrace psm={} ctx={} term={} port={} tx={} result={}",
            self.psm, self.context_id, self.term_id, self.port, self.tx, self.result
        )
    }
}

/// Emitted on each `ModifyConnection`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ConnectionTrace {
    pub local_psm: PsmId,
    pub remote_psm: PsmId,
    pub tx: bool,
    pub rx: bool,
    pub result: MepResult,
}

impl fmt::Display for ConnectionTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConnectionTrace local={} remote={} tx={} rx={} result={}",
            self.local_psm, self.remote_psm, self.tx, self.rx, self.result
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceRecord {
    Channel(ChannelTrace),
    Connection(ConnectionTrace),
}

/// The process-wide tracing sink (§5: "a process-wide singleton").
///
/// Kept deliberately small — the media-endpoint subsystem only ever
/// checks whether a tool is on and appends a record; everything else
/// (buffering, formatting, persistence) is the tracer's business.
pub trait Tracer: Send + Sync {
    fn is_tool_on(&self, tool: TraceTool) -> bool;
    fn append(&self, record: TraceRecord);
}

/// A tracer that never records anything, used when a host has not wired
/// one up yet. `is_tool_on` always returns `false`, so callers never pay
/// for constructing a record that would not be read.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTracer;

impl Tracer for NullTracer {
    fn is_tool_on(&self, _tool: TraceTool) -> bool {
        false
    }

    fn append(&self, _record: TraceRecord) {}
}

/// Emits a trace record through `tracer` only if both the global switch in
/// [`crate::config::MepConfig`] and the per-tool flag allow it.
pub(crate) fn emit(
    tracer: &dyn Tracer,
    tracing_enabled: bool,
    tool: TraceTool,
    build: impl FnOnce() -> TraceRecord,
) {
    if tracing_enabled && tracer.is_tool_on(tool) {
        tracer.append(build());
    }
}
