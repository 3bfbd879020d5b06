//! Media-endpoint subsystem: a gateway-controlled ephemeral channel with a
//! fixed-capacity table of peer-to-peer connections, orchestrated by a
//! single-threaded, non-async pool.
//!
//! [`MediaEndpoint`] owns local channel state and any operation that only
//! touches one peer at a time; [`MepPool`] owns the arena of endpoints and
//! everything that must reach across to a second endpoint in the same
//! step. [`mep_core`] supplies the value types both build on.

mod config;
mod endpoint;
mod error;
mod gateway;
mod pool;
mod psm;
#[cfg(test)]
mod scenarios;
mod slot;
mod state;
mod trace;

pub use config::{DEFAULT_SLOT_CAPACITY, MepConfig};
pub use endpoint::{MediaEndpoint, PeerMep};
pub use error::MepError;
pub use gateway::{EdgeGateway, GatewayClient, GatewayControl, ProxyGateway};
pub use pool::{MepHandle, MepPool, Transaction};
pub use psm::PsmId;
pub use state::ChannelState;
pub use trace::{ChannelTrace, ConnectionTrace, NullTracer, TraceRecord, TraceTool, Tracer};

pub use mep_core::{
    ChannelAddress, ChannelAttributes, EphemeralChannel, H248CtxtId, H248TermId, MepResult,
    SlotId, address_changed, attributes_changed, channel_changed,
};
