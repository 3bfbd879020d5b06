use mep_core::{MepResult, SlotId};

use crate::state::ChannelState;

/// Internal diagnostic error type (§7.1).
///
/// This is distinct from [`MepResult`]: `MepResult` is the coarse,
/// four-valued outcome a peer or tracer observes, while `MepError` is the
/// `std::error::Error`-implementing type used inside the implementation
/// for `?`-propagation and for logging more detail than an ordinal can
/// carry. Every `MepError` is collapsed to a `MepResult` at the public API
/// boundary via [`MepError::into_result`]; none of the detail escapes past
/// that boundary, but none of it is silently dropped either — callers see
/// it logged through `tracing` first.
#[derive(Debug, thiserror::Error)]
pub enum MepError {
    #[error("slot {slot} is out of range or unoccupied")]
    InvalidSlot { slot: SlotId },

    #[error("no free slot available in a {capacity}-slot table")]
    SlotTableFull { capacity: usize },

    #[error("{op} is not supported by this endpoint's gateway role")]
    GatewayUnsupported { op: &'static str },

    #[error("deallocate invoked while channel state was {state}, not idle")]
    DeallocatedWhileActive { state: ChannelState },

    #[error("peer endpoint handle is stale")]
    StalePeer,

    #[error("gateway control operation failed")]
    Gateway(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl MepError {
    /// Collapses this error to the four-valued outcome callers observe,
    /// logging the detail first so it is not lost, only not propagated.
    pub fn into_result(self) -> MepResult {
        match &self {
            MepError::InvalidSlot { .. }
            | MepError::GatewayUnsupported { .. }
            | MepError::StalePeer => {
                tracing::warn!(error = %self, "media endpoint rejected a malformed request");
                MepResult::Error
            }
            MepError::SlotTableFull { .. } => {
                tracing::debug!(error = %self, "media endpoint slot table is full");
                MepResult::Error
            }
            MepError::DeallocatedWhileActive { .. } => {
                tracing::error!(error = %self, "software error: deallocate while not idle");
                MepResult::Error
            }
            MepError::Gateway(_) => {
                tracing::warn!(error = %self, "gateway control request failed");
                MepResult::NoResource
            }
        }
    }
}
