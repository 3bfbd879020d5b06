use mep_core::SlotId;

use crate::pool::MepHandle;

/// One entry of a media endpoint's connection-slot table (§3).
///
/// A free slot has `peer = None`; occupancy is tested by that field
/// alone, never by `tx_enabled`/`rx_enabled`, which are only meaningful
/// once a slot is occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ConnectionSlot {
    pub(crate) peer: Option<MepHandle>,
    pub(crate) peer_slot: SlotId,
    pub(crate) tx_enabled: bool,
    pub(crate) rx_enabled: bool,
}

impl ConnectionSlot {
    pub(crate) const FREE: ConnectionSlot = ConnectionSlot {
        peer: None,
        peer_slot: SlotId::NIL,
        tx_enabled: false,
        rx_enabled: false,
    };

    pub(crate) fn is_free(&self) -> bool {
        self.peer.is_none()
    }
}

impl Default for ConnectionSlot {
    fn default() -> Self {
        Self::FREE
    }
}
