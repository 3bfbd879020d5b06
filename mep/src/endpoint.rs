use mep_core::{ChannelAddress, ChannelAttributes, EphemeralChannel, MepResult, SlotId};

use crate::error::MepError;
use crate::gateway::GatewayControl;
use crate::pool::MepHandle;
use crate::psm::PsmId;
use crate::slot::ConnectionSlot;
use crate::state::ChannelState;

/// The peer-to-peer slice a media endpoint exposes to whichever endpoint
/// currently holds a slot pointing at it (§6: "Peer MEP").
///
/// Every method here is the *peer's own* operation — there is no `self`
/// parameter naming the caller, because the caller's identity is already
/// recorded in the slot these calls act on (or, for `insert_connection`,
/// is passed explicitly as the requester's handle).
pub trait PeerMep {
    /// The peer's side of the `CreateConnection` handshake: find the
    /// lowest free local slot, record `(requester, requester_slot)` in
    /// it, and return the new slot id, or [`SlotId::NIL`] if full.
    fn insert_connection(&mut self, requester: MepHandle, requester_slot: SlotId) -> SlotId;

    /// Called when the peer's published attributes on `slot` change. Only
    /// has an effect if `slot` is this endpoint's current receive slot.
    fn update_connection(&mut self, slot: SlotId, attrs: ChannelAttributes) -> MepResult;

    /// Local-only removal of `slot`: frees the receive connection first if
    /// `slot` was it, then marks the slot free.
    fn delete_connection(&mut self, slot: SlotId);

    /// The attributes this endpoint is willing to present on `slot`.
    fn get_channel_attributes(&self, slot: SlotId) -> ChannelAttributes;
}

/// Owns one ephemeral media channel on a gateway and a fixed-capacity
/// table of peer connections (§3).
///
/// A `MediaEndpoint` never reaches across to a peer on its own: any
/// operation that touches more than one endpoint is orchestrated by
/// [`crate::pool::MepPool`], which resolves the handles in
/// [`crate::slot`] entries into live, disjoint `&mut MediaEndpoint`
/// borrows. This mirrors how this codebase's ancestor avoids endpoints
/// holding raw references to each other: connections are addressed by a
/// registry key, resolved through the owning collection, never stored as
/// a direct pointer.
pub struct MediaEndpoint {
    pub(crate) handle: MepHandle,
    psm: PsmId,
    user_port: ChannelAddress,
    local_channel: ChannelAttributes,
    remote_channel: ChannelAttributes,
    generate_marker: bool,
    slots: Vec<ConnectionSlot>,
    rx_slot: SlotId,
    disabled: bool,
    state: ChannelState,
    gateway: Box<dyn GatewayControl>,
}

impl MediaEndpoint {
    pub(crate) fn new(psm: PsmId, gateway: Box<dyn GatewayControl>, slot_capacity: usize) -> Self {
        MediaEndpoint {
            handle: MepHandle::default(),
            psm,
            user_port: ChannelAddress::NIL,
            local_channel: ChannelAttributes::NIL,
            remote_channel: ChannelAttributes::NIL,
            generate_marker: false,
            slots: vec![ConnectionSlot::FREE; slot_capacity],
            rx_slot: SlotId::NIL,
            disabled: false,
            state: ChannelState::Idle,
            gateway,
        }
    }

    pub fn psm(&self) -> PsmId {
        self.psm
    }

    pub fn handle(&self) -> MepHandle {
        self.handle
    }

    pub fn user_port(&self) -> ChannelAddress {
        self.user_port
    }

    pub fn local_channel(&self) -> ChannelAttributes {
        self.local_channel
    }

    pub fn remote_channel(&self) -> ChannelAttributes {
        self.remote_channel
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn rx_slot(&self) -> SlotId {
        self.rx_slot
    }

    pub fn slot_capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn gateway_role(&self) -> &'static str {
        self.gateway.role()
    }

    pub(crate) fn slot(&self, slot: SlotId) -> Option<&ConnectionSlot> {
        self.slots.get(slot.index()?)
    }

    pub(crate) fn slot_mut(&mut self, slot: SlotId) -> Option<&mut ConnectionSlot> {
        self.slots.get_mut(slot.index()?)
    }

    /// Every currently occupied `(slot, peer)` pair, in slot order.
    pub(crate) fn occupied_slots(&self) -> impl Iterator<Item = (SlotId, MepHandle)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.peer
                .map(|peer| (SlotId::try_from(i).expect("capacity fits SlotId"), peer))
        })
    }

    fn find_free_slot(&self) -> Option<SlotId> {
        self.slots
            .iter()
            .position(ConnectionSlot::is_free)
            .map(|i| SlotId::try_from(i).expect("capacity fits SlotId"))
    }

    fn occupy_slot(&mut self, slot: SlotId, peer: MepHandle, peer_slot: SlotId) {
        if let Some(s) = self.slot_mut(slot) {
            *s = ConnectionSlot {
                peer: Some(peer),
                peer_slot,
                tx_enabled: false,
                rx_enabled: false,
            };
        }
    }

    /// `RemoteConnectionId` (§4.2): the peer's slot id for one of our own
    /// slots, or [`SlotId::NIL`] if `slot` is invalid or free.
    pub fn remote_connection_id(&self, slot: SlotId) -> SlotId {
        self.slot(slot)
            .filter(|s| !s.is_free())
            .map(|s| s.peer_slot)
            .unwrap_or(SlotId::NIL)
    }

    // -- channel control (§4.1) -------------------------------------------------

    /// `CreateChannel` (§4.1): asks the gateway for a fresh ephemeral
    /// channel and drives `Idle -> Requested -> Assigned`.
    pub fn create_channel(&mut self) -> MepResult {
        if !self.state.is_idle() {
            return MepError::GatewayUnsupported {
                op: "create_channel: not idle",
            }
            .into_result();
        }
        self.state = ChannelState::Requested;
        match self.gateway.create_channel() {
            Ok(channel) => {
                self.local_channel = ChannelAttributes::new(channel, false);
                self.state = ChannelState::Assigned;
                MepResult::Ok
            }
            Err(err) => {
                self.state = ChannelState::Idle;
                err.into_result()
            }
        }
    }

    /// `DestroyChannel` (§4.1): abstract teardown with the gateway,
    /// `-> Idle`.
    pub fn destroy_channel(&mut self) -> MepResult {
        match self.gateway.destroy_channel() {
            Ok(()) => {
                self.local_channel = ChannelAttributes::NIL;
                self.state = ChannelState::Idle;
                MepResult::Ok
            }
            Err(err) => err.into_result(),
        }
    }

    /// Applies a subscriber-port change (§4.1 `ModifyChannel`, address
    /// form). Returns the gateway outcome; callers decide significance
    /// with [`mep_core::address_changed`] by comparing [`Self::user_port`]
    /// before and after.
    pub(crate) fn apply_channel_address(&mut self, addr: ChannelAddress) -> MepResult {
        match self.gateway.modify_channel_address(addr) {
            Ok(()) => {
                self.user_port = addr;
                MepResult::Ok
            }
            Err(err) => err.into_result(),
        }
    }

    /// Applies an ephemeral-channel change (§4.1 `ModifyChannel`,
    /// ephemeral form).
    pub(crate) fn apply_channel_ephemeral(&mut self, channel: EphemeralChannel) -> MepResult {
        match self.gateway.modify_channel_ephemeral(channel) {
            Ok(()) => {
                self.local_channel = ChannelAttributes::new(channel, self.local_channel.tx());
                MepResult::Ok
            }
            Err(err) => err.into_result(),
        }
    }

    /// Applies a full-attributes change (§4.1 `ModifyChannel`, attributes
    /// form — proxy mode).
    pub(crate) fn apply_channel_attributes(&mut self, attrs: ChannelAttributes) -> MepResult {
        match self.gateway.modify_channel_attributes(attrs) {
            Ok(()) => {
                self.local_channel = attrs;
                MepResult::Ok
            }
            Err(err) => err.into_result(),
        }
    }

    pub(crate) fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
    }

    /// `EndOfTransaction` hook (§6): returns the attributes to publish as
    /// an outbound connection parameter if `generate_marker` was set,
    /// clearing the flag either way.
    pub fn end_of_transaction(&mut self) -> Option<ChannelAttributes> {
        if std::mem::take(&mut self.generate_marker) {
            Some(self.local_channel)
        } else {
            None
        }
    }

    pub(crate) fn set_generate_marker(&mut self) {
        self.generate_marker = true;
    }

    // -- connection control (§4.2) -----------------------------------------------

    /// `GetChannelAttributes` (§4.2).
    pub fn get_channel_attributes(&self, slot: SlotId) -> ChannelAttributes {
        if self.disabled {
            return ChannelAttributes::NIL;
        }
        let tx_enabled = self.slot(slot).map(|s| s.tx_enabled).unwrap_or(false);
        let mut attrs = self.local_channel;
        if attrs.tx() && !tx_enabled {
            attrs = attrs.with_tx(false);
        }
        if !attrs.tx() {
            return ChannelAttributes::NIL;
        }
        attrs
    }

    /// `CreateConnection(peer)` (§4.2).
    pub fn create_connection(&mut self, peer_handle: MepHandle, peer: &mut dyn PeerMep) -> SlotId {
        let Some(i) = self.find_free_slot() else {
            return SlotId::NIL;
        };
        let j = peer.insert_connection(self.handle, i);
        if j.is_nil() {
            return SlotId::NIL;
        }
        self.occupy_slot(i, peer_handle, j);
        i
    }

    fn make_receive_connection(&mut self, slot: SlotId, peer: &mut dyn PeerMep) -> MepResult {
        let Some(peer_slot) = self.slot(slot).map(|s| s.peer_slot) else {
            return MepError::InvalidSlot { slot }.into_result();
        };
        let peer_attrs = peer.get_channel_attributes(peer_slot);
        match self.gateway.make_connection(peer_attrs) {
            Ok(()) => {
                self.remote_channel = peer_attrs;
                if let Some(s) = self.slot_mut(slot) {
                    s.rx_enabled = true;
                }
                self.rx_slot = slot;
                MepResult::Ok
            }
            Err(err) => err.into_result(),
        }
    }

    /// `FreeConnections` (§4.2, pool-level): releases this endpoint's
    /// gateway receive path without touching the slot table. A no-op if no
    /// receive connection is currently assigned. The peer-facing nil-attribute
    /// broadcast this operation also performs is carried out by
    /// [`crate::pool::MepPool::free_connections`], which has the disjoint
    /// borrows needed to reach every peer in turn.
    pub(crate) fn force_free_connection(&mut self) -> MepResult {
        if self.rx_slot.is_nil() {
            return MepResult::Ok;
        }
        self.free_receive_connection()
    }

    /// `UpdateConnections` (§4.2), local half: re-establishes the receive
    /// connection against the peer's current attributes, if one is
    /// assigned. A no-op returning `Ok` when `rx_slot` is nil.
    pub(crate) fn reestablish_receive_connection(&mut self, peer: &mut dyn PeerMep) -> MepResult {
        if self.rx_slot.is_nil() {
            return MepResult::Ok;
        }
        self.make_receive_connection(self.rx_slot, peer)
    }

    fn free_receive_connection(&mut self) -> MepResult {
        match self.gateway.free_connection() {
            Ok(()) => {
                if let Some(s) = self.slot_mut(self.rx_slot) {
                    s.rx_enabled = false;
                }
                self.rx_slot = SlotId::NIL;
                self.remote_channel = ChannelAttributes::NIL;
                MepResult::Ok
            }
            Err(err) => err.into_result(),
        }
    }

    /// `ModifyConnection(slot, tx, rx)` (§4.2) — the central contract.
    pub fn modify_connection(
        &mut self,
        peer: &mut dyn PeerMep,
        slot: SlotId,
        tx: bool,
        rx: bool,
    ) -> MepResult {
        let Some(record) = self.slot(slot).copied() else {
            return MepError::InvalidSlot { slot }.into_result();
        };
        if record.is_free() {
            return MepError::InvalidSlot { slot }.into_result();
        }

        let mut result = MepResult::Ok;

        if rx {
            if self.rx_slot == slot {
                // already the receive slot: no-op
            } else if !self.rx_slot.is_nil() {
                // invariant #1: never silently overwrite the receive slot
                return MepResult::Denied;
            } else {
                result = self.make_receive_connection(slot, peer);
                if !result.is_ok() {
                    return result;
                }
            }
        } else if self.rx_slot == slot {
            result = self.free_receive_connection();
            if !result.is_ok() {
                return result;
            }
        }

        if let Some(current) = self.slot(slot).copied() {
            if current.tx_enabled != tx {
                if let Some(s) = self.slot_mut(slot) {
                    s.tx_enabled = tx;
                }
                let attrs = self.get_channel_attributes(slot);
                result = peer.update_connection(current.peer_slot, attrs);
            }
        }

        result
    }

    /// `DestroyConnection(slot)` (§4.2): peer-notified removal of one slot.
    pub fn destroy_connection(&mut self, slot: SlotId, peer: &mut dyn PeerMep) {
        let Some(record) = self.slot(slot).copied() else {
            return;
        };
        if record.is_free() {
            return;
        }
        peer.delete_connection(record.peer_slot);
        PeerMep::delete_connection(self, slot);
    }
}

impl PeerMep for MediaEndpoint {
    fn insert_connection(&mut self, requester: MepHandle, requester_slot: SlotId) -> SlotId {
        let Some(i) = self.find_free_slot() else {
            return SlotId::NIL;
        };
        self.occupy_slot(i, requester, requester_slot);
        // Accepting a new connection happens mid pool-borrow, with no way
        // to reach the pool to broadcast a fresh attribute set to this
        // endpoint's other peers; defer that to `EndOfTransaction`.
        self.set_generate_marker();
        i
    }

    fn update_connection(&mut self, slot: SlotId, attrs: ChannelAttributes) -> MepResult {
        if !self.rx_slot.is_nil() && self.rx_slot == slot {
            match self.gateway.make_connection(attrs) {
                Ok(()) => {
                    self.remote_channel = attrs;
                    MepResult::Ok
                }
                Err(err) => err.into_result(),
            }
        } else {
            MepResult::Ok
        }
    }

    fn delete_connection(&mut self, slot: SlotId) {
        if !self.rx_slot.is_nil() && self.rx_slot == slot {
            let _ = self.free_receive_connection();
        }
        if let Some(s) = self.slot_mut(slot) {
            *s = ConnectionSlot::FREE;
        }
    }

    fn get_channel_attributes(&self, slot: SlotId) -> ChannelAttributes {
        MediaEndpoint::get_channel_attributes(self, slot)
    }
}
