use std::sync::Arc;

use mep_core::{ChannelAddress, ChannelAttributes, EphemeralChannel, MepResult, SlotId};
use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;

use crate::config::MepConfig;
use crate::endpoint::{MediaEndpoint, PeerMep};
use crate::error::MepError;
use crate::gateway::GatewayControl;
use crate::psm::PsmId;
use crate::trace::{ChannelTrace, ConnectionTrace, TraceRecord, TraceTool, Tracer, emit};

new_key_type! {
    /// A weak, generation-checked reference to a [`MediaEndpoint`] living
    /// in some [`MepPool`] (§9 design note: "handle-based weak
    /// back-references"). Stored inside [`crate::slot::ConnectionSlot`]
    /// instead of a strong pointer, so a peer can be deallocated without
    /// any endpoint holding a dangling reference to it: a stale handle
    /// simply fails to resolve in [`MepPool::get`].
    pub struct MepHandle;
}

/// Owns every [`MediaEndpoint`] that can address the others by
/// [`MepHandle`], and is the only component able to resolve two such
/// handles into disjoint `&mut` borrows at once. All multi-peer
/// operations — anything that must mutate a local endpoint and some peer
/// endpoint in the same step — are therefore pool methods, not
/// `MediaEndpoint` methods.
pub struct MepPool {
    endpoints: SlotMap<MepHandle, MediaEndpoint>,
    config: MepConfig,
    tracer: Arc<dyn Tracer>,
}

impl MepPool {
    pub fn new(config: MepConfig, tracer: Arc<dyn Tracer>) -> Self {
        MepPool {
            endpoints: SlotMap::with_key(),
            config,
            tracer,
        }
    }

    pub fn config(&self) -> &MepConfig {
        &self.config
    }

    /// `CreateChannel` at the pool level: allocates a fresh endpoint bound
    /// to `psm` and asks its gateway for an ephemeral channel in one step.
    pub fn allocate(&mut self, psm: PsmId, gateway: Box<dyn GatewayControl>) -> MepHandle {
        let endpoint = MediaEndpoint::new(psm, gateway, self.config.slot_capacity());
        let handle = self.endpoints.insert(endpoint);
        self.endpoints[handle].handle = handle;
        handle
    }

    pub fn get(&self, handle: MepHandle) -> Option<&MediaEndpoint> {
        self.endpoints.get(handle)
    }

    pub fn get_mut(&mut self, handle: MepHandle) -> Option<&mut MediaEndpoint> {
        self.endpoints.get_mut(handle)
    }

    fn pair_mut(
        &mut self,
        a: MepHandle,
        b: MepHandle,
    ) -> Result<[&mut MediaEndpoint; 2], MepError> {
        self.endpoints
            .get_disjoint_mut([a, b])
            .ok_or(MepError::StalePeer)
    }

    /// `CreateConnection(local, remote)` (§4.2).
    #[tracing::instrument(name = "MepPool::create_connection", level = "debug", skip(self), fields(?local, ?remote))]
    pub fn create_connection(&mut self, local: MepHandle, remote: MepHandle) -> SlotId {
        let Ok([local_ep, remote_ep]) = self.pair_mut(local, remote) else {
            return SlotId::NIL;
        };
        local_ep.create_connection(remote, remote_ep)
    }

    /// `ModifyConnection(local, slot, tx, rx)` (§4.2), with the
    /// per-connection trace emitted around it. Every return path — including
    /// `AccessConnection` rejecting a malformed `slot` and a stale peer
    /// handle — is traced, per §4.2 step 1 ("trace Error and return") and
    /// §7's "Error is always traced".
    #[tracing::instrument(name = "MepPool::modify_connection", level = "debug", skip(self), fields(?local, ?slot, tx, rx))]
    pub fn modify_connection(
        &mut self,
        local: MepHandle,
        slot: SlotId,
        tx: bool,
        rx: bool,
    ) -> MepResult {
        let local_psm = self.endpoints.get(local).map(MediaEndpoint::psm);

        let Some(peer_handle) = self
            .endpoints
            .get(local)
            .and_then(|ep| ep.slot(slot))
            .and_then(|s| s.peer)
        else {
            let result = MepError::InvalidSlot { slot }.into_result();
            self.trace_connection(local_psm.unwrap_or(PsmId::UNKNOWN), PsmId::UNKNOWN, tx, rx, result);
            return result;
        };

        let Ok([local_ep, peer_ep]) = self.pair_mut(local, peer_handle) else {
            let result = MepError::StalePeer.into_result();
            self.trace_connection(local_psm.unwrap_or(PsmId::UNKNOWN), PsmId::UNKNOWN, tx, rx, result);
            return result;
        };
        let result = local_ep.modify_connection(peer_ep, slot, tx, rx);

        let local_psm = local_ep.psm();
        let remote_psm = peer_ep.psm();
        self.trace_connection(local_psm, remote_psm, tx, rx, result);

        result
    }

    fn trace_connection(&self, local_psm: PsmId, remote_psm: PsmId, tx: bool, rx: bool, result: MepResult) {
        emit(&*self.tracer, self.config.tracing_enabled(), TraceTool::Connection, || {
            TraceRecord::Connection(ConnectionTrace {
                local_psm,
                remote_psm,
                tx,
                rx,
                result,
            })
        });
    }

    /// `DestroyConnection(local, slot)` (§4.2): peer-notified removal of
    /// one slot.
    #[tracing::instrument(name = "MepPool::destroy_connection", level = "debug", skip(self), fields(?local, ?slot))]
    pub fn destroy_connection(&mut self, local: MepHandle, slot: SlotId) {
        let Some(peer_handle) = self
            .endpoints
            .get(local)
            .and_then(|ep| ep.slot(slot))
            .and_then(|s| s.peer)
        else {
            return;
        };
        if let Ok([local_ep, peer_ep]) = self.pair_mut(local, peer_handle) {
            local_ep.destroy_connection(slot, peer_ep);
        }
    }

    /// `DeleteConnection(local, slot)` (§4.2): local-only removal, no peer
    /// notification.
    pub fn delete_connection(&mut self, local: MepHandle, slot: SlotId) {
        if let Some(ep) = self.endpoints.get_mut(local) {
            PeerMep::delete_connection(ep, slot);
        }
    }

    /// `UpdateConnections(local)` (§4.2): first re-establishes `local`'s own
    /// receive connection against its peer's current attributes (if it has
    /// one), then republishes `local`'s current channel attributes on every
    /// occupied slot, after a `ModifyChannel` or `EnableChannel`/
    /// `DisableChannel` changed what they would report.
    #[tracing::instrument(name = "MepPool::update_connections", level = "debug", skip(self), fields(?local))]
    pub fn update_connections(&mut self, local: MepHandle) {
        let Some(ep) = self.endpoints.get(local) else {
            return;
        };
        let rx_slot = ep.rx_slot();
        let peers: SmallVec<[(SlotId, MepHandle); 8]> = ep.occupied_slots().collect();

        if !rx_slot.is_nil() {
            if let Some(peer_handle) = ep.slot(rx_slot).and_then(|s| s.peer) {
                if let Ok([local_ep, peer_ep]) = self.pair_mut(local, peer_handle) {
                    let result = local_ep.reestablish_receive_connection(peer_ep);
                    if !result.is_ok() {
                        tracing::debug!(?local, ?peer_handle, %result, "failed to reestablish receive connection during update_connections");
                    }
                }
            }
        }

        for (slot, peer_handle) in peers {
            let Ok([local_ep, peer_ep]) = self.pair_mut(local, peer_handle) else {
                continue;
            };
            let Some(peer_slot) = local_ep.slot(slot).map(|s| s.peer_slot) else {
                continue;
            };
            let attrs = local_ep.get_channel_attributes(slot);
            let result = peer_ep.update_connection(peer_slot, attrs);
            if !result.is_ok() {
                tracing::debug!(?local, ?peer_handle, ?slot, %result, "peer declined updated channel attributes");
            }
        }
    }

    /// `DestroyConnections(local)` (§4.2): tears down every occupied slot
    /// of `local`, notifying each peer in turn.
    pub fn destroy_connections(&mut self, local: MepHandle) {
        let Some(ep) = self.endpoints.get(local) else {
            return;
        };
        let peers: SmallVec<[(SlotId, MepHandle); 8]> = ep.occupied_slots().collect();

        for (slot, peer_handle) in peers {
            if let Ok([local_ep, peer_ep]) = self.pair_mut(local, peer_handle) {
                local_ep.destroy_connection(slot, peer_ep);
            }
        }
    }

    /// `FreeConnections(local)` (§4.2): releases `local`'s gateway receive
    /// path, then pushes nil attributes to every occupied slot's peer
    /// (leaving the slot table itself untouched — [`Self::destroy_connections`]
    /// does the actual teardown). Used ahead of that call during
    /// deallocation, so every peer sees this endpoint go silent before its
    /// connections are removed out from under it. Per-peer failures are
    /// traced but do not stop the broadcast.
    #[tracing::instrument(name = "MepPool::free_connections", level = "debug", skip(self), fields(?local))]
    pub fn free_connections(&mut self, local: MepHandle) -> MepResult {
        let result = match self.endpoints.get_mut(local) {
            Some(ep) => ep.force_free_connection(),
            None => return MepResult::Ok,
        };

        let Some(ep) = self.endpoints.get(local) else {
            return result;
        };
        let peers: SmallVec<[(SlotId, MepHandle); 8]> = ep.occupied_slots().collect();
        for (slot, peer_handle) in peers {
            let Ok([local_ep, peer_ep]) = self.pair_mut(local, peer_handle) else {
                continue;
            };
            let Some(peer_slot) = local_ep.slot(slot).map(|s| s.peer_slot) else {
                continue;
            };
            let r = peer_ep.update_connection(peer_slot, ChannelAttributes::NIL);
            if !r.is_ok() {
                tracing::debug!(?local, ?peer_handle, ?slot, %r, "peer declined nil attributes during free_connections");
            }
        }
        result
    }

    /// `ModifyChannel` (subscriber-port overload) at the pool level:
    /// applies the change, emits a `ChannelTrace`, and republishes to
    /// peers if the address actually moved.
    #[tracing::instrument(name = "MepPool::modify_channel_address", level = "debug", skip(self), fields(?handle))]
    pub fn modify_channel_address(&mut self, handle: MepHandle, addr: ChannelAddress) -> MepResult {
        let Some(ep) = self.endpoints.get_mut(handle) else {
            return MepError::StalePeer.into_result();
        };
        let before = ep.user_port();
        let result = ep.apply_channel_address(addr);
        self.trace_channel(handle, result);
        if result.is_ok() && mep_core::address_changed(before, addr) {
            self.update_connections(handle);
        }
        result
    }

    /// `ModifyChannel` (ephemeral-channel overload).
    #[tracing::instrument(name = "MepPool::modify_channel_ephemeral", level = "debug", skip(self), fields(?handle))]
    pub fn modify_channel_ephemeral(
        &mut self,
        handle: MepHandle,
        channel: EphemeralChannel,
    ) -> MepResult {
        let Some(ep) = self.endpoints.get_mut(handle) else {
            return MepError::StalePeer.into_result();
        };
        let before = ep.local_channel().channel();
        let result = ep.apply_channel_ephemeral(channel);
        self.trace_channel(handle, result);
        if result.is_ok() && mep_core::channel_changed(before, channel) {
            self.update_connections(handle);
        }
        result
    }

    /// `ModifyChannel` (full-attributes overload, proxy role).
    #[tracing::instrument(name = "MepPool::modify_channel_attributes", level = "debug", skip(self), fields(?handle))]
    pub fn modify_channel_attributes(
        &mut self,
        handle: MepHandle,
        attrs: ChannelAttributes,
    ) -> MepResult {
        let Some(ep) = self.endpoints.get_mut(handle) else {
            return MepError::StalePeer.into_result();
        };
        let before = ep.local_channel();
        let result = ep.apply_channel_attributes(attrs);
        self.trace_channel(handle, result);
        if result.is_ok() && mep_core::attributes_changed(before, attrs) {
            self.update_connections(handle);
        }
        result
    }

    /// `DisableChannel` (§4.1): suppresses transmit on every connection
    /// without touching the slot table, then republishes.
    #[tracing::instrument(name = "MepPool::disable_channel", level = "debug", skip(self), fields(?handle))]
    pub fn disable_channel(&mut self, handle: MepHandle) {
        if let Some(ep) = self.endpoints.get_mut(handle) {
            ep.set_disabled(true);
        }
        self.update_connections(handle);
    }

    /// `EnableChannel` (§4.1): reverses [`Self::disable_channel`].
    #[tracing::instrument(name = "MepPool::enable_channel", level = "debug", skip(self), fields(?handle))]
    pub fn enable_channel(&mut self, handle: MepHandle) {
        if let Some(ep) = self.endpoints.get_mut(handle) {
            ep.set_disabled(false);
        }
        self.update_connections(handle);
    }

    fn trace_channel(&self, handle: MepHandle, result: MepResult) {
        let Some(ep) = self.endpoints.get(handle) else {
            return;
        };
        let psm = ep.psm();
        let channel = ep.local_channel().channel();
        let tx = ep.local_channel().tx();
        emit(&*self.tracer, self.config.tracing_enabled(), TraceTool::Channel, || {
            TraceRecord::Channel(ChannelTrace {
                psm,
                context_id: channel.context_id(),
                term_id: channel.term_id(),
                port: ep.user_port(),
                tx,
                result,
            })
        });
    }
}

/// Batches the endpoint deallocations requested during one PSM
/// transaction (§6.4), so that an endpoint is never torn down mid-step
/// while another operation in the same transaction still holds its
/// handle — teardown is deferred to [`Transaction::commit`].
#[derive(Default)]
pub struct Transaction {
    disposal: Vec<MepHandle>,
}

impl Transaction {
    pub fn new() -> Self {
        Transaction::default()
    }

    /// Marks `handle` for deallocation once this transaction commits.
    pub fn enqueue(&mut self, handle: MepHandle) {
        self.disposal.push(handle);
    }

    /// Runs every endpoint's `EndOfTransaction` hook, republishing any
    /// connection parameters it requested, then drains the disposal list:
    /// free the gateway receive path, tear down every connection, and
    /// finally destroy the channel and remove the endpoint from its pool.
    pub fn commit(&mut self, pool: &mut MepPool) {
        let handles: Vec<MepHandle> = pool.endpoints.keys().collect();
        for handle in handles {
            let marker = pool
                .endpoints
                .get_mut(handle)
                .and_then(MediaEndpoint::end_of_transaction);
            if let Some(attrs) = marker {
                let _ = attrs;
                pool.update_connections(handle);
            }
        }

        for handle in self.disposal.drain(..) {
            let Some(ep) = pool.endpoints.get(handle) else {
                continue;
            };
            if !ep.state().is_idle() {
                let _ = MepError::DeallocatedWhileActive { state: ep.state() }.into_result();
            }

            let _ = pool.free_connections(handle);
            pool.destroy_connections(handle);

            if let Some(ep) = pool.endpoints.get_mut(handle) {
                let _ = ep.destroy_channel();
            }
            pool.endpoints.remove(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{EdgeGateway, GatewayClient};
    use crate::trace::NullTracer;
    use mep_core::{H248CtxtId, H248TermId};

    struct FakeClient {
        next_term: u32,
    }

    impl GatewayClient for FakeClient {
        fn allocate(&mut self) -> Result<EphemeralChannel, MepError> {
            self.next_term += 1;
            Ok(EphemeralChannel::new(
                H248CtxtId::new(1),
                H248TermId::new(self.next_term),
                ChannelAddress::NIL,
            ))
        }

        fn modify(&mut self, _channel: EphemeralChannel) -> Result<(), MepError> {
            Ok(())
        }

        fn release(&mut self, _channel: EphemeralChannel) -> Result<(), MepError> {
            Ok(())
        }

        fn connect(
            &mut self,
            _channel: EphemeralChannel,
            _peer_attrs: ChannelAttributes,
        ) -> Result<(), MepError> {
            Ok(())
        }

        fn disconnect(&mut self, _channel: EphemeralChannel) -> Result<(), MepError> {
            Ok(())
        }
    }

    fn pool_with_one_endpoint(pool: &mut MepPool, psm: u32) -> MepHandle {
        let gateway = EdgeGateway::new(FakeClient { next_term: 0 });
        let handle = pool.allocate(PsmId::new(psm), Box::new(gateway));
        let _ = pool.get_mut(handle).unwrap().create_channel();
        handle
    }

    fn new_pool() -> MepPool {
        MepPool::new(MepConfig::new(), Arc::new(NullTracer))
    }

    #[test]
    fn allocate_assigns_a_self_consistent_handle() {
        let mut pool = new_pool();
        let handle = pool_with_one_endpoint(&mut pool, 1);
        assert_eq!(pool.get(handle).unwrap().handle(), handle);
    }

    #[test]
    fn create_connection_links_both_endpoints() {
        let mut pool = new_pool();
        let a = pool_with_one_endpoint(&mut pool, 1);
        let b = pool_with_one_endpoint(&mut pool, 2);

        let slot = pool.create_connection(a, b);
        assert_eq!(slot, SlotId::new(0));
        assert_eq!(pool.get(a).unwrap().remote_connection_id(slot), SlotId::new(0));
    }

    #[test]
    fn destroy_connections_empties_the_slot_table() {
        let mut pool = new_pool();
        let a = pool_with_one_endpoint(&mut pool, 1);
        let b = pool_with_one_endpoint(&mut pool, 2);
        let slot = pool.create_connection(a, b);

        pool.destroy_connections(a);
        assert!(pool.get(a).unwrap().slot(slot).unwrap().is_free());
        assert!(pool.get(b).unwrap().slot(SlotId::new(0)).unwrap().is_free());
    }

    #[test]
    fn transaction_commit_removes_idle_endpoint() {
        let mut pool = new_pool();
        let a = pool_with_one_endpoint(&mut pool, 1);

        let mut txn = Transaction::new();
        txn.enqueue(a);
        txn.commit(&mut pool);

        assert!(pool.get(a).is_none());
    }

    #[test]
    fn disable_then_enable_round_trips_tx_attribute() {
        let mut pool = new_pool();
        let a = pool_with_one_endpoint(&mut pool, 1);
        let b = pool_with_one_endpoint(&mut pool, 2);
        let slot = pool.create_connection(a, b);
        pool.modify_connection(a, slot, true, false);

        pool.disable_channel(a);
        assert!(pool.get(a).unwrap().is_disabled());
        assert!(pool.get(a).unwrap().get_channel_attributes(slot).is_nil());

        pool.enable_channel(a);
        assert!(!pool.get(a).unwrap().is_disabled());
    }

    #[test]
    fn free_connections_pushes_nil_attributes_to_every_peer() {
        let mut pool = new_pool();
        let a = pool_with_one_endpoint(&mut pool, 1);
        let b = pool_with_one_endpoint(&mut pool, 2);
        let slot_a = pool.create_connection(a, b);
        let slot_b = pool.get(a).unwrap().remote_connection_id(slot_a);
        pool.modify_connection(a, slot_a, true, true);
        pool.modify_connection(b, slot_b, true, true);
        assert!(!pool.get(b).unwrap().remote_channel().is_nil());

        pool.free_connections(a);

        assert!(pool.get(b).unwrap().remote_channel().is_nil());
        // the slot table itself is untouched by FreeConnections.
        assert!(!pool.get(a).unwrap().slot(slot_a).unwrap().is_free());
        assert!(!pool.get(b).unwrap().slot(slot_b).unwrap().is_free());
    }

    struct CountingClient {
        next_term: u32,
        connect_calls: std::sync::Arc<std::sync::atomic::AtomicU32>,
    }

    impl GatewayClient for CountingClient {
        fn allocate(&mut self) -> Result<EphemeralChannel, MepError> {
            self.next_term += 1;
            Ok(EphemeralChannel::new(
                H248CtxtId::new(1),
                H248TermId::new(self.next_term),
                ChannelAddress::NIL,
            ))
        }

        fn modify(&mut self, _channel: EphemeralChannel) -> Result<(), MepError> {
            Ok(())
        }

        fn release(&mut self, _channel: EphemeralChannel) -> Result<(), MepError> {
            Ok(())
        }

        fn connect(
            &mut self,
            _channel: EphemeralChannel,
            _peer_attrs: ChannelAttributes,
        ) -> Result<(), MepError> {
            self.connect_calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }

        fn disconnect(&mut self, _channel: EphemeralChannel) -> Result<(), MepError> {
            Ok(())
        }
    }

    #[test]
    fn update_connections_reestablishes_the_receive_connection() {
        let mut pool = new_pool();
        let connect_calls = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let gateway = EdgeGateway::new(CountingClient {
            next_term: 0,
            connect_calls: connect_calls.clone(),
        });
        let a = pool.allocate(PsmId::new(1), Box::new(gateway));
        let _ = pool.get_mut(a).unwrap().create_channel();
        let b = pool_with_one_endpoint(&mut pool, 2);

        let slot_a = pool.create_connection(a, b);
        let slot_b = pool.get(a).unwrap().remote_connection_id(slot_a);
        pool.modify_connection(a, slot_a, true, true);
        pool.modify_connection(b, slot_b, true, true);
        assert_eq!(connect_calls.load(std::sync::atomic::Ordering::SeqCst), 1);

        pool.update_connections(a);
        assert_eq!(
            connect_calls.load(std::sync::atomic::Ordering::SeqCst),
            2,
            "UpdateConnections must reestablish the receive connection via MakeReceiveConnection"
        );
    }
}
