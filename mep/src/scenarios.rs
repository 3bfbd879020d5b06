//! End-to-end scenario tests exercising a [`MepPool`] the way a PSM host
//! would: allocate two endpoints, connect them, and drive the channel and
//! connection operations a call leg goes through.

use std::sync::Arc;

use mep_core::{ChannelAddress, ChannelAttributes, EphemeralChannel, MepResult};

use crate::config::MepConfig;
use crate::error::MepError;
use crate::gateway::{EdgeGateway, GatewayClient, ProxyGateway};
use crate::pool::{MepHandle, MepPool, Transaction};
use crate::psm::PsmId;
use crate::trace::NullTracer;

struct FakeClient {
    next_term: u32,
}

impl FakeClient {
    fn new() -> Self {
        FakeClient { next_term: 0 }
    }
}

impl GatewayClient for FakeClient {
    fn allocate(&mut self) -> Result<EphemeralChannel, MepError> {
        self.next_term += 1;
        Ok(EphemeralChannel::new(
            1.into(),
            self.next_term.into(),
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

fn new_pool() -> MepPool {
    MepPool::new(MepConfig::new(), Arc::new(NullTracer))
}

fn new_edge_endpoint(pool: &mut MepPool, psm: u32) -> MepHandle {
    let gateway = EdgeGateway::new(FakeClient::new());
    let handle = pool.allocate(PsmId::new(psm), Box::new(gateway));
    assert_eq!(pool.get_mut(handle).unwrap().create_channel(), MepResult::Ok);
    handle
}

fn new_proxy_endpoint(pool: &mut MepPool, psm: u32) -> MepHandle {
    let gateway = ProxyGateway::new(FakeClient::new());
    let handle = pool.allocate(PsmId::new(psm), Box::new(gateway));
    assert_eq!(pool.get_mut(handle).unwrap().create_channel(), MepResult::Ok);
    handle
}

/// S1: two freshly created endpoints connect and can both enable transmit.
#[test]
fn s1_basic_bidirectional_connection() {
    let mut pool = new_pool();
    let a = new_edge_endpoint(&mut pool, 1);
    let b = new_edge_endpoint(&mut pool, 2);

    let slot_a = pool.create_connection(a, b);
    assert!(!slot_a.is_nil());
    let slot_b = pool.get(a).unwrap().remote_connection_id(slot_a);

    assert_eq!(pool.modify_connection(a, slot_a, true, true), MepResult::Ok);
    assert_eq!(pool.modify_connection(b, slot_b, true, true), MepResult::Ok);

    assert!(!pool.get(a).unwrap().get_channel_attributes(slot_a).is_nil());
    assert!(!pool.get(b).unwrap().get_channel_attributes(slot_b).is_nil());
}

/// S2: a third party cannot steal an already-assigned receive slot.
#[test]
fn s2_receive_slot_is_exclusive() {
    let mut pool = new_pool();
    let a = new_edge_endpoint(&mut pool, 1);
    let b = new_edge_endpoint(&mut pool, 2);
    let c = new_edge_endpoint(&mut pool, 3);

    let slot_b = pool.create_connection(a, b);
    let slot_c = pool.create_connection(a, c);

    assert_eq!(pool.modify_connection(a, slot_b, true, true), MepResult::Ok);
    assert_eq!(
        pool.modify_connection(a, slot_c, true, true),
        MepResult::Denied
    );
}

/// S3: disabling a channel zeroes out every connection's published
/// attributes without disturbing the slot table, and enabling restores
/// them.
#[test]
fn s3_disable_enable_round_trip() {
    let mut pool = new_pool();
    let a = new_edge_endpoint(&mut pool, 1);
    let b = new_edge_endpoint(&mut pool, 2);
    let slot_a = pool.create_connection(a, b);
    pool.modify_connection(a, slot_a, true, false);

    pool.disable_channel(a);
    assert!(pool.get(a).unwrap().get_channel_attributes(slot_a).is_nil());
    assert!(!pool.get(a).unwrap().slot(slot_a).unwrap().is_free());

    pool.enable_channel(a);
    assert!(!pool.get(a).unwrap().get_channel_attributes(slot_a).is_nil());
}

/// S4: moving an endpoint's subscriber address republishes attributes to
/// every connected peer.
#[test]
fn s4_address_change_propagates_to_peers() {
    let mut pool = new_pool();
    let a = new_edge_endpoint(&mut pool, 1);
    let b = new_edge_endpoint(&mut pool, 2);
    let slot_a = pool.create_connection(a, b);
    let slot_b = pool.get(a).unwrap().remote_connection_id(slot_a);
    pool.modify_connection(a, slot_a, true, true);
    pool.modify_connection(b, slot_b, true, true);

    let before = pool.get(b).unwrap().remote_channel();
    let new_addr = ChannelAddress::new(std::net::IpAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, 9)), 4000);
    assert_eq!(pool.modify_channel_address(a, new_addr), MepResult::Ok);

    assert_eq!(pool.get(a).unwrap().user_port(), new_addr);
    let after = pool.get(b).unwrap().remote_channel();
    assert_eq!(
        before, after,
        "an address move republishes attributes but leaves the ephemeral channel identity alone"
    );
}

/// S5: destroying a connection clears both endpoints' slots and its
/// former receive side.
#[test]
fn s5_destroy_connection_clears_both_sides() {
    let mut pool = new_pool();
    let a = new_edge_endpoint(&mut pool, 1);
    let b = new_edge_endpoint(&mut pool, 2);
    let slot_a = pool.create_connection(a, b);
    let slot_b = pool.get(a).unwrap().remote_connection_id(slot_a);
    pool.modify_connection(a, slot_a, true, true);

    pool.destroy_connection(a, slot_a);

    assert!(pool.get(a).unwrap().slot(slot_a).unwrap().is_free());
    assert!(pool.get(b).unwrap().slot(slot_b).unwrap().is_free());
    assert!(pool.get(a).unwrap().rx_slot().is_nil());
}

/// S6: a transaction-deferred deallocation tears down every live
/// connection before removing the endpoint, leaving its peer's slot free.
#[test]
fn s6_transaction_commit_tears_down_before_removing() {
    let mut pool = new_pool();
    let a = new_edge_endpoint(&mut pool, 1);
    let b = new_edge_endpoint(&mut pool, 2);
    let slot_a = pool.create_connection(a, b);
    let slot_b = pool.get(a).unwrap().remote_connection_id(slot_a);
    pool.modify_connection(a, slot_a, true, true);

    let mut txn = Transaction::new();
    txn.enqueue(a);
    txn.commit(&mut pool);

    assert!(pool.get(a).is_none());
    assert!(pool.get(b).unwrap().slot(slot_b).unwrap().is_free());
}

#[test]
fn proxy_gateway_supports_full_attribute_rewrite() {
    let mut pool = new_pool();
    let a = new_proxy_endpoint(&mut pool, 1);

    let new_channel = EphemeralChannel::new(7.into(), 8.into(), ChannelAddress::NIL);
    let attrs = ChannelAttributes::new(new_channel, true);
    assert_eq!(pool.modify_channel_attributes(a, attrs), MepResult::Ok);
    assert_eq!(pool.get(a).unwrap().local_channel(), attrs);
}

#[test]
fn edge_gateway_rejects_ephemeral_channel_overload() {
    let mut pool = new_pool();
    let a = new_edge_endpoint(&mut pool, 1);
    let channel = EphemeralChannel::new(9.into(), 10.into(), ChannelAddress::NIL);
    assert_eq!(
        pool.modify_channel_ephemeral(a, channel),
        MepResult::Error
    );
}
