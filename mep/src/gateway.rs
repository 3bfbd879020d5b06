use mep_core::{ChannelAddress, ChannelAttributes, EphemeralChannel};

use crate::error::MepError;

/// The abstract wire boundary to a gateway-control protocol.
///
/// Deliberately uninterested in any specific encoding (ModifyChnl is an
/// abstract operation — subclasses translate to gateway messages, per
/// §1's non-goals): a `GatewayClient` is the capability set
/// `{allocate, modify, free, connect, disconnect}` (§9 design note) with
/// no opinion on wire format. Production hosts implement this against
/// whatever gateway-control protocol they actually speak; tests
/// substitute an in-memory fake.
pub trait GatewayClient: Send {
    /// Asks the gateway for a fresh ephemeral channel.
    fn allocate(&mut self) -> Result<EphemeralChannel, MepError>;

    /// Pushes a channel identity/address change to the gateway.
    fn modify(&mut self, channel: EphemeralChannel) -> Result<(), MepError>;

    /// Releases a previously allocated channel.
    fn release(&mut self, channel: EphemeralChannel) -> Result<(), MepError>;

    /// Establishes (or re-establishes) this endpoint's receive path against
    /// the given peer attributes.
    fn connect(&mut self, channel: EphemeralChannel, peer_attrs: ChannelAttributes) -> Result<(), MepError>;

    /// Tears down this endpoint's receive path.
    fn disconnect(&mut self, channel: EphemeralChannel) -> Result<(), MepError>;
}

/// Per-role gateway-control capability, polymorphic over
/// `{allocate, modify, free, connect, disconnect}` (§4.5, §9).
///
/// The three `modify_channel_*` methods correspond to the three
/// `ModifyChannel` overloads (subscriber port / ephemeral channel / full
/// attributes). A role that does not support an overload simply does not
/// override it — the default returns
/// [`MepError::GatewayUnsupported`], which is a type-checked "this role
/// does not do that" rather than a virtual call silently falling through
/// to a degenerate base-class stub.
pub trait GatewayControl: Send {
    fn role(&self) -> &'static str;

    fn create_channel(&mut self) -> Result<EphemeralChannel, MepError>;

    fn modify_channel_address(&mut self, _addr: ChannelAddress) -> Result<(), MepError> {
        Err(MepError::GatewayUnsupported {
            op: "modify_channel_address",
        })
    }

    fn modify_channel_ephemeral(&mut self, _channel: EphemeralChannel) -> Result<(), MepError> {
        Err(MepError::GatewayUnsupported {
            op: "modify_channel_ephemeral",
        })
    }

    fn modify_channel_attributes(&mut self, _attrs: ChannelAttributes) -> Result<(), MepError> {
        Err(MepError::GatewayUnsupported {
            op: "modify_channel_attributes",
        })
    }

    fn destroy_channel(&mut self) -> Result<(), MepError>;

    fn make_connection(&mut self, peer_attrs: ChannelAttributes) -> Result<(), MepError>;

    fn free_connection(&mut self) -> Result<(), MepError>;
}

/// A media endpoint terminating directly on a subscriber line.
///
/// Only the subscriber-port `ModifyChannel` overload is meaningful for an
/// edge role; the ephemeral-channel and full-attributes overloads are a
/// role mismatch (a proxy concern), so they are left at their default
/// `GatewayUnsupported` implementation.
pub struct EdgeGateway<C> {
    client: C,
    channel: EphemeralChannel,
}

impl<C: GatewayClient> EdgeGateway<C> {
    pub fn new(client: C) -> Self {
        EdgeGateway {
            client,
            channel: EphemeralChannel::NIL,
        }
    }
}

impl<C: GatewayClient> GatewayControl for EdgeGateway<C> {
    fn role(&self) -> &'static str {
        "edge"
    }

    fn create_channel(&mut self) -> Result<EphemeralChannel, MepError> {
        let channel = self.client.allocate()?;
        self.channel = channel;
        Ok(channel)
    }

    fn modify_channel_address(&mut self, _addr: ChannelAddress) -> Result<(), MepError> {
        self.client.modify(self.channel)
    }

    fn destroy_channel(&mut self) -> Result<(), MepError> {
        self.client.release(self.channel)?;
        self.channel = EphemeralChannel::NIL;
        Ok(())
    }

    fn make_connection(&mut self, peer_attrs: ChannelAttributes) -> Result<(), MepError> {
        self.client.connect(self.channel, peer_attrs)
    }

    fn free_connection(&mut self) -> Result<(), MepError> {
        self.client.disconnect(self.channel)
    }
}

/// A media endpoint relaying media on behalf of another session leg.
///
/// All three `ModifyChannel` overloads are meaningful in the proxy role.
pub struct ProxyGateway<C> {
    client: C,
    channel: EphemeralChannel,
}

impl<C: GatewayClient> ProxyGateway<C> {
    pub fn new(client: C) -> Self {
        ProxyGateway {
            client,
            channel: EphemeralChannel::NIL,
        }
    }
}

impl<C: GatewayClient> GatewayControl for ProxyGateway<C> {
    fn role(&self) -> &'static str {
        "proxy"
    }

    fn create_channel(&mut self) -> Result<EphemeralChannel, MepError> {
        let channel = self.client.allocate()?;
        self.channel = channel;
        Ok(channel)
    }

    fn modify_channel_address(&mut self, _addr: ChannelAddress) -> Result<(), MepError> {
        self.client.modify(self.channel)
    }

    fn modify_channel_ephemeral(&mut self, channel: EphemeralChannel) -> Result<(), MepError> {
        self.client.modify(channel)?;
        self.channel = channel;
        Ok(())
    }

    fn modify_channel_attributes(&mut self, attrs: ChannelAttributes) -> Result<(), MepError> {
        self.client.modify(attrs.channel())?;
        self.channel = attrs.channel();
        Ok(())
    }

    fn destroy_channel(&mut self) -> Result<(), MepError> {
        self.client.release(self.channel)?;
        self.channel = EphemeralChannel::NIL;
        Ok(())
    }

    fn make_connection(&mut self, peer_attrs: ChannelAttributes) -> Result<(), MepError> {
        self.client.connect(self.channel, peer_attrs)
    }

    fn free_connection(&mut self) -> Result<(), MepError> {
        self.client.disconnect(self.channel)
    }
}
