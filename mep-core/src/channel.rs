use std::fmt;

use crate::address::ChannelAddress;
use crate::ids::{H248CtxtId, H248TermId};

/// A gateway-allocated termination: `(contextId, terminationId, address)`.
///
/// Both ids being zero denotes the nil channel, regardless of what the
/// address field holds.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct EphemeralChannel {
    context_id: H248CtxtId,
    term_id: H248TermId,
    endpoint_addr: ChannelAddress,
}

impl EphemeralChannel {
    pub const NIL: EphemeralChannel = EphemeralChannel {
        context_id: H248CtxtId::NIL,
        term_id: H248TermId::NIL,
        endpoint_addr: ChannelAddress::NIL,
    };

    pub const fn new(
        context_id: H248CtxtId,
        term_id: H248TermId,
        endpoint_addr: ChannelAddress,
    ) -> Self {
        EphemeralChannel {
            context_id,
            term_id,
            endpoint_addr,
        }
    }

    pub const fn context_id(self) -> H248CtxtId {
        self.context_id
    }

    pub const fn term_id(self) -> H248TermId {
        self.term_id
    }

    pub const fn endpoint_addr(self) -> ChannelAddress {
        self.endpoint_addr
    }

    pub const fn is_nil(self) -> bool {
        self.context_id.is_nil() && self.term_id.is_nil()
    }
}

impl fmt::Display for EphemeralChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nil() {
            write!(f, "nil")
        } else {
            write!(
                f,
                "{}/{}@{}",
                self.context_id, self.term_id, self.endpoint_addr
            )
        }
    }
}

/// An [`EphemeralChannel`] plus this endpoint's willingness to transmit on
/// it. This is the unit of attribute exchange between peer media endpoints.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct ChannelAttributes {
    channel: EphemeralChannel,
    tx: bool,
}

impl ChannelAttributes {
    pub const NIL: ChannelAttributes = ChannelAttributes {
        channel: EphemeralChannel::NIL,
        tx: false,
    };

    pub const fn new(channel: EphemeralChannel, tx: bool) -> Self {
        ChannelAttributes { channel, tx }
    }

    pub const fn channel(self) -> EphemeralChannel {
        self.channel
    }

    pub const fn tx(self) -> bool {
        self.tx
    }

    pub fn with_tx(self, tx: bool) -> Self {
        ChannelAttributes { tx, ..self }
    }

    pub const fn is_nil(self) -> bool {
        self.channel.is_nil() && !self.tx
    }
}

impl fmt::Display for ChannelAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nil() {
            write!(f, "nil")
        } else {
            write!(f, "{}[tx={}]", self.channel, self.tx)
        }
    }
}

/// Whether a channel or attribute change is semantically significant enough
/// to republish to peers.
pub fn channel_changed(before: EphemeralChannel, after: EphemeralChannel) -> bool {
    before.endpoint_addr() != after.endpoint_addr()
        || before.term_id() != after.term_id()
        || before.context_id() != after.context_id()
}

/// Subscriber-port form of the change test (§4.1 `ChannelChanged`, address form).
pub fn address_changed(before: ChannelAddress, after: ChannelAddress) -> bool {
    before.port() != after.port() || before.addr() != after.addr()
}

/// Full-attributes form of the change test (§4.1 `ChannelChanged`, attributes form).
pub fn attributes_changed(before: ChannelAttributes, after: ChannelAttributes) -> bool {
    before.tx() != after.tx() || channel_changed(before.channel(), after.channel())
}
