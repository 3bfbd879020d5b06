//! Value types shared by the media-endpoint subsystem: channel addresses,
//! ephemeral channels and their transmit-willingness attributes, gateway
//! identifiers, and the four-valued protocol result.
//!
//! This crate has no opinion on how endpoints are connected to each other
//! or pooled — see the `mep` crate for that.

mod address;
mod channel;
mod ids;
mod result;

pub use address::ChannelAddress;
pub use channel::{
    ChannelAttributes, EphemeralChannel, address_changed, attributes_changed, channel_changed,
};
pub use ids::{H248CtxtId, H248TermId, SlotId};
pub use result::MepResult;
