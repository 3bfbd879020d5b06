use std::fmt;

/// A gateway-assigned context identifier within an `EphemeralChannel`.
///
/// Both this and [`H248TermId`] being zero denotes the nil channel; the
/// values themselves are opaque to the media endpoint and are never
/// interpreted, only compared and forwarded.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct H248CtxtId(u32);

impl H248CtxtId {
    pub const NIL: H248CtxtId = H248CtxtId(0);

    pub const fn new(value: u32) -> Self {
        H248CtxtId(value)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn is_nil(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for H248CtxtId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for H248CtxtId {
    fn from(value: u32) -> Self {
        H248CtxtId(value)
    }
}

/// A gateway-assigned termination identifier within an `EphemeralChannel`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct H248TermId(u32);

impl H248TermId {
    pub const NIL: H248TermId = H248TermId(0);

    pub const fn new(value: u32) -> Self {
        H248TermId(value)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn is_nil(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for H248TermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for H248TermId {
    fn from(value: u32) -> Self {
        H248TermId(value)
    }
}

/// A connection-slot index inside a media endpoint's slot table.
///
/// Signed to carry the `NIL = -1` sentinel the way the slot table itself
/// does; valid occupied ids are always `>= 0`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(i16);

impl SlotId {
    pub const NIL: SlotId = SlotId(-1);

    pub const fn new(index: i16) -> Self {
        SlotId(index)
    }

    pub const fn is_nil(self) -> bool {
        self.0 < 0
    }

    /// Returns the index into a slot table, or `None` for `NIL`.
    pub const fn index(self) -> Option<usize> {
        if self.0 < 0 { None } else { Some(self.0 as usize) }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nil() {
            write!(f, "nil")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl TryFrom<usize> for SlotId {
    type Error = std::num::TryFromIntError;

    fn try_from(index: usize) -> Result<Self, Self::Error> {
        i16::try_from(index).map(SlotId)
    }
}
