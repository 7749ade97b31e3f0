//! Send reliability flags.

use bitflags::bitflags;

bitflags! {
    /// Flags accepted by `send`/`broadcast`.
    ///
    /// No flags means unreliable and unsequenced.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SendFlags: u8 {
        /// Unreliable but ordered.
        const SEQUENCED = 0b0001;
        /// Reliable, always ordered.
        const RELIABLE  = 0b0010;
        /// Transmit now instead of waiting for the next poll.
        const FLUSH     = 0b0100;
    }
}

/// Delivery guarantee the transport has to provide for a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delivery {
    Unsequenced,
    Sequenced,
    Reliable,
}

impl Delivery {
    pub fn is_reliable(self) -> bool {
        matches!(self, Delivery::Reliable)
    }
}

impl SendFlags {
    pub fn delivery(self) -> Delivery {
        if self.contains(SendFlags::RELIABLE) {
            Delivery::Reliable
        } else if self.contains(SendFlags::SEQUENCED) {
            Delivery::Sequenced
        } else {
            Delivery::Unsequenced
        }
    }

    pub fn wants_flush(self) -> bool {
        self.contains(SendFlags::FLUSH)
    }
}

impl From<SendFlags> for Delivery {
    fn from(flags: SendFlags) -> Self {
        flags.delivery()
    }
}
