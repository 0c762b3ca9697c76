// SPDX-License-Identifier: MPL-2.0

//! What the host controller reads back after a command.

use gdrom_disc::DiscType;

/// A sense key plus its additional sense code and qualifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Sense {
    pub key: u8,
    pub asc: u8,
    pub ascq: u8,
}

impl Sense {
    pub const NONE: Self = Self::new(0, 0, 0);
    /// Not ready: the drive is becoming ready.
    pub const BECOMING_READY: Self = Self::new(2, 0x04, 0x01);
    /// Unit attention: the medium may have changed.
    pub const MEDIUM_CHANGED: Self = Self::new(6, 0x28, 0);
    /// Unit attention: power-on or reset occurred, so the TOC may be invalid.
    pub const RESET: Self = Self::new(6, 0x29, 0);

    pub const fn new(key: u8, asc: u8, ascq: u8) -> Self {
        Self { key, asc, ascq }
    }
}

/// The drive status code reported in the controller's status register.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    Busy = 0,
    Pause = 1,
    Standby = 2,
    Play = 3,
    Seek = 4,
    Scan = 5,
    Open = 6,
    #[default]
    NoDisc = 7,
    Retry = 8,
    Error = 9,
}

impl Status {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// The status to report once `kind` becomes visible to the guest.
    pub(crate) fn after_disc_change(self, kind: DiscType) -> Self {
        match kind {
            DiscType::NoDisk => Self::NoDisc,
            DiscType::Open => Self::Open,
            DiscType::Busy => Self::Busy,
            // A drive that was spinning up pauses on the disc; an idle one stands by.
            _ if self == Self::Busy => Self::Pause,
            _ => Self::Standby,
        }
    }
}
