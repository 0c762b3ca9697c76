// SPDX-License-Identifier: MPL-2.0

//! Tracks and the storage behind them.

use std::io;

use derivative::Derivative;

/// The size of the largest physical sector layout: a raw frame followed by its subchannel.
pub const MAX_SECTOR_SIZE: usize = 2448;

/// The 12-byte sync pattern that opens every raw data frame.
pub const SYNC: [u8; 12] = [0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00];

pub mod ctrl {
    //! Track control flags.
    //!
    //! These occupy the upper nibble of the first byte of every TOC entry.

    /// Audio recorded with pre-emphasis.
    pub const PRE_EMPHASIS: u8 = 0x1;
    pub const COPY_PERMITTED: u8 = 0x2;
    /// The track holds data rather than audio.
    pub const DATA: u8 = 0x4;
    pub const FOUR_CHANNEL: u8 = 0x8;
}

/// The physical layout a track stores its sectors in.
///
/// This describes the storage, not what the host controller asks for; see
/// [`crate::sector::convert`] for the translation between the two.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SectorFormat {
    /// Complete 2352-byte frames: sync, header, user data and error correction.
    Raw,
    /// 2336-byte mode-2 sectors, i.e., raw frames without sync and header.
    Mode2,
    /// 2048 bytes of mode-1 user data.
    Mode1,
    /// 2048 bytes of mode-2 form-1 user data.
    Mode2Form1,
    /// Raw frames each followed by 96 bytes of subchannel data.
    RawWithSubchannel,
}

impl SectorFormat {
    /// The number of bytes one sector occupies in storage.
    pub const fn size(self) -> usize {
        match self {
            Self::Raw => 2352,
            Self::Mode2 => 2336,
            Self::Mode1 | Self::Mode2Form1 => 2048,
            Self::RawWithSubchannel => MAX_SECTOR_SIZE,
        }
    }
}

/// Backing storage for a track.
pub trait TrackFile: Send {
    /// Reads the sector at `fad` into the start of `dst` and reports the layout it was stored in.
    ///
    /// Only called for addresses inside the owning track.
    fn read(&mut self, fad: u32, dst: &mut [u8; MAX_SECTOR_SIZE]) -> io::Result<SectorFormat>;
}

impl Track {
    pub fn new(ctrl: u8, start_fad: u32, end_fad: u32, file: Box<dyn TrackFile>) -> Self {
        Self { ctrl, start_fad, end_fad, file: Some(file) }
    }

    /// Creates the lead-out marker. It has no storage behind it and claims no sectors.
    pub fn lead_out(ctrl: u8, start_fad: u32) -> Self {
        Self { ctrl, start_fad, end_fad: start_fad, file: None }
    }
}

/// A contiguous range of sectors on a disc.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Track {
    /// Control flags; see [`ctrl`].
    pub ctrl: u8,
    pub start_fad: u32,
    /// The last FAD in this track (inclusive).
    pub end_fad: u32,
    #[derivative(Debug = "ignore")]
    file: Option<Box<dyn TrackFile>>,
}

impl Track {
    pub fn contains(&self, fad: u32) -> bool {
        (self.start_fad..=self.end_fad).contains(&fad)
    }

    pub fn is_data(&self) -> bool {
        self.ctrl & ctrl::DATA != 0
    }

    /// Reads the sector at `fad`, or returns `None` if this track does not hold it.
    pub fn read(
        &mut self,
        fad: u32,
        dst: &mut [u8; MAX_SECTOR_SIZE],
    ) -> io::Result<Option<SectorFormat>> {
        match self.file.as_mut() {
            Some(file) if self.start_fad <= fad && fad <= self.end_fad => file.read(fad, dst).map(Some),
            _ => Ok(None),
        }
    }
}

impl InMemory {
    /// Wraps `data`, a run of sectors in `format` whose first sector sits at `first_fad`.
    pub fn new(format: SectorFormat, first_fad: u32, data: Vec<u8>) -> Self {
        Self { format, first_fad, data }
    }
}

/// Track storage held entirely in memory.
pub struct InMemory {
    format: SectorFormat,
    first_fad: u32,
    data: Vec<u8>,
}

impl InMemory {
    pub fn sector_count(&self) -> usize {
        self.data.len() / self.format.size()
    }
}

impl TrackFile for InMemory {
    fn read(&mut self, fad: u32, dst: &mut [u8; MAX_SECTOR_SIZE]) -> io::Result<SectorFormat> {
        let size = self.format.size();
        let start = fad
            .checked_sub(self.first_fad)
            .map(|index| index as usize * size)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "FAD precedes track data"))?;
        let sector = self
            .data
            .get(start..(start + size))
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))?;
        dst[..size].copy_from_slice(sector);

        Ok(self.format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lead_out_holds_no_sectors() {
        let mut lead_out = Track::lead_out(ctrl::DATA, 1_000);
        let mut buf = [0; MAX_SECTOR_SIZE];

        assert!(lead_out.contains(1_000));
        assert_eq!(None, lead_out.read(1_000, &mut buf).unwrap());
    }

    #[test]
    fn reads_only_inside_its_range() {
        let data: Vec<u8> = (0..3).flat_map(|i| vec![i as u8; 2048]).collect();
        let mut track = Track::new(
            ctrl::DATA,
            150,
            152,
            Box::new(InMemory::new(SectorFormat::Mode1, 150, data)),
        );
        let mut buf = [0; MAX_SECTOR_SIZE];

        assert_eq!(Some(SectorFormat::Mode1), track.read(152, &mut buf).unwrap());
        assert_eq!(2, buf[0]);
        assert_eq!(None, track.read(149, &mut buf).unwrap());
        assert_eq!(None, track.read(153, &mut buf).unwrap());
        assert!(track.is_data());
    }

    #[test]
    fn short_storage_is_an_io_error() {
        let mut file = InMemory::new(SectorFormat::Raw, 150, vec![0; 2352]);
        let mut buf = [0; MAX_SECTOR_SIZE];

        assert_eq!(1, file.sector_count());
        assert!(file.read(151, &mut buf).is_err());
    }
}
