// SPDX-License-Identifier: MPL-2.0

//! Sector reads and layout conversion.
//!
//! Tracks store sectors in one of a handful of physical layouts ([`SectorFormat`]); the host
//! controller asks for them at one of a handful of sizes:
//!
//! | size | contents                                        |
//! |------|-------------------------------------------------|
//! | 2352 | the full raw frame                              |
//! | 2340 | everything after the 12-byte sync               |
//! | 2336 | everything after sync and header                |
//! | 2328 | everything after sync, header and subheader     |
//! | 2048 | user data only                                  |

use crate::{
    progress::Progress,
    track::{SectorFormat, MAX_SECTOR_SIZE},
    Disc,
    Error,
};

pub const SUBCHANNEL_SIZE: usize = 96;

/// The subchannel data of the most recently read sector.
pub type Subchannel = [u8; SUBCHANNEL_SIZE];

const RAW_SIZE: usize = SectorFormat::Raw.size();

/// Offset of the mode byte within a raw frame's header.
const MODE_OFFSET: usize = 15;

/// Translates one stored sector into the layout of `dst`, whose length is the requested sector
/// size.
///
/// The subchannel of a [`SectorFormat::RawWithSubchannel`] sector is split off into `subchannel`
/// before the raw frame is converted; every other layout clears `subchannel`.
///
/// Returns `false` if no conversion exists between the two layouts, in which case `dst` is
/// zero-filled.
pub fn convert(
    src: &[u8; MAX_SECTOR_SIZE],
    format: SectorFormat,
    dst: &mut [u8],
    subchannel: &mut Subchannel,
) -> bool {
    let format = match format {
        SectorFormat::RawWithSubchannel => {
            subchannel.copy_from_slice(&src[RAW_SIZE..(RAW_SIZE + SUBCHANNEL_SIZE)]);
            SectorFormat::Raw
        }
        other => {
            subchannel.fill(0);
            other
        }
    };

    let range = match (format, dst.len()) {
        (SectorFormat::Raw, 2352) => 0..2352,
        (SectorFormat::Raw, 2340) => 12..2352,
        (SectorFormat::Raw, 2336) => 16..2352,
        (SectorFormat::Raw, 2328) => 24..2352,
        (SectorFormat::Raw, 2048) => {
            if src[MODE_OFFSET] == 1 {
                16..2064
            } else {
                // Mode 2, either form: skip the subheader too.
                24..2072
            }
        }
        (SectorFormat::Mode2, 2336) => 0..2336,
        // Skip the mode-2 subheader.
        (SectorFormat::Mode2, 2048) => 8..2056,
        (SectorFormat::Mode1 | SectorFormat::Mode2Form1, 2048) => 0..2048,
        (SectorFormat::Mode1 | SectorFormat::Mode2Form1, 2352) => {
            tracing::info!("padding {:?} sector to 2352 bytes", format);
            dst[..2048].copy_from_slice(&src[..2048]);
            dst[2048..].fill(0);

            return true;
        }
        (format, size) => {
            tracing::warn!("cannot convert {:?} sector to {} bytes", format, size);
            dst.fill(0);

            return false;
        }
    };
    dst.copy_from_slice(&src[range]);

    true
}

/// A run of sectors to read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SectorRequest {
    pub fad: u32,
    pub count: u32,
    /// The size each sector is converted to.
    pub sector_size: usize,
    /// On reaching an address no track claims, stop early instead of substituting silence.
    pub stop_on_miss: bool,
}

impl SectorRequest {
    /// The number of bytes the request produces when it completes in full.
    pub fn len(&self) -> usize {
        self.count as usize * self.sector_size
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl Disc {
    /// Reads `req.count` sectors starting at `req.fad` into `dst`, one after the other at
    /// `req.sector_size` stride, and returns the number written.
    ///
    /// An address no track claims is logged and read as a zeroed raw frame, unless
    /// `req.stop_on_miss` is set, in which case the read ends there and everything in `dst` past
    /// the sectors already written is left alone.
    ///
    /// `subchannel` receives the subchannel of each sector in turn, so it holds that of the last
    /// one read when this returns.
    ///
    /// `progress`, if given, is polled before every sector; cancelling through it fails the read
    /// with [`Error::LoadCancelled`].
    pub fn read_sectors(
        &mut self,
        req: SectorRequest,
        dst: &mut [u8],
        subchannel: &mut Subchannel,
        progress: Option<&dyn Progress>,
    ) -> Result<u32, Error> {
        if dst.len() < req.len() {
            return Err(Error::BufferTooSmall { needed: req.len(), len: dst.len() });
        }
        if req.sector_size == 0 {
            tracing::warn!("ignoring read of zero-sized sectors at FAD {}", req.fad);

            return Ok(0);
        }

        let mut sector = [0; MAX_SECTOR_SIZE];
        for (i, out) in (0..req.count).zip(dst.chunks_exact_mut(req.sector_size)) {
            if let Some(progress) = progress {
                if progress.is_cancelled() {
                    return Err(Error::LoadCancelled);
                }
                progress.update("Loading...", i as f32 / req.count as f32);
            }

            let fad = req.fad.wrapping_add(i);
            let format = match self.read_sector(fad, &mut sector)? {
                Some(format) => format,
                None => {
                    tracing::warn!("sector read miss at FAD {}", fad);
                    if req.stop_on_miss {
                        subchannel.fill(0);

                        return Ok(i);
                    }
                    sector.fill(0);

                    SectorFormat::Raw
                }
            };

            convert(&sector, format, out, subchannel);
        }

        Ok(req.count)
    }
}
