// SPDX-License-Identifier: MPL-2.0

//! The table of contents and session blocks handed to the guest.
//!
//! A TOC is 102 words. Slots 0 through 98 describe tracks 1 through 99, slot 99 the first track
//! of the area, slot 100 the last, and slot 101 the lead-out. Unused slots hold all-ones.
//!
//! Each word is laid out in guest memory as four bytes:
//!
//! | byte | contents                                           |
//! |------|----------------------------------------------------|
//! | 0    | control flags (upper nibble), ADR (lower nibble)   |
//! | 1..4 | big-endian 24-bit FAD, or track number in byte 1   |

use crate::{track::Track, Disc, DiscType};

pub const TOC_LEN: usize = 102;

/// A TOC with no entries.
pub const EMPTY_TOC: [u32; TOC_LEN] = [u32::MAX; TOC_LEN];

const FIRST_TRACK_SLOT: usize = 99;
const LAST_TRACK_SLOT: usize = 100;
const LEAD_OUT_SLOT: usize = 101;

/// ADR 1: Q subchannel carries position information.
const ADR_POSITION: u8 = 1;

/// The two separately addressed areas of a dual-density disc.
///
/// Plain CDs only have the single-density area.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Area {
    SingleDensity,
    DoubleDensity,
}

/// Where a session starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Session {
    pub start_fad: u32,
    /// The 1-based number of the session's first track.
    pub first_track: u8,
}

/// Encodes one TOC entry.
pub fn track_info(ctrl: u8, fad: u32) -> u32 {
    let [_, hi, mid, lo] = fad.to_be_bytes();

    u32::from_le_bytes([(ctrl << 4) | ADR_POSITION, hi, mid, lo])
}

fn first_last_info(track: &Track, number: usize) -> u32 {
    // The track number goes where the high byte of the FAD would.
    track_info(track.ctrl, (number as u32) << 16)
}

impl Disc {
    /// Builds the TOC of one area.
    ///
    /// On a GD-ROM, the single-density area holds tracks 1 and 2 and the double-density area
    /// holds tracks 3 onwards. Any other disc has only a single-density area, holding every
    /// track; asking for its double-density area yields [`EMPTY_TOC`].
    pub fn toc(&self, area: Area) -> [u32; TOC_LEN] {
        let mut toc = EMPTY_TOC;

        let is_gd = self.kind() == DiscType::GdRom;
        let tracks = self.tracks();
        let (first, last) = match (area, is_gd) {
            (Area::DoubleDensity, false) => return toc,
            (Area::DoubleDensity, true) => (3, tracks.len()),
            (Area::SingleDensity, true) => (1, tracks.len().min(2)),
            (Area::SingleDensity, false) => (1, tracks.len()),
        };
        if first > last {
            tracing::warn!("{:?} area of a {}-track disc holds no tracks", area, tracks.len());
            return toc;
        }

        toc[FIRST_TRACK_SLOT] = first_last_info(&tracks[first - 1], first);
        toc[LAST_TRACK_SLOT] = first_last_info(&tracks[last - 1], last);

        let lead_out = self.lead_out();
        toc[LEAD_OUT_SLOT] = match (area, is_gd, tracks.get(1)) {
            // The single-density area of a GD-ROM ends where track 2 does, not where the disc's
            // lead-out starts.
            (Area::SingleDensity, true, Some(second)) => track_info(lead_out.ctrl, second.end_fad + 1),
            _ => track_info(lead_out.ctrl, lead_out.start_fad),
        };

        for (slot, track) in toc.iter_mut().zip(tracks).take(last).skip(first - 1) {
            *slot = track_info(track.ctrl, track.start_fad);
        }

        toc
    }

    /// Fills in the six-byte session block.
    ///
    /// Session 0 describes the disc as a whole: the session count and the FAD at which the last
    /// session ends. Session `n` gives the first track and start FAD of the `n`th session.
    pub fn session_info(&self, out: &mut [u8; 6], session: u8) {
        // Status; the controller overwrites this.
        out[0] = 2;
        out[1] = 0;

        let (count_or_track, fad) = if session == 0 {
            // Bounded at 99 by construction.
            (u8::try_from(self.sessions().len()).unwrap_or(u8::MAX), self.end_fad())
        } else if let Some(info) = self.sessions().get(usize::from(session) - 1) {
            (info.first_track, info.start_fad)
        } else {
            tracing::warn!("session {} requested of a {}-session disc", session, self.sessions().len());
            (0, 0)
        };

        let [_, hi, mid, lo] = fad.to_be_bytes();
        out[2] = count_or_track;
        out[3] = hi;
        out[4] = mid;
        out[5] = lo;
    }
}
