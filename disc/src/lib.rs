// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The optical disc as the drive sees it.
//!
//! A [`Disc`] is an ordered list of [`Track`]s plus a lead-out, independent of whatever image
//! container it was parsed from. Format drivers (see [`driver`]) turn a path into a `Disc`; the
//! rest of this crate reads sectors out of it in the layouts the host controller asks for and
//! summarizes it into the TOC and session blocks the guest expects.
//!
//! Addresses are FADs (frame addresses): absolute sector indices that increase monotonically from
//! the start of the recorded area. FAD 150 is the first sector after the standard two-second
//! pregap.

pub mod driver;
pub mod progress;
pub mod sector;
pub mod toc;
pub mod track;

use std::io;

use serde_repr::{Deserialize_repr, Serialize_repr};

pub use driver::{Dispatcher, FormatDriver, Probe};
pub use progress::{LoadProgress, Progress};
pub use sector::{SectorRequest, Subchannel, SUBCHANNEL_SIZE};
pub use toc::{Area, Session, TOC_LEN};
pub use track::{SectorFormat, Track, TrackFile};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Every registered format driver declined the image.
    #[error("Unknown disk format")]
    UnknownFormat,
    /// A multi-sector read was cancelled through its progress sink.
    #[error("Load cancelled")]
    LoadCancelled,
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to read sector at FAD {fad}: {source}")]
    TrackRead {
        fad: u32,
        #[source]
        source: io::Error,
    },
    #[error("a {len}-byte buffer cannot hold {needed} bytes of sectors")]
    BufferTooSmall { needed: usize, len: usize },
    #[error("invalid disc layout: {0}")]
    InvalidLayout(String),
}

/// The disc-type codes reported to the guest.
///
/// The last three are placeholders for when no readable disc is present.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u32)]
pub enum DiscType {
    CdDa = 0x00,
    CdRom = 0x10,
    CdRomXa = 0x20,
    CdRomExtra = 0x30,
    CdRomCdi = 0x40,
    GdRom = 0x80,
    NoDisk = 0x01,
    /// The lid is open.
    Open = 0x02,
    /// A disc is spinning up and cannot be read yet.
    Busy = 0x03,
}

impl DiscType {
    /// Classifies a CD by the kinds of tracks found on it.
    pub fn guess(mode1: bool, mode2: bool, audio: bool) -> Self {
        match (mode1, mode2, audio) {
            (true, false, false) => Self::CdRom,
            (_, true, _) => Self::CdRomXa,
            (true, false, true) => Self::CdRomExtra,
            _ => Self::CdRom,
        }
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    /// Whether this is one of the codes that stand in for a missing or unreadable disc.
    pub fn is_placeholder(self) -> bool {
        matches!(self, Self::NoDisk | Self::Open | Self::Busy)
    }
}

/// A logical optical disc.
#[derive(Debug)]
pub struct Disc {
    kind: DiscType,
    tracks: Vec<Track>,
    lead_out: Track,
    sessions: Vec<Session>,
    end_fad: u32,
}

impl Disc {
    /// Assembles a single-session disc.
    ///
    /// Tracks must be given in order of ascending start FAD. They may overlap; the one given last
    /// wins any address they share.
    pub fn new(kind: DiscType, tracks: Vec<Track>, lead_out: Track) -> Result<Self, Error> {
        if tracks.is_empty() {
            return Err(Error::InvalidLayout("a disc needs at least one track".into()));
        }
        // The TOC has 99 track slots.
        if tracks.len() > 99 {
            return Err(Error::InvalidLayout(format!("{} tracks do not fit in a TOC", tracks.len())));
        }
        if let Some(track) = tracks.iter().find(|track| track.end_fad < track.start_fad) {
            return Err(Error::InvalidLayout(format!(
                "track at FAD {} ends before it starts ({})",
                track.start_fad,
                track.end_fad,
            )));
        }
        if tracks.windows(2).any(|pair| pair[1].start_fad < pair[0].start_fad) {
            return Err(Error::InvalidLayout("tracks are not in ascending FAD order".into()));
        }

        let sessions = vec![Session { start_fad: tracks[0].start_fad, first_track: 1 }];
        let end_fad = lead_out.start_fad;

        Ok(Self { kind, tracks, lead_out, sessions, end_fad })
    }

    /// Replaces the session list of a multi-session disc.
    ///
    /// A session starts on a track, so there can be no more sessions than the 99 tracks a TOC holds.
    pub fn with_sessions(mut self, sessions: Vec<Session>) -> Result<Self, Error> {
        if sessions.is_empty() {
            return Err(Error::InvalidLayout("a disc needs at least one session".into()));
        }
        if sessions.len() > 99 {
            return Err(Error::InvalidLayout(format!("{} sessions do not fit in a TOC", sessions.len())));
        }
        self.sessions = sessions;

        Ok(self)
    }

    pub fn kind(&self) -> DiscType {
        self.kind
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn lead_out(&self) -> &Track {
        &self.lead_out
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// The FAD at which the last session ends.
    pub fn end_fad(&self) -> u32 {
        self.end_fad
    }

    /// Reads the raw sector at `fad` from whichever track owns it.
    ///
    /// Tracks are searched from last to first so that a later track shadows an earlier one at any
    /// address both claim. Returns `None` if no track claims `fad`.
    pub fn read_sector(
        &mut self,
        fad: u32,
        dst: &mut [u8; track::MAX_SECTOR_SIZE],
    ) -> Result<Option<SectorFormat>, Error> {
        for track in self.tracks.iter_mut().rev() {
            let format = track
                .read(fad, dst)
                .map_err(|source| Error::TrackRead { fad, source })?;
            if format.is_some() {
                return Ok(format);
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use track::{ctrl, InMemory};

    fn data_track(fill: u8, start_fad: u32, sectors: u32) -> Track {
        let data = vec![fill; SectorFormat::Raw.size() * sectors as usize];

        Track::new(
            ctrl::DATA,
            start_fad,
            start_fad + sectors - 1,
            Box::new(InMemory::new(SectorFormat::Raw, start_fad, data)),
        )
    }

    #[test]
    fn guesses_disc_type_from_track_kinds() {
        assert_eq!(DiscType::CdRom, DiscType::guess(true, false, false));
        assert_eq!(DiscType::CdRomXa, DiscType::guess(true, true, true));
        assert_eq!(DiscType::CdRomExtra, DiscType::guess(true, false, true));
        assert_eq!(DiscType::CdRom, DiscType::guess(false, false, true));
    }

    #[test]
    fn later_track_wins_overlapping_address() {
        let mut disc = Disc::new(
            DiscType::CdRom,
            vec![data_track(0xaa, 150, 100), data_track(0xbb, 200, 100)],
            Track::lead_out(ctrl::DATA, 300),
        )
        .unwrap();
        let mut buf = [0; track::MAX_SECTOR_SIZE];

        assert_eq!(Some(SectorFormat::Raw), disc.read_sector(220, &mut buf).unwrap());
        assert_eq!(0xbb, buf[0]);

        disc.read_sector(160, &mut buf).unwrap();
        assert_eq!(0xaa, buf[0]);

        assert_eq!(None, disc.read_sector(400, &mut buf).unwrap());
    }

    #[test]
    fn rejects_malformed_layouts() {
        assert!(matches!(
            Disc::new(DiscType::CdRom, vec![], Track::lead_out(ctrl::DATA, 150)),
            Err(Error::InvalidLayout(_)),
        ));
        assert!(matches!(
            Disc::new(
                DiscType::CdRom,
                vec![data_track(0, 500, 10), data_track(0, 150, 10)],
                Track::lead_out(ctrl::DATA, 510),
            ),
            Err(Error::InvalidLayout(_)),
        ));
    }

    #[test]
    fn single_session_by_default() {
        let disc = Disc::new(
            DiscType::CdRom,
            vec![data_track(0, 150, 10)],
            Track::lead_out(ctrl::DATA, 160),
        )
        .unwrap();

        assert_eq!(&[Session { start_fad: 150, first_track: 1 }], disc.sessions());
        assert_eq!(160, disc.end_fad());
    }

    #[test]
    fn session_count_is_bounded() {
        let disc = || {
            Disc::new(DiscType::CdRom, vec![data_track(0, 150, 10)], Track::lead_out(ctrl::DATA, 160))
                .unwrap()
        };
        let sessions = |n: u32| {
            (0..n).map(|i| Session { start_fad: 150 + i, first_track: 1 }).collect::<Vec<_>>()
        };

        assert!(matches!(disc().with_sessions(vec![]), Err(Error::InvalidLayout(_))));
        assert!(matches!(disc().with_sessions(sessions(256)), Err(Error::InvalidLayout(_))));
        assert!(matches!(disc().with_sessions(sessions(100)), Err(Error::InvalidLayout(_))));
        assert_eq!(99, disc().with_sessions(sessions(99)).unwrap().sessions().len());
    }
}
