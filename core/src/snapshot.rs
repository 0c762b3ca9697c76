// SPDX-License-Identifier: MPL-2.0

//! Save-state support.
//!
//! A save state is a 4-byte little-endian layout [`Version`] followed by the drive's fields, encoded
//! with bincode using fixed-width little-endian integers. The mounted disc itself is not saved;
//! whoever restores a state mounts the same image first.

use std::fmt;

use bincode::config::{Configuration, Fixint, LittleEndian};
use gdrom_disc::{DiscType, Subchannel};
use gdrom_sched::{EventRecord, Scheduler};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{Drive, Error};

const CONFIG: Configuration<LittleEndian, Fixint> =
    bincode::config::standard().with_little_endian().with_fixed_int_encoding();

/// The version of the save-state layout.
///
/// Readers branch on this to accept states written before a field existed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(u32);

impl Version {
    /// The first layout.
    pub const INITIAL: Self = Self(1);
    /// The pending disc-swap event is recorded after the drive's own fields.
    pub const SCHED_EVENTS: Self = Self(2);
    /// The layout written by this build.
    pub const CURRENT: Self = Self::SCHED_EVENTS;

    /// Validates a raw version number read from a save state.
    pub fn new(raw: u32) -> Result<Self, Error> {
        if (Self::INITIAL.0..=Self::CURRENT.0).contains(&raw) {
            Ok(Self(raw))
        } else {
            Err(Error::UnsupportedVersion(raw))
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[derive(Serialize, Deserialize)]
struct Persisted {
    placeholder: DiscType,
    #[serde(with = "serde_arrays")]
    subchannel: Subchannel,
}

/// Everything read back for one drive, checked but not yet applied.
struct Restored {
    persisted: Persisted,
    /// Absent from states written before scheduler events were saved.
    swap_timer: Option<EventRecord>,
}

fn encode<T: Serialize>(value: &T, out: &mut Vec<u8>) -> Result<(), Error> {
    bincode::serde::encode_into_std_write(value, out, CONFIG)?;

    Ok(())
}

/// Decodes one `T` off the front of `input`, advancing it past what was read.
fn decode<T: DeserializeOwned>(input: &mut &[u8]) -> Result<T, Error> {
    let slice: &[u8] = *input;
    let (value, read) = bincode::serde::decode_from_slice(slice, CONFIG)?;
    *input = &slice[read..];

    Ok(value)
}

impl Drive {
    /// Appends the drive's state, laid out as of `version`, to `out`.
    pub fn save<C>(&self, sched: &Scheduler<C>, version: Version, out: &mut Vec<u8>) -> Result<(), Error> {
        encode(&Persisted { placeholder: self.placeholder, subchannel: self.subchannel }, out)?;
        if version >= Version::SCHED_EVENTS {
            encode(&sched.save(self.swap_timer), out)?;
        }

        Ok(())
    }

    /// Reads back the drive's state, laid out as of `version`, from the front of `input`.
    ///
    /// Nothing changes unless the whole drive state is read successfully.
    pub fn load<C>(
        &mut self,
        sched: &mut Scheduler<C>,
        version: Version,
        input: &mut &[u8],
    ) -> Result<(), Error> {
        let restored = Self::read(version, input)?;
        self.apply(restored, sched);

        Ok(())
    }

    /// Writes a complete save state holding only this drive.
    pub fn save_state<C>(&self, sched: &Scheduler<C>) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        encode(&Version::CURRENT.get(), &mut out)?;
        self.save(sched, Version::CURRENT, &mut out)?;

        Ok(out)
    }

    /// Restores a state written by [`Drive::save_state`].
    pub fn load_state<C>(&mut self, sched: &mut Scheduler<C>, mut state: &[u8]) -> Result<(), Error> {
        let version = Version::new(decode(&mut state)?)?;
        let restored = Self::read(version, &mut state)?;
        if !state.is_empty() {
            return Err(Error::TrailingBytes(state.len()));
        }
        tracing::debug!("Loaded {} drive state", version);
        self.apply(restored, sched);

        Ok(())
    }

    fn read(version: Version, input: &mut &[u8]) -> Result<Restored, Error> {
        let persisted = decode(input)?;
        let swap_timer = if version >= Version::SCHED_EVENTS {
            Some(decode(input)?)
        } else {
            None
        };

        Ok(Restored { persisted, swap_timer })
    }

    fn apply<C>(&mut self, restored: Restored, sched: &mut Scheduler<C>) {
        self.placeholder = restored.persisted.placeholder;
        self.subchannel = restored.persisted.subchannel;

        match restored.swap_timer {
            Some(record) => {
                sched.restore(self.swap_timer, &record);
                self.swap_pending = record.remaining.is_some();
            }
            None => {
                sched.request(self.swap_timer, None);
                self.swap_pending = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use gdrom_sched::SH4_MAIN_CLOCK;
    use rand::Rng as _;

    use super::*;
    use crate::{tests::drive as new_drive, Config, Sense};

    #[test]
    fn pending_swap_survives_round_trip() {
        let (mut drive, mut sched) = new_drive(Config::default());
        drive.insert_disk(Path::new("game.gdi"), &mut sched).unwrap();
        sched.advance(SH4_MAIN_CLOCK / 4, &mut drive);
        let state = drive.save_state(&sched).unwrap();

        // A fresh machine, booted with the same disc and partway through a different swap.
        let (mut restored, mut sched) = new_drive(Config::default());
        restored.insert_disk(Path::new("game.gdi"), &mut sched).unwrap();
        sched.advance(1_000, &mut restored);
        restored.load_state(&mut sched, &state).unwrap();

        sched.advance(SH4_MAIN_CLOCK * 3 / 4 - 1, &mut restored);
        assert_eq!(DiscType::Busy, restored.disc_type());

        sched.advance(1, &mut restored);
        assert_eq!(DiscType::GdRom, restored.disc_type());
        assert_eq!(Sense::MEDIUM_CHANGED, restored.sense());
    }

    #[test]
    fn current_layout_is_fixed_width() {
        let (mut drive, mut sched) = new_drive(Config::default());
        drive.insert_disk(Path::new("game.gdi"), &mut sched).unwrap();
        drive.subchannel[0] = 0x5a;
        let state = drive.save_state(&sched).unwrap();

        // Version, placeholder, subchannel, then the event record: tag, option tag, remaining.
        assert_eq!(4 + 4 + 96 + 4 + 1 + 8, state.len());
        assert_eq!([2, 0, 0, 0], state[..4]);
        assert_eq!(DiscType::NoDisk.code().to_le_bytes(), state[4..8]);
        assert_eq!(0x5a, state[8]);
        assert_eq!([0, 0, 0, 0, 1], state[104..109]);
        assert_eq!(SH4_MAIN_CLOCK.to_le_bytes(), state[109..]);
    }

    #[test]
    fn subchannel_and_placeholder_are_restored() {
        let (mut drive, mut sched) = new_drive(Config::default());
        drive.open_lid(&mut sched);
        rand::thread_rng().fill(&mut drive.subchannel[..]);
        let state = drive.save_state(&sched).unwrap();

        let (mut restored, mut sched) = new_drive(Config::default());
        restored.load_state(&mut sched, &state).unwrap();

        assert_eq!(drive.subchannel, restored.subchannel);
        assert!(restored.is_open());
        assert_eq!(DiscType::Open, restored.disc_type());
    }

    #[test]
    fn initial_layout_cancels_pending_swap() {
        let (mut drive, mut sched) = new_drive(Config::default());
        let mut state = Vec::new();
        encode(&Version::INITIAL.get(), &mut state).unwrap();
        drive.save(&sched, Version::INITIAL, &mut state).unwrap();
        // Header, placeholder, subchannel, and nothing else.
        assert_eq!(4 + 4 + 96, state.len());

        drive.insert_disk(Path::new("game.gdi"), &mut sched).unwrap();
        drive.load_state(&mut sched, &state).unwrap();

        assert_eq!(DiscType::GdRom, drive.disc_type());
        sched.advance(SH4_MAIN_CLOCK, &mut drive);
        // The timer never fired.
        assert_eq!(Sense::BECOMING_READY, drive.sense());
    }

    #[test]
    fn load_reads_only_its_own_fields() {
        let (mut drive, mut sched) = new_drive(Config::default());
        drive.open_lid(&mut sched);
        let mut state = Vec::new();
        drive.save(&sched, Version::CURRENT, &mut state).unwrap();
        state.extend_from_slice(b"next device");

        let (mut restored, mut sched) = new_drive(Config::default());
        let mut input = state.as_slice();
        restored.load(&mut sched, Version::CURRENT, &mut input).unwrap();

        assert_eq!(b"next device", input);
        assert!(restored.is_open());
    }

    #[test]
    fn corrupt_state_changes_nothing() {
        let (mut drive, mut sched) = new_drive(Config::default());
        drive.insert_disk(Path::new("game.gdi"), &mut sched).unwrap();

        let mut state = drive.save_state(&sched).unwrap();
        // An unknown disc type.
        state[4] = 0x7f;
        assert!(matches!(drive.load_state(&mut sched, &state), Err(Error::StateDecode(_))));

        let mut state = drive.save_state(&sched).unwrap();
        state[0] = 9;
        assert!(matches!(drive.load_state(&mut sched, &state), Err(Error::UnsupportedVersion(9))));

        let mut state = drive.save_state(&sched).unwrap();
        state.push(0);
        assert!(matches!(drive.load_state(&mut sched, &state), Err(Error::TrailingBytes(1))));

        assert!(matches!(drive.load_state(&mut sched, &state[..50]), Err(Error::StateDecode(_))));
        assert!(matches!(drive.load_state(&mut sched, &[]), Err(Error::StateDecode(_))));

        assert_eq!(DiscType::Busy, drive.disc_type());
        assert_eq!(SH4_MAIN_CLOCK, sched.remaining(drive.swap_timer).unwrap());
    }
}
