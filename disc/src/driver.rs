// SPDX-License-Identifier: MPL-2.0

//! Turning image files into [`Disc`]s.
//!
//! Each supported container format has a [`FormatDriver`]. A [`Dispatcher`] holds them in
//! priority order and offers a path to each in turn until one accepts it.

mod raw;

use std::path::Path;

pub use raw::Raw;

use crate::{Disc, Error};

/// The outcome of offering an image to a [`FormatDriver`].
#[derive(Debug)]
pub enum Probe {
    Parsed(Disc),
    /// The image is not in this driver's format. The next driver gets a turn.
    NotRecognized,
}

pub trait FormatDriver: Send + Sync {
    /// A short name for log messages.
    fn name(&self) -> &'static str;

    /// Parses the image at `path`.
    ///
    /// If `digest` is given, the driver appends whatever bytes identify the disc's content to it.
    /// An error means the image is in this driver's format but could not be loaded; the
    /// [`Dispatcher`] does not try other drivers after one.
    fn try_parse(&self, path: &Path, digest: Option<&mut Vec<u8>>) -> Result<Probe, Error>;
}

/// The registered format drivers, in the order they are tried.
pub struct Dispatcher {
    drivers: Vec<Box<dyn FormatDriver>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        // The raw driver only looks at extensions and sizes, so it goes last.
        Self::new(vec![Box::new(Raw)])
    }
}

impl Dispatcher {
    pub fn new(drivers: Vec<Box<dyn FormatDriver>>) -> Self {
        Self { drivers }
    }

    /// Registers a driver to be tried after those already registered.
    pub fn push(&mut self, driver: Box<dyn FormatDriver>) {
        self.drivers.push(driver);
    }

    pub fn driver_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.drivers.iter().map(|driver| driver.name())
    }

    /// Opens the image at `path` with the first driver that recognizes it.
    pub fn open_disc(&self, path: &Path, mut digest: Option<&mut Vec<u8>>) -> Result<Disc, Error> {
        for driver in self.drivers.iter() {
            // A driver that declines may have appended to the digest before giving up.
            if let Some(digest) = digest.as_deref_mut() {
                digest.clear();
            }

            match driver.try_parse(path, digest.as_deref_mut())? {
                Probe::Parsed(disc) => {
                    tracing::debug!("{} driver parsed '{}'", driver.name(), path.display());

                    return Ok(disc);
                }
                Probe::NotRecognized => {
                    tracing::debug!("{} driver declined '{}'", driver.name(), path.display());
                }
            }
        }

        Err(Error::UnknownFormat)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;
    use crate::{
        track::{ctrl, InMemory, SectorFormat},
        DiscType,
        Track,
    };

    /// Accepts images whose file name ends in `suffix`.
    struct BySuffix {
        suffix: &'static str,
        kind: DiscType,
    }

    impl FormatDriver for BySuffix {
        fn name(&self) -> &'static str {
            self.suffix
        }

        fn try_parse(&self, path: &Path, digest: Option<&mut Vec<u8>>) -> Result<Probe, Error> {
            if let Some(digest) = digest {
                digest.extend_from_slice(self.suffix.as_bytes());
            }
            if !path.to_string_lossy().ends_with(self.suffix) {
                return Ok(Probe::NotRecognized);
            }

            let track = Track::new(
                ctrl::DATA,
                150,
                150,
                Box::new(InMemory::new(SectorFormat::Mode1, 150, vec![0; 2048])),
            );

            Disc::new(self.kind, vec![track], Track::lead_out(ctrl::DATA, 151)).map(Probe::Parsed)
        }
    }

    struct Broken;

    impl FormatDriver for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn try_parse(&self, path: &Path, _: Option<&mut Vec<u8>>) -> Result<Probe, Error> {
            Err(Error::Io {
                path: path.display().to_string(),
                source: std::io::ErrorKind::InvalidData.into(),
            })
        }
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(vec![
            Box::new(BySuffix { suffix: ".gdi", kind: DiscType::GdRom }),
            Box::new(BySuffix { suffix: ".cue", kind: DiscType::CdRom }),
        ])
    }

    #[test]
    fn first_accepting_driver_wins() {
        let mut digest = Vec::new();
        let disc = dispatcher().open_disc(Path::new("game.cue"), Some(&mut digest)).unwrap();

        assert_eq!(DiscType::CdRom, disc.kind());
        // Whatever the declining driver appended is gone.
        assert_eq!(b".cue", digest.as_slice());
    }

    #[test]
    fn unknown_when_every_driver_declines() {
        assert!(matches!(
            dispatcher().open_disc(Path::new("game.chd"), None),
            Err(Error::UnknownFormat),
        ));
    }

    #[test]
    fn driver_errors_stop_the_search() {
        let mut dispatcher = Dispatcher::new(vec![Box::new(Broken)]);
        dispatcher.push(Box::new(BySuffix { suffix: ".gdi", kind: DiscType::GdRom }));

        assert!(matches!(
            dispatcher.open_disc(Path::new("game.gdi"), None),
            Err(Error::Io { .. }),
        ));
        assert_eq!(vec!["broken", ".gdi"], dispatcher.driver_names().collect::<Vec<_>>());
    }

    #[test]
    fn default_dispatcher_opens_iso_images() {
        let mut file = tempfile::Builder::new().suffix(".iso").tempfile().unwrap();
        file.write_all(&[0x5a; 2048 * 4]).unwrap();

        let disc = Dispatcher::default().open_disc(file.path(), None).unwrap();

        assert_eq!(DiscType::CdRom, disc.kind());
        assert_eq!(153, disc.tracks()[0].end_fad);
    }
}
