// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! An emulated GD-ROM drive.
//!
//! The [`Drive`] owns the mounted [`Disc`] and everything the host controller can observe about
//! it: the guest-visible disc type, the sense triple, the status code, and the Q subchannel of
//! the most recent sector read. Disc changes are not instantaneous. After the lid closes, the
//! drive reports itself busy until a timer on the emulated-cycle [`Scheduler`] fires, just as a
//! real drive needs time to spin up.
//!
//! A drive is driven from a single emulation thread. The scheduler context `C` handed to
//! [`Drive::new`] must give the timer callback access to the drive through [`AsMut`].

mod sense;
mod snapshot;

use std::path::{Path, PathBuf};

pub use gdrom_disc::{self as disc, Area, Disc, DiscType, SectorRequest, TOC_LEN};
use gdrom_disc::{toc::EMPTY_TOC, Dispatcher, Progress, Subchannel, SUBCHANNEL_SIZE};
pub use gdrom_sched::{self as sched, Scheduler, SH4_MAIN_CLOCK};
use gdrom_sched::Handle;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

pub use sense::{Sense, Status};
pub use snapshot::Version;

/// The tag of the disc-swap timer.
const SWAP_TAG: i32 = 0;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("This media cannot be loaded: '{}'", .path.display())]
    MediaCannotBeLoaded {
        path: PathBuf,
        #[source]
        source: gdrom_disc::Error,
    },
    #[error(transparent)]
    Disc(#[from] gdrom_disc::Error),
    #[error("failed to write save state: {0}")]
    StateEncode(#[from] bincode::error::EncodeError),
    #[error("bad save state: {0}")]
    StateDecode(#[from] bincode::error::DecodeError),
    #[error("save state version {0} is not supported")]
    UnsupportedVersion(u32),
    #[error("{0} bytes left over after the save state")]
    TrailingBytes(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Emulated cycles between the lid closing and the disc becoming readable.
    pub swap_delay: u64,
    /// Whether to fingerprint the content of each mounted image.
    pub compute_digest: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self { swap_delay: SH4_MAIN_CLOCK, compute_digest: false }
    }
}

/// The state of the drive as a whole, derived from what it holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DriveState {
    NoDisc,
    /// The lid is open.
    Open,
    /// The lid has closed and the disc-swap timer is running.
    Busy,
    /// A disc is mounted and readable.
    Ready,
}

pub struct Drive {
    config: Config,
    dispatcher: Dispatcher,
    disc: Option<Disc>,
    /// The disc type reported while no disc is mounted.
    placeholder: DiscType,
    subchannel: Subchannel,
    swap_timer: Handle,
    swap_pending: bool,
    sense: Sense,
    status: Status,
    content_path: Option<PathBuf>,
    content_digest: Option<[u8; 32]>,
}

impl AsMut<Drive> for Drive {
    fn as_mut(&mut self) -> &mut Drive {
        self
    }
}

fn on_swap_timer<C: AsMut<Drive>>(ctx: &mut C, _: i32) -> Option<u64> {
    ctx.as_mut().finish_swap();

    None
}

impl Drive {
    /// Creates an empty drive whose swap timer lives on `sched`.
    pub fn new<C: AsMut<Drive>>(config: Config, sched: &mut Scheduler<C>) -> Self {
        Self::with_dispatcher(config, Dispatcher::default(), sched)
    }

    /// Like [`Drive::new`], but opening images with the given format drivers.
    pub fn with_dispatcher<C: AsMut<Drive>>(
        config: Config,
        dispatcher: Dispatcher,
        sched: &mut Scheduler<C>,
    ) -> Self {
        let swap_timer = sched.register(SWAP_TAG, on_swap_timer::<C>);

        Self {
            config,
            dispatcher,
            disc: None,
            placeholder: DiscType::NoDisk,
            subchannel: [0; SUBCHANNEL_SIZE],
            swap_timer,
            swap_pending: false,
            sense: Sense::NONE,
            status: Status::NoDisc,
            content_path: None,
            content_digest: None,
        }
    }

    /// Unmounts the disc and releases the swap timer.
    pub fn shutdown<C>(mut self, sched: &mut Scheduler<C>) {
        self.term_drive(sched);
        sched.unregister(self.swap_timer);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> DriveState {
        if self.swap_pending {
            DriveState::Busy
        } else if self.disc.is_some() {
            DriveState::Ready
        } else if self.is_open() {
            DriveState::Open
        } else {
            DriveState::NoDisc
        }
    }

    /// The path of the mounted image.
    pub fn content_path(&self) -> Option<&Path> {
        self.content_path.as_deref()
    }

    /// The SHA-256 of the mounted image's identifying bytes, if [`Config::compute_digest`] is set.
    pub fn content_digest(&self) -> Option<&[u8; 32]> {
        self.content_digest.as_ref()
    }

    pub fn sense(&self) -> Sense {
        self.sense
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// The disc format nibble of the controller's status register.
    pub fn disc_format(&self) -> u8 {
        (self.disc_type().code() >> 4) as u8
    }

    /// The mounted disc, even while the guest cannot see it yet.
    pub fn disc(&self) -> Option<&Disc> {
        self.disc.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.disc.is_none() && self.placeholder == DiscType::Open
    }

    pub fn is_loaded(&self) -> bool {
        self.disc.is_some()
    }
}

// Control.
impl Drive {
    /// Mounts the image at `path` at power-on.
    ///
    /// An empty path boots an empty drive, which still spins up and then reports a reset. An
    /// image that fails to load is not an error here: the drive comes up without a disc at once,
    /// with no swap timer and the sense left as it was.
    pub fn init_drive<C>(&mut self, path: &Path, sched: &mut Scheduler<C>) {
        if let Err(err) = self.swap_disc(path, sched) {
            tracing::warn!("Starting without a disc: {}", err);
            self.publish();

            return;
        }
        self.begin_spin_up(sched);
    }

    /// Closes the lid on the image at `path`.
    ///
    /// An empty path closes the lid on an empty drive.
    pub fn insert_disk<C>(&mut self, path: &Path, sched: &mut Scheduler<C>) -> Result<(), Error> {
        if let Err(source) = self.swap_disc(path, sched) {
            self.publish();

            return Err(Error::MediaCannotBeLoaded { path: path.to_owned(), source });
        }
        self.begin_spin_up(sched);

        Ok(())
    }

    /// Opens the lid, ejecting whatever disc is mounted.
    pub fn open_lid<C>(&mut self, sched: &mut Scheduler<C>) {
        self.term_drive(sched);
        self.content_path = None;
        self.placeholder = DiscType::Open;
        self.publish();
        tracing::info!("Lid opened");
    }

    /// Unmounts the disc and cancels any disc swap in progress.
    pub fn term_drive<C>(&mut self, sched: &mut Scheduler<C>) {
        sched.request(self.swap_timer, None);
        self.swap_pending = false;
        self.content_digest = None;
        if let Some(disc) = self.disc.take() {
            tracing::info!("Unmounted {:?} disc", disc.kind());
        }
    }

    fn swap_disc<C>(&mut self, path: &Path, sched: &mut Scheduler<C>) -> Result<(), gdrom_disc::Error> {
        self.term_drive(sched);
        self.content_path = None;
        self.placeholder = DiscType::NoDisk;
        if path.as_os_str().is_empty() {
            return Ok(());
        }

        let mut digest = self.config.compute_digest.then(Vec::new);
        match self.dispatcher.open_disc(path, digest.as_mut()) {
            Ok(disc) => {
                tracing::info!("Opened image '{}'", path.display());
                self.content_digest = digest.map(|bytes| Sha256::digest(&bytes).into());
                self.content_path = Some(path.to_owned());
                self.disc = Some(disc);

                Ok(())
            }
            Err(err) => {
                tracing::info!("Failed to open image '{}': {}", path.display(), err);

                Err(err)
            }
        }
    }

    fn begin_spin_up<C>(&mut self, sched: &mut Scheduler<C>) {
        self.sense = Sense::BECOMING_READY;
        self.status = Status::Busy;
        self.swap_pending = true;
        sched.request(self.swap_timer, Some(self.config.swap_delay));
    }

    fn finish_swap(&mut self) {
        self.swap_pending = false;
        self.sense = if self.disc.is_some() {
            Sense::MEDIUM_CHANGED
        } else {
            Sense::RESET
        };
        self.publish();
        tracing::info!("Disc swap complete: {:?}", self.disc_type());
    }

    /// Lets the host controller see the current disc type.
    fn publish(&mut self) {
        self.status = self.status.after_disc_change(self.disc_type());
    }
}

// Guest.
impl Drive {
    /// Reads sectors into `dst`, returning how many were produced.
    ///
    /// With no disc mounted, a stop-on-miss read produces nothing and any other read produces
    /// silence.
    pub fn read_sector(&mut self, req: SectorRequest, dst: &mut [u8]) -> Result<u32, Error> {
        self.read_sector_with_progress(req, dst, None)
    }

    pub fn read_sector_with_progress(
        &mut self,
        req: SectorRequest,
        dst: &mut [u8],
        progress: Option<&dyn Progress>,
    ) -> Result<u32, Error> {
        let Some(disc) = self.disc.as_mut() else {
            if req.stop_on_miss {
                return Ok(0);
            }

            let available = dst.len();
            let out = dst.get_mut(..req.len()).ok_or(gdrom_disc::Error::BufferTooSmall {
                needed: req.len(),
                len: available,
            })?;
            out.fill(0);

            return Ok(req.count);
        };

        Ok(disc.read_sectors(req, dst, &mut self.subchannel, progress)?)
    }

    /// Copies out the subchannel of the most recent sector read.
    pub fn read_subchannel(&self, out: &mut [u8]) {
        let len = out.len().min(SUBCHANNEL_SIZE);
        out[..len].copy_from_slice(&self.subchannel[..len]);
    }

    pub fn toc(&self, area: Area) -> [u32; TOC_LEN] {
        self.disc.as_ref().map_or(EMPTY_TOC, |disc| disc.toc(area))
    }

    /// Fills in a session block. Without a disc, `out` is left as it was.
    pub fn session_info(&self, out: &mut [u8; 6], session: u8) {
        if let Some(disc) = self.disc.as_ref() {
            disc.session_info(out, session);
        }
    }

    /// The disc type the guest sees.
    ///
    /// While a disc swap is in progress this is [`DiscType::Busy`], even if the new disc is
    /// already mounted.
    pub fn disc_type(&self) -> DiscType {
        if self.swap_pending {
            return DiscType::Busy;
        }

        self.disc.as_ref().map_or(self.placeholder, Disc::kind)
    }
}
