// SPDX-License-Identifier: MPL-2.0

//! Headerless single-track images.

use std::{
    fs::File,
    io::{self, BufReader, Read, Seek, SeekFrom},
    path::Path,
};

use super::{FormatDriver, Probe};
use crate::{
    track::{ctrl, SectorFormat, TrackFile, MAX_SECTOR_SIZE, SYNC},
    Disc,
    DiscType,
    Error,
    Track,
};

/// The first FAD after the two-second pregap.
const FIRST_FAD: u32 = 150;

/// The system area plus the primary volume descriptor.
const DIGEST_SECTORS: u64 = 17;

/// Offset of the mode byte within a raw frame.
const MODE_OFFSET: usize = 15;

/// Drives `.iso` (2048-byte user data) and `.bin`/`.img` (2352-byte raw frame) images.
#[derive(Clone, Copy, Debug, Default)]
pub struct Raw;

impl FormatDriver for Raw {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn try_parse(&self, path: &Path, digest: Option<&mut Vec<u8>>) -> Result<Probe, Error> {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
        let format = match extension.as_deref() {
            Some("iso") => SectorFormat::Mode1,
            Some("bin" | "img") => SectorFormat::Raw,
            _ => return Ok(Probe::NotRecognized),
        };

        let io_err = |source| Error::Io { path: path.display().to_string(), source };
        let file = File::open(path).map_err(io_err)?;
        let len = file.metadata().map_err(io_err)?.len();
        let size = format.size() as u64;
        if len == 0 || len % size != 0 {
            return Ok(Probe::NotRecognized);
        }

        let mut volume = Volume::new(BufReader::new(file), format, FIRST_FAD);
        let kind = match format {
            SectorFormat::Raw => {
                let mut frame = [0; MAX_SECTOR_SIZE];
                volume.read(FIRST_FAD, &mut frame).map_err(io_err)?;
                if frame[..SYNC.len()] != SYNC {
                    return Ok(Probe::NotRecognized);
                }

                let mode = frame[MODE_OFFSET];
                DiscType::guess(mode == 1, mode == 2, false)
            }
            _ => DiscType::CdRom,
        };

        if let Some(digest) = digest {
            volume.append_head(DIGEST_SECTORS, digest).map_err(io_err)?;
        }

        let sectors = len / size;
        let (end_fad, lead_out) = fad_span(sectors)?;
        tracing::info!(
            "'{}': {} sectors of {:?}, {:?}",
            path.display(),
            sectors,
            format,
            kind,
        );

        let track = Track::new(ctrl::DATA, FIRST_FAD, end_fad, Box::new(volume));

        Disc::new(kind, vec![track], Track::lead_out(ctrl::DATA, lead_out)).map(Probe::Parsed)
    }
}

/// The last FAD of a track of `sectors` sectors starting at [`FIRST_FAD`], and the lead-out after it.
fn fad_span(sectors: u64) -> Result<(u32, u32), Error> {
    let too_long = || Error::InvalidLayout(format!("{} sectors do not fit in a FAD", sectors));
    let last = u32::try_from(sectors.checked_sub(1).ok_or_else(too_long)?).map_err(|_| too_long())?;
    let end_fad = FIRST_FAD.checked_add(last).ok_or_else(too_long)?;
    let lead_out = end_fad.checked_add(1).ok_or_else(too_long)?;

    Ok((end_fad, lead_out))
}

impl<R> Volume<R> {
    pub fn new(reader: R, format: SectorFormat, first_fad: u32) -> Self {
        Self { reader, format, first_fad }
    }
}

/// Track storage read sector by sector out of a seekable image.
pub struct Volume<R> {
    reader: R,
    format: SectorFormat,
    first_fad: u32,
}

impl<R: Read + Seek> Volume<R> {
    /// Appends up to the first `count` sectors of the image to `out`.
    fn append_head(&mut self, count: u64, out: &mut Vec<u8>) -> io::Result<()> {
        self.reader.seek(SeekFrom::Start(0))?;
        (&mut self.reader)
            .take(count * self.format.size() as u64)
            .read_to_end(out)?;

        Ok(())
    }
}

impl<R: Read + Seek + Send> TrackFile for Volume<R> {
    fn read(&mut self, fad: u32, dst: &mut [u8; MAX_SECTOR_SIZE]) -> io::Result<SectorFormat> {
        let index = fad
            .checked_sub(self.first_fad)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "FAD precedes track data"))?;
        let size = self.format.size();

        self.reader.seek(SeekFrom::Start(u64::from(index) * size as u64))?;
        self.reader.read_exact(&mut dst[..size])?;

        Ok(self.format)
    }
}
