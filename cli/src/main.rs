// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mounts a disc image in an emulated GD-ROM drive and queries it the way a guest would.

mod log;

use std::{
    cell::Cell,
    fs::File,
    io::{BufWriter, Write as _},
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use gdrom::{disc::Progress, Area, Config, Drive, DriveState, Scheduler, SectorRequest};

/// Sectors read per step of a dump.
const DUMP_CHUNK: u32 = 256;

#[derive(Parser)]
#[command(version, about = "Inspect disc images through an emulated GD-ROM drive", long_about = None)]
struct Args {
    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emulated cycles between closing the lid and the disc becoming readable.
    #[arg(long, global = true)]
    swap_delay: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Describe the disc: type, tracks, sessions and content digest.
    Info { image: PathBuf },
    /// Print the table of contents of one area.
    Toc {
        image: PathBuf,
        #[arg(long, value_enum, default_value_t = AreaArg::Single)]
        area: AreaArg,
    },
    /// Read a run of sectors into a file.
    Read {
        image: PathBuf,
        #[arg(long)]
        fad: u32,
        #[arg(long)]
        count: u32,
        /// Bytes per sector in the output.
        #[arg(long, default_value_t = 2048, value_parser = parse_sector_size)]
        format: usize,
        /// Stop at the first sector no track holds instead of writing silence for it.
        #[arg(long)]
        stop_on_miss: bool,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Read the whole recorded area into a file.
    Dump {
        image: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, default_value_t = 2048, value_parser = parse_sector_size)]
        format: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum AreaArg {
    Single,
    Double,
}

impl From<AreaArg> for Area {
    fn from(arg: AreaArg) -> Self {
        match arg {
            AreaArg::Single => Area::SingleDensity,
            AreaArg::Double => Area::DoubleDensity,
        }
    }
}

fn parse_sector_size(arg: &str) -> Result<usize, String> {
    match arg.parse() {
        Ok(size @ (2048 | 2328 | 2336 | 2340 | 2352)) => Ok(size),
        _ => Err(format!("'{arg}' is not one of 2048, 2328, 2336, 2340 or 2352")),
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    log::init(args.verbose);

    let mut config = Config {
        compute_digest: matches!(args.command, Command::Info { .. }),
        ..Config::default()
    };
    if let Some(swap_delay) = args.swap_delay {
        config.swap_delay = swap_delay;
    }

    match args.command {
        Command::Info { image } => with_disc(&image, config, info),
        Command::Toc { image, area } => with_disc(&image, config, |drive| toc(drive, area.into())),
        Command::Read { image, fad, count, format, stop_on_miss, output } => {
            let req = SectorRequest { fad, count, sector_size: format, stop_on_miss };

            with_disc(&image, config, |drive| read(drive, req, &output))
        }
        Command::Dump { image, output, format } => {
            with_disc(&image, config, |drive| dump(drive, format, &output))
        }
    }
}

/// Mounts `image`, waits out the disc swap, and hands the drive to `f`.
fn with_disc(
    image: &Path,
    config: Config,
    f: impl FnOnce(&mut Drive) -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    let mut sched = Scheduler::new();
    let mut drive = Drive::new(config, &mut sched);

    drive
        .insert_disk(image, &mut sched)
        .with_context(|| format!("Failed to mount '{}'", image.display()))?;
    sched.advance(config.swap_delay, &mut drive);
    anyhow::ensure!(drive.state() == DriveState::Ready, "Drive did not become ready");

    let result = f(&mut drive);
    drive.shutdown(&mut sched);

    result
}

fn info(drive: &mut Drive) -> anyhow::Result<()> {
    let disc = drive.disc().context("No disc mounted")?;

    println!("type: {:?} ({:#04x})", disc.kind(), disc.kind().code());
    for (i, track) in disc.tracks().iter().enumerate() {
        println!(
            "track {:2}: {} ctrl={:#x} FAD {}..={}",
            i + 1,
            if track.is_data() { "data " } else { "audio" },
            track.ctrl,
            track.start_fad,
            track.end_fad,
        );
    }
    println!("lead-out: FAD {}", disc.lead_out().start_fad);
    for (i, session) in disc.sessions().iter().enumerate() {
        println!(
            "session {}: first track {}, FAD {}",
            i + 1,
            session.first_track,
            session.start_fad,
        );
    }
    if let Some(digest) = drive.content_digest() {
        let hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
        println!("sha256: {hex}");
    }

    Ok(())
}

fn toc(drive: &mut Drive, area: Area) -> anyhow::Result<()> {
    let toc = drive.toc(area);
    let label = |slot: usize| match slot {
        99 => "first".to_string(),
        100 => "last".to_string(),
        101 => "lead-out".to_string(),
        _ => format!("track {}", slot + 1),
    };

    for (slot, word) in toc.iter().enumerate() {
        if *word != u32::MAX {
            println!("{:>9}: {:02x?}", label(slot), word.to_le_bytes());
        }
    }

    Ok(())
}

fn read(drive: &mut Drive, req: SectorRequest, output: &Path) -> anyhow::Result<()> {
    let file = File::create(output)
        .with_context(|| format!("Failed to create '{}'", output.display()))?;
    let mut out = BufWriter::new(file);
    let mut buf = vec![0; DUMP_CHUNK as usize * req.sector_size];

    let mut done = 0;
    while done < req.count {
        let count = DUMP_CHUNK.min(req.count - done);
        let chunk = SectorRequest { fad: req.fad.wrapping_add(done), count, ..req };

        let read = drive
            .read_sector(chunk, &mut buf)
            .with_context(|| format!("Failed to read sectors at FAD {}", chunk.fad))?;
        out.write_all(&buf[..(read as usize * req.sector_size)])
            .with_context(|| format!("Failed to write '{}'", output.display()))?;
        done += read;
        if read < count {
            break;
        }
    }
    out.flush().with_context(|| format!("Failed to write '{}'", output.display()))?;
    tracing::info!("Wrote {} of {} sectors to '{}'", done, req.count, output.display());

    Ok(())
}

fn dump(drive: &mut Drive, sector_size: usize, output: &Path) -> anyhow::Result<()> {
    let disc = drive.disc().context("No disc mounted")?;
    let start = disc.tracks().first().map_or(0, |track| track.start_fad);
    let total = disc.lead_out().start_fad.saturating_sub(start);

    let file = File::create(output)
        .with_context(|| format!("Failed to create '{}'", output.display()))?;
    let mut out = BufWriter::new(file);
    let progress = Logged::new(total);
    let mut buf = vec![0; DUMP_CHUNK as usize * sector_size];

    let mut done = 0;
    while done < total {
        let count = DUMP_CHUNK.min(total - done);
        let req = SectorRequest { fad: start + done, count, sector_size, stop_on_miss: false };
        progress.begin_chunk(done, count);

        drive
            .read_sector_with_progress(req, &mut buf, Some(&progress))
            .with_context(|| format!("Failed to read sectors at FAD {}", req.fad))?;
        out.write_all(&buf[..req.len()]).context("Failed to write dump")?;
        done += count;
    }
    out.flush().context("Failed to write dump")?;
    tracing::info!("Dumped {} sectors to '{}'", total, output.display());

    Ok(())
}

/// Logs overall progress in steps of ten percent.
struct Logged {
    total: u32,
    chunk_start: Cell<u32>,
    chunk_len: Cell<u32>,
    last_step: Cell<Option<u32>>,
}

impl Logged {
    fn new(total: u32) -> Self {
        Self {
            total,
            chunk_start: Cell::new(0),
            chunk_len: Cell::new(0),
            last_step: Cell::new(None),
        }
    }

    fn begin_chunk(&self, start: u32, len: u32) {
        self.chunk_start.set(start);
        self.chunk_len.set(len);
    }
}

impl Progress for Logged {
    fn is_cancelled(&self) -> bool {
        false
    }

    fn update(&self, label: &str, fraction: f32) {
        let done = self.chunk_start.get() as f32 + fraction * self.chunk_len.get() as f32;
        let overall = done / self.total.max(1) as f32;
        let step = (overall * 10.0) as u32;

        if self.last_step.get() != Some(step) {
            self.last_step.set(Some(step));
            tracing::info!("{} {:3.0}%", label, overall * 100.0);
        }
    }
}
