// SPDX-License-Identifier: MPL-2.0

use tracing_subscriber::{filter::LevelFilter, EnvFilter};

pub fn init(verbose: bool) {
    let level = if verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };

    tracing_subscriber::fmt()
        // `RUST_LOG` takes the usual directives; `--verbose` only moves the default.
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_ansi(true)
        .with_level(true)
        // The target is mostly just noise.
        .with_target(false)
        .without_time()
        .init();
}
