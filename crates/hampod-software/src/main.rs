// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HAMPOD software binary.
//!
//! Connects to a running firmware process over the named pipes and runs
//! the user-interaction logic.
//!
//! ```bash
//! hampod-software --config /etc/hampod.conf
//! hampod-software --no-radio        # bench run without a rig attached
//! ```

use clap::Parser;
use hampod_software::app::{self, AppOptions};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// HAMPOD software - modes, radio control and configuration
#[derive(Parser, Debug)]
#[command(name = "hampod-software")]
#[command(about = "HAMPOD software process - user interaction logic")]
#[command(version)]
struct Args {
    /// Directory holding the named pipes
    #[arg(long, default_value = "/tmp/hampod")]
    pipe_dir: PathBuf,

    /// Configuration file path
    #[arg(long, default_value = "hampod.conf")]
    config: PathBuf,

    /// Skip radio initialization
    #[arg(long)]
    no_radio: bool,

    /// Log filter (trace, debug, info, warn, error); RUST_LOG overrides
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Legacy positional; anything starting with `n` means no-radio
    #[arg(value_name = "MODE")]
    positional: Option<String>,
}

fn main() {
    let args = Args::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(args.log_level.as_str()),
    )
    .init();

    let no_radio = args.no_radio
        || args
            .positional
            .as_deref()
            .is_some_and(|p| p.starts_with('n'));

    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        // First signal raises the flag; a second one terminates outright.
        if let Err(e) =
            signal_hook::flag::register_conditional_shutdown(signal, 1, Arc::clone(&shutdown))
        {
            log::warn!("[APP] signal setup failed: {}", e);
        }
        let _ = signal_hook::flag::register(signal, Arc::clone(&shutdown));
    }

    let options = AppOptions {
        pipe_dir: args.pipe_dir,
        config_path: args.config,
        no_radio,
    };

    match app::run(&options, &shutdown) {
        Ok(()) => log::info!("[APP] clean shutdown"),
        Err(e) => {
            log::error!("[APP] init failed: {}", e);
            std::process::exit(1);
        }
    }
}
