//! Line-oriented host driver for `metro_core`.
//!
//! # Responsibility
//! - Start logging under the workspace log dir, so store open is logged.
//! - Attach the workspace given as the first argument (or run detached).
//! - Read one JSON message per stdin line, dispatch it through a session,
//!   and print each resulting effect as one JSON line on stdout.

use log::{info, warn};
use metro_core::{
    init_logging, HostEffect, LayoutStore, LoggingConfig, MetroSession, WorkspacePaths,
};
use std::io::{self, BufRead, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    let root = std::env::args().nth(1);
    let store = match root.as_deref() {
        Some(root) => {
            let paths = WorkspacePaths::for_root(root);
            if let Err(err) = init_logging(&LoggingConfig::new(paths.log_dir)) {
                eprintln!("metro_cli: logging disabled: {err}");
            }
            LayoutStore::open(root)
        }
        None => LayoutStore::detached(),
    };
    info!(
        "event=cli_start module=cli status=ok version={} attached={}",
        metro_core::core_version(),
        root.is_some()
    );

    let mut session = MetroSession::new(store);
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!("event=cli_read module=cli status=error error={}", err);
                return ExitCode::FAILURE;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        for effect in session.handle_message(&line) {
            if let Err(err) = write_effect(&mut stdout, &effect) {
                eprintln!("metro_cli: {err}");
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}

fn write_effect(out: &mut impl Write, effect: &HostEffect) -> io::Result<()> {
    let json = serde_json::to_string(effect).map_err(io::Error::other)?;
    writeln!(out, "{json}")?;
    out.flush()
}
