// sidcan/src/bin/sidtext.rs

//! Command line tool to put text on the SID.
//!
//! Reads lines from stdin and shows them on the display like a two-line
//! terminal: each new line goes to the bottom row, and the line that was
//! there scrolls up to the top row. The display is blanked on exit, which
//! is at the end of input or on Ctrl-C.
//!
//! ```text
//! $ journalctl -f -o cat | sidtext can0
//! ```

use anyhow::{anyhow, Context, Result};
use clap::{arg, value_parser, ArgAction, ArgMatches, Command};
use log::{error, info};
use sidcan::{dump, DriverConfig, SidDriver, Transport};
use std::{
    io::{self, BufRead},
    process,
    sync::mpsc,
    thread,
    time::Duration,
};

// Make the app version the same as the package.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// What the main loop reacts to.
enum Event {
    /// A line of text was read.
    Line(String),
    /// The input ended.
    Eof,
    /// The user hit Ctrl-C.
    Interrupt,
}

// --------------------------------------------------------------------------

/// Feeds the lines from stdin to the display until the input ends or the
/// user interrupts, then shuts the driver down.
fn scroll<T: Transport + Send + 'static>(sid: SidDriver<T>) -> Result<()> {
    let (tx, rx) = mpsc::channel();

    let int_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = int_tx.send(Event::Interrupt);
    })
    .context("Installing the Ctrl-C handler")?;

    // The reader stays blocked on stdin after an interrupt. That's fine,
    // since the process exits right after.
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(Event::Line(line)).is_err() {
                        return;
                    }
                }
                Err(err) => {
                    error!("Reading stdin: {}", err);
                    break;
                }
            }
        }
        let _ = tx.send(Event::Eof);
    });

    let mut last = String::new();
    for event in rx {
        match event {
            Event::Line(line) => {
                sid.set_text(&last, &line);
                last = line;
            }
            Event::Eof => {
                info!("End of input");
                break;
            }
            Event::Interrupt => {
                info!("Interrupted");
                break;
            }
        }
    }

    let stats = sid.stats();
    sid.shutdown().context("Shutting down the display driver")?;
    info!(
        "Sent {} bursts, {} failed",
        stats.bursts_sent, stats.bursts_failed
    );
    Ok(())
}

fn run(opts: &ArgMatches) -> Result<()> {
    let iface = opts
        .get_one::<String>("iface")
        .ok_or_else(|| anyhow!("Need to specify a CAN interface (-? for help)."))?;

    let interval = opts
        .get_one::<u64>("interval")
        .map(|ms| Duration::from_millis(*ms))
        .unwrap_or(sidcan::driver::DEFAULT_REFRESH_INTERVAL);
    let timeout = opts
        .get_one::<u64>("timeout")
        .map(|ms| Duration::from_millis(*ms));

    let config = DriverConfig::new().refresh_interval(interval);

    if opts.get_flag("dump") {
        let wtr = dump::Writer::new(io::stdout(), iface);
        let sid = SidDriver::with_config(wtr, config)?;
        scroll(sid)
    } else {
        let sid = SidDriver::open_with_config(iface, timeout, config)
            .with_context(|| format!("Failed to start the display on {}", iface))?;
        scroll(sid)
    }
}

// --------------------------------------------------------------------------

fn main() {
    env_logger::init();

    let opts = Command::new("sidtext")
        .version(VERSION)
        .about("Show lines from stdin on the SID over a CAN bus")
        .disable_help_flag(true)
        .arg(
            arg!(--help "Print help information")
                .short('?')
                .action(ArgAction::Help)
                .global(true),
        )
        .arg(
            arg!(<iface> "The CAN interface to use, like 'can0', 'vcan0', etc")
                .required(true)
                .index(1),
        )
        .arg(
            arg!(-t --timeout <ms> "Give up sending a frame after this many milliseconds")
                .required(false)
                .value_parser(value_parser!(u64)),
        )
        .arg(
            arg!(-i --interval <ms> "Milliseconds between refreshes of the display")
                .required(false)
                .value_parser(value_parser!(u64)),
        )
        .arg(
            arg!(-d --dump "Print the frames in candump format instead of sending them")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    if let Err(err) = run(&opts) {
        eprintln!("{:#}", err);
        process::exit(1);
    }
}
