// canlink/src/bin/canmon.rs

//! Simple CLI tool to watch traffic on a CAN bus from the Linux command
//! line, similar to 'candump' from can-utils.

use anyhow::{Context, Result};
use canlink::{CanBus, CanFilter, ReceiveLoop};
use clap::Parser;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, RecvTimeoutError},
        Arc,
    },
    time::Duration,
};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// The CAN interface to use, like 'can0', 'vcan0', etc
    interface: String,

    /// Acceptance filters as id:mask pairs, e.g. 0x100:0x7FF.
    /// No filters means all frames are shown.
    #[arg(short, long = "filter", value_name = "ID:MASK", value_parser = parse_filter)]
    filters: Vec<CanFilter>,

    /// Receive queue capacity
    #[arg(short, long, default_value_t = 1024)]
    queue: usize,
}

fn parse_filter(s: &str) -> Result<CanFilter, String> {
    let (id, mask) = s
        .split_once(':')
        .ok_or_else(|| format!("'{}' is not an id:mask pair", s))?;

    let parse = |v: &str| {
        let v = v.trim().trim_start_matches("0x").trim_start_matches("0X");
        u32::from_str_radix(v, 16).map_err(|e| format!("'{}': {}", v, e))
    };

    Ok(CanFilter::new(parse(id)?, parse(mask)?))
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let bus = CanBus::open(&args.interface, &args.filters)
        .with_context(|| format!("failed to open CAN interface {}", args.interface))?;
    let bus = Arc::new(bus);

    let (tx, rx) = mpsc::sync_channel(args.queue);
    let running = Arc::new(AtomicBool::new(true));

    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || flag.store(false, Ordering::Release))
        .context("failed to set the signal handler")?;

    let handle = ReceiveLoop::new(Arc::clone(&bus), tx, Arc::clone(&running))
        .spawn()
        .context("failed to spawn the receive thread")?;

    while running.load(Ordering::Acquire) {
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(frame) => println!("{}  {:X}", args.interface, frame),
            Err(RecvTimeoutError::Timeout) => (),
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    handle.join().ok();

    if let Ok(bus) = Arc::try_unwrap(bus) {
        bus.close()?;
    }
    Ok(())
}
