// canlink/src/rx.rs
//
// Implements the background receive loop for the Rust 'canlink' library.
//
// This file is part of the Rust 'canlink' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! The cancellable receive loop.
//!
//! [`ReceiveLoop`] turns raw frames from a [`FrameSource`] into values in
//! a caller-owned bounded queue. It is designed to run on its own
//! dedicated thread ([`spawn`](ReceiveLoop::spawn)) and is driven by a
//! shared running flag:
//!
//! - The loop waits for readability with a bounded timeout (100 ms by
//!   default) and re-checks the flag after every wait, so clearing the
//!   flag stops it within one interval.
//! - A full queue is not an error. The newest frame is dropped, the drop
//!   is reported, and the loop keeps going. The loop never blocks on
//!   queue space and never grows the queue.
//! - A failed read is fatal. The loop reports it once through the
//!   injected [`RxEventHandler`], clears its own running flag (and the
//!   optional consumer flag), and exits. The endpoint stays open; whether
//!   to reopen is the caller's call.
//!
//! Exactly one loop may run per endpoint. The driver does not police
//! this; the single-ownership convention does.

use crate::{
    errors::Error,
    frame::CanFrame,
    socket::{CanBus, ShouldRetry},
};
use libc::canid_t;
use log::{error, info, warn};
use nix::{
    errno::Errno,
    poll::{poll, PollFd, PollFlags, PollTimeout},
};
use std::{
    io,
    os::unix::io::AsFd,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{SyncSender, TrySendError},
        Arc,
    },
    thread,
    time::Duration,
};

/// How long the loop waits for readability before re-checking its
/// running flag. Short enough for acceptable shutdown latency, long
/// enough not to busy-spin.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Something the receive loop can read frames from.
///
/// [`CanBus`] is the real implementation; the trait exists so the loop
/// can be exercised against any pollable descriptor that speaks the CAN
/// wire format.
pub trait FrameSource: AsFd {
    /// The device name, for diagnostics.
    fn device(&self) -> &str;

    /// Reads exactly one frame.
    fn recv_frame(&self) -> io::Result<CanFrame>;
}

impl FrameSource for CanBus {
    fn device(&self) -> &str {
        CanBus::device(self)
    }

    fn recv_frame(&self) -> io::Result<CanFrame> {
        CanBus::recv_frame(self)
    }
}

/// Receiver for the loop's diagnostic events.
///
/// Injected at construction; the loop never looks anything up at
/// runtime. All methods default to no-ops, and every event is also
/// logged through the `log` facade regardless of the handler.
pub trait RxEventHandler: Send {
    /// A read failed and the loop is going down. Called exactly once,
    /// from the receive thread, just before it exits.
    fn read_error(&self, _err: &Error) {}

    /// The queue was full and a frame was discarded. `id` is the
    /// dropped frame's identifier.
    fn message_dropped(&self, _id: canid_t) {}
}

/// The receive loop for one endpoint.
///
/// Holds the source, the caller's queue handle, the shared running flag
/// and the optional extras configured through the builder methods.
pub struct ReceiveLoop<S> {
    source: Arc<S>,
    queue: SyncSender<CanFrame>,
    running: Arc<AtomicBool>,
    consumer_running: Option<Arc<AtomicBool>>,
    handler: Option<Box<dyn RxEventHandler>>,
    poll_interval: Duration,
}

impl<S: FrameSource> ReceiveLoop<S> {
    /// Creates a receive loop over `source`, delivering into `queue` and
    /// running for as long as `running` stays true.
    ///
    /// `running` is shared-write: the caller clears it to cancel, and the
    /// loop clears it itself when a fatal read error forces it down.
    pub fn new(source: Arc<S>, queue: SyncSender<CanFrame>, running: Arc<AtomicBool>) -> Self {
        Self {
            source,
            queue,
            running,
            consumer_running: None,
            handler: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// A second flag the loop clears when it dies on a read error, so
    /// that queue consumers stop promptly instead of waiting on a queue
    /// that will never fill again.
    ///
    /// The flag is untouched by ordinary cancellation; a caller shutting
    /// everything down is expected to clear both flags itself.
    pub fn consumer_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.consumer_running = Some(flag);
        self
    }

    /// Installs the diagnostic event receiver.
    pub fn event_handler<H: RxEventHandler + 'static>(mut self, handler: H) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Overrides the readiness-wait interval.
    ///
    /// This bounds both the shutdown latency and the poll rate; values
    /// near zero make the loop spin.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Runs the loop on the current thread until cancelled or failed.
    ///
    /// Cancellation leaves the endpoint open and the queue untouched;
    /// close and drain are the caller's separate decisions.
    pub fn run(self) {
        let device = self.source.device().to_owned();
        let timeout = PollTimeout::from(self.poll_interval.as_millis().min(u16::MAX as u128) as u16);

        info!("CAN receive loop started on '{}'", device);

        while self.running.load(Ordering::Acquire) {
            let mut fds = [PollFd::new(self.source.as_fd(), PollFlags::POLLIN)];
            match poll(&mut fds, timeout) {
                // nothing readable within the interval; re-check the flag
                Ok(0) => continue,
                Ok(_) => (),
                Err(Errno::EINTR) => continue,
                Err(errno) => {
                    self.fail(&device, io::Error::from(errno));
                    break;
                }
            }

            match self.source.recv_frame() {
                Ok(frame) => match self.queue.try_send(frame) {
                    Ok(()) => (),
                    Err(TrySendError::Full(frame)) => {
                        let id = frame.raw_id();
                        warn!(
                            "the receive queue on '{}' is full, discarding CAN frame [id: 0x{:04X}]",
                            device, id
                        );
                        if let Some(handler) = &self.handler {
                            handler.message_dropped(id);
                        }
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        // the consumer hung up; treat it as cancellation
                        info!("the receive queue consumer for '{}' is gone, stopping", device);
                        self.running.store(false, Ordering::Release);
                        break;
                    }
                },
                Err(ref err) if err.should_retry() => continue,
                Err(err) => {
                    self.fail(&device, err);
                    break;
                }
            }
        }

        info!("CAN receive loop on '{}' stopped", device);
    }

    /// A read went bad: report once, signal everyone, and let the loop
    /// exit.
    fn fail(&self, device: &str, source: io::Error) {
        let err = Error::ReceiveFatal {
            device: device.to_owned(),
            source,
        };
        error!("{}", err);

        self.running.store(false, Ordering::Release);
        if let Some(flag) = &self.consumer_running {
            flag.store(false, Ordering::Release);
        }
        if let Some(handler) = &self.handler {
            handler.read_error(&err);
        }
    }
}

impl<S: FrameSource + Send + Sync + 'static> ReceiveLoop<S> {
    /// Runs the loop on its own dedicated, named thread.
    ///
    /// Join the handle after clearing the running flag; the thread exits
    /// within one poll interval.
    pub fn spawn(self) -> io::Result<thread::JoinHandle<()>> {
        let name = format!("can-rx-{}", self.source.device());
        thread::Builder::new().name(name).spawn(move || self.run())
    }
}
