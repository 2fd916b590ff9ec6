// canlink/src/lib.rs
//
// The main lib file for the Rust 'canlink' library.
//
// This file is part of the Rust 'canlink' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Linux SocketCAN bus driver.
//!
//! The Linux kernel exposes CAN controllers through a network-like socket
//! API (see <https://docs.kernel.org/networking/can.html>). This crate
//! wraps that API into a small driver for a single bus interface:
//!
//! - [`CanBus`] opens and owns one bound raw CAN socket for a named
//!   interface, optionally installing kernel-level acceptance filters at
//!   open time.
//! - [`CanBus::send`] writes one [`CanFrame`] synchronously, retrying
//!   short writes until the full 16-byte wire image is on the bus.
//! - [`ReceiveLoop`] is a cancellable polling loop, meant to run on its
//!   own thread, that reads frames from the bus and offers them into a
//!   caller-owned bounded queue without ever blocking on queue space.
//!
//! # A note on frames
//!
//! Every CAN 2.0 frame is an identifier plus up to 8 bytes of data. The
//! identifier word also carries the extended-format, remote-request and
//! error-frame flag bits, so received error frames travel through the
//! driver like any other frame; use [`CanFrame::is_error_frame`] and
//! [`CanError::from_frame`] to classify them on the consumer side.
//!
//! # Shutdown
//!
//! The receive loop observes a shared [`AtomicBool`](std::sync::atomic::AtomicBool)
//! running flag once per poll interval (100 ms by default). Clearing the
//! flag stops the loop within one interval. The loop clears the flag
//! itself when a fatal read error forces it down, and can additionally
//! clear a second, caller-supplied flag so that queue consumers stop
//! promptly instead of waiting on a queue that will never fill again.
//!
//! # Example
//!
//! ```no_run
//! use canlink::{CanBus, CanFilter, CanFrame, ReceiveLoop};
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::{mpsc, Arc};
//!
//! # fn main() -> canlink::Result<()> {
//! let bus = Arc::new(CanBus::open("can0", &[CanFilter::new(0x100, 0x7FF)])?);
//!
//! let (tx, rx) = mpsc::sync_channel(1024);
//! let running = Arc::new(AtomicBool::new(true));
//!
//! let handle = ReceiveLoop::new(Arc::clone(&bus), tx, Arc::clone(&running))
//!     .spawn()
//!     .expect("failed to spawn the receive thread");
//!
//! if let Some(frame) = CanFrame::from_raw_id(0x100, &[0xDE, 0xAD]) {
//!     bus.send(&frame)?;
//! }
//!
//! for frame in rx.iter().take(10) {
//!     println!("{:X}", frame);
//! }
//!
//! running.store(false, Ordering::Release);
//! handle.join().expect("receive thread panicked");
//! # Ok(())
//! # }
//! ```

pub mod addr;
pub mod errors;
pub mod filter;
pub mod frame;
pub mod id;
pub mod rx;
pub mod socket;

pub use crate::{
    addr::CanAddr,
    errors::{
        CanError, CanErrorDecodingFailure, ConstructionError, ControllerProblem, Error, Result,
    },
    filter::CanFilter,
    frame::CanFrame,
    id::{id_from_raw, CanId, IdFlags, ERR_MASK_ALL, ERR_MASK_NONE},
    rx::{FrameSource, ReceiveLoop, RxEventHandler},
    socket::{CanBus, ShouldRetry},
};

// Re-export the embedded HAL types used in the public API.
pub use embedded_can::{ExtendedId, Frame as EmbeddedFrame, Id, StandardId};

use std::{mem, slice};

/// Views any sized type as a byte slice.
///
/// Only used on the `repr(C)` kernel structs (`can_frame`, `sockaddr_can`)
/// whose wire layout is exactly their memory layout.
pub(crate) fn as_bytes<T: Sized>(val: &T) -> &[u8] {
    let sz = mem::size_of::<T>();
    unsafe { slice::from_raw_parts(val as *const T as *const u8, sz) }
}

/// Views any sized type as a mutable byte slice.
pub(crate) fn as_bytes_mut<T: Sized>(val: &mut T) -> &mut [u8] {
    let sz = mem::size_of::<T>();
    unsafe { slice::from_raw_parts_mut(val as *mut T as *mut u8, sz) }
}
