// canlink/src/errors.rs
//
// Implements the error types for the Rust 'canlink' library.
//
// This file is part of the Rust 'canlink' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Driver and bus errors.
//!
//! [`Error`] is the taxonomy for everything the driver itself can fail
//! at: opening, filtering, transmitting, receiving and closing. Every
//! variant names the device and wraps the originating [`io::Error`], so
//! the raw OS error code is always recoverable via [`Error::os_error`].
//!
//! [`CanError`] is different in kind: it describes a fault *on the bus*,
//! decoded from an error frame the kernel delivered through the receive
//! path. To get error frames at all, the error filter must be enabled on
//! the socket; [`CanBus::open`](crate::CanBus::open) enables bus-off and
//! controller-status reporting by default, best effort.
//!
//! The class bits of an error frame live in the ID word, and some classes
//! carry detail in the data bytes:
//!
//! ```text
//! Controller Problem (0x004) => data[1]
//! Protocol Violation (0x008) => data[2]
//! ```
//!
//! See the kernel header
//! [linux/can/error.h](https://raw.githubusercontent.com/torvalds/linux/master/include/uapi/linux/can/error.h)
//! for the full story.

use crate::frame::CanFrame;
use embedded_can::Frame as EmbeddedFrame;
use libc::canid_t;
use std::{error, fmt, io};

/// A result alias for driver operations.
pub type Result<T> = std::result::Result<T, Error>;

// ===== Error =====

/// Errors raised by the driver itself.
///
/// The setup variants are fatal to [`CanBus::open`](crate::CanBus::open):
/// no endpoint is returned. `Transmit` is fatal only to the single send
/// call that raised it. `ReceiveFatal` terminates the receive loop but
/// leaves the endpoint open.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The raw CAN socket could not be created.
    #[error("unable to create the unbound CAN socket: {source}")]
    SocketCreation {
        /// The underlying system error
        source: io::Error,
    },

    /// The interface name could not be resolved to a kernel interface
    /// index (unknown device, or the interface is down).
    #[error("unable to resolve the CAN device '{device}': {source}")]
    DeviceLookup {
        /// The interface name that failed to resolve
        device: String,
        /// The underlying system error
        source: io::Error,
    },

    /// The socket could not be bound to the interface.
    #[error("unable to bind the CAN socket to device '{device}': {source}")]
    Bind {
        /// The interface the bind was attempted on
        device: String,
        /// The underlying system error
        source: io::Error,
    },

    /// The acceptance filter set could not be installed. The kernel call
    /// is atomic, so no subset of the rules is left active.
    #[error("unable to apply {count} CAN filter(s) to device '{device}': {source}")]
    FilterInstall {
        /// The interface the filters were meant for
        device: String,
        /// How many rules were in the rejected set
        count: usize,
        /// The underlying system error
        source: io::Error,
    },

    /// A frame could not be written out. The endpoint remains usable.
    #[error("error writing CAN frame bytes to device '{device}': {source}")]
    Transmit {
        /// The interface the write failed on
        device: String,
        /// The underlying system error
        source: io::Error,
    },

    /// A read on the receive path failed. This terminates the receive
    /// loop; reopening is the caller's decision.
    #[error("error reading from CAN device '{device}': {source}")]
    ReceiveFatal {
        /// The interface the read failed on
        device: String,
        /// The underlying system error
        source: io::Error,
    },

    /// The socket descriptor could not be released. The descriptor slot
    /// is still considered gone; close is never retried.
    #[error("unable to close the CAN socket associated with device '{device}': {source}")]
    Close {
        /// The interface the socket belonged to
        device: String,
        /// The underlying system error
        source: io::Error,
    },
}

impl Error {
    /// The device name the failed operation was addressed to, if any.
    pub fn device(&self) -> Option<&str> {
        use Error::*;
        match self {
            SocketCreation { .. } => None,
            DeviceLookup { device, .. }
            | Bind { device, .. }
            | FilterInstall { device, .. }
            | Transmit { device, .. }
            | ReceiveFatal { device, .. }
            | Close { device, .. } => Some(device),
        }
    }

    /// The raw OS error code, passed through verbatim from the transport.
    pub fn os_error(&self) -> Option<i32> {
        use Error::*;
        let source = match self {
            SocketCreation { source }
            | DeviceLookup { source, .. }
            | Bind { source, .. }
            | FilterInstall { source, .. }
            | Transmit { source, .. }
            | ReceiveFatal { source, .. }
            | Close { source, .. } => source,
        };
        source.raw_os_error()
    }
}

// ===== ConstructionError =====

/// Error that occurs when creating or decoding CAN frames.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConstructionError {
    /// Larger payload reported than can be held in the frame.
    TooMuchData,
    /// A wire image with a length other than the fixed frame size.
    InvalidWireLength,
}

impl error::Error for ConstructionError {}

impl fmt::Display for ConstructionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ConstructionError::*;
        match *self {
            TooMuchData => write!(f, "payload is larger than the CAN maximum of 8 bytes"),
            InvalidWireLength => write!(f, "wire image is not exactly one CAN frame"),
        }
    }
}

// ===== error frame class bits =====

// Class bits in the ID word of an error frame, from linux/can/error.h.
// These are not exported by the libc crate.

/// Controller problems, detail in `data[1]`
pub const CAN_ERR_CRTL: canid_t = 0x0000_0004;
/// Protocol violations and notifications, detail in `data[2]`
pub const CAN_ERR_PROT: canid_t = 0x0000_0008;
/// Bus off
pub const CAN_ERR_BUSOFF: canid_t = 0x0000_0040;
/// Controller restarted
pub const CAN_ERR_RESTARTED: canid_t = 0x0000_0100;

#[inline]
/// Helper function to retrieve a specific byte of frame data or returning
/// an `Err(..)` otherwise.
fn get_data(frame: &CanFrame, idx: u8) -> std::result::Result<u8, CanErrorDecodingFailure> {
    Ok(*frame
        .data()
        .get(idx as usize)
        .ok_or(CanErrorDecodingFailure::NotEnoughData(idx))?)
}

// ===== CanErrorDecodingFailure =====

/// Error decoding a [`CanError`] from a [`CanFrame`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CanErrorDecodingFailure {
    /// The supplied frame did not have the error bit set.
    NotAnError,
    /// The error class indicated additional detail in `data`, but the
    /// `data` field was not long enough.
    NotEnoughData(u8),
    /// The controller status byte was not recognized.
    InvalidControllerProblem,
}

impl error::Error for CanErrorDecodingFailure {}

impl fmt::Display for CanErrorDecodingFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use CanErrorDecodingFailure::*;
        let msg = match *self {
            NotAnError => "CAN frame is not an error frame",
            NotEnoughData(_) => "not enough data",
            InvalidControllerProblem => "not a valid controller problem",
        };
        write!(f, "{}", msg)
    }
}

// ===== CanError =====

/// A fault on the bus, derived from an error frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CanError {
    /// Bus off (due to too many detected errors)
    BusOff,
    /// Controller status change, decoded from `data[1]`
    ControllerProblem(ControllerProblem),
    /// Protocol violation; carries the raw `data[2]` status byte
    ProtocolViolation(u8),
    /// The controller has been restarted
    Restarted,
    /// Unknown, possibly invalid, error class
    Unknown(u32),
}

impl CanError {
    /// Decodes the bus fault described by an error frame.
    ///
    /// The class bits are tested in severity order: bus-off first, then
    /// controller status, protocol violations, and restarts.
    pub fn from_frame(frame: &CanFrame) -> std::result::Result<Self, CanErrorDecodingFailure> {
        if !frame.is_error_frame() {
            return Err(CanErrorDecodingFailure::NotAnError);
        }

        let class = frame.err();
        if class & CAN_ERR_BUSOFF != 0 {
            Ok(CanError::BusOff)
        } else if class & CAN_ERR_CRTL != 0 {
            Ok(CanError::ControllerProblem(ControllerProblem::try_from(
                get_data(frame, 1)?,
            )?))
        } else if class & CAN_ERR_PROT != 0 {
            Ok(CanError::ProtocolViolation(get_data(frame, 2)?))
        } else if class & CAN_ERR_RESTARTED != 0 {
            Ok(CanError::Restarted)
        } else {
            Ok(CanError::Unknown(class))
        }
    }
}

impl error::Error for CanError {}

impl fmt::Display for CanError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use CanError::*;
        match *self {
            BusOff => write!(f, "bus off"),
            ControllerProblem(e) => write!(f, "controller problem: {}", e),
            ProtocolViolation(status) => write!(f, "protocol violation (0x{:02x})", status),
            Restarted => write!(f, "controller restarted"),
            Unknown(class) => write!(f, "unknown error class (0x{:03x})", class),
        }
    }
}

// ===== ControllerProblem =====

/// Error status of the CAN controller, from `data[1]` of an error frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ControllerProblem {
    /// unspecified
    Unspecified,
    /// RX buffer overflow
    ReceiveBufferOverflow,
    /// TX buffer overflow
    TransmitBufferOverflow,
    /// reached warning level for RX errors
    ReceiveErrorWarning,
    /// reached warning level for TX errors
    TransmitErrorWarning,
    /// reached error passive status RX
    ReceiveErrorPassive,
    /// reached error passive status TX
    TransmitErrorPassive,
    /// recovered to error active state
    Active,
}

impl error::Error for ControllerProblem {}

impl fmt::Display for ControllerProblem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ControllerProblem::*;
        let msg = match *self {
            Unspecified => "unspecified controller problem",
            ReceiveBufferOverflow => "receive buffer overflow",
            TransmitBufferOverflow => "transmit buffer overflow",
            ReceiveErrorWarning => "reached RX warning threshold",
            TransmitErrorWarning => "reached TX warning threshold",
            ReceiveErrorPassive => "reached RX passive threshold",
            TransmitErrorPassive => "reached TX passive threshold",
            Active => "recovered to error active state",
        };
        write!(f, "{}", msg)
    }
}

impl TryFrom<u8> for ControllerProblem {
    type Error = CanErrorDecodingFailure;

    fn try_from(val: u8) -> std::result::Result<Self, Self::Error> {
        use ControllerProblem::*;
        Ok(match val {
            0x00 => Unspecified,
            0x01 => ReceiveBufferOverflow,
            0x02 => TransmitBufferOverflow,
            0x04 => ReceiveErrorWarning,
            0x08 => TransmitErrorWarning,
            0x10 => ReceiveErrorPassive,
            0x20 => TransmitErrorPassive,
            0x40 => Active,
            _ => return Err(CanErrorDecodingFailure::InvalidControllerProblem),
        })
    }
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use libc::CAN_ERR_FLAG;

    fn error_frame(class: canid_t, data: &[u8]) -> CanFrame {
        CanFrame::init(CAN_ERR_FLAG | class, data).unwrap()
    }

    #[test]
    fn test_not_an_error() {
        let frame = CanFrame::from_raw_id(0x100, &[]).unwrap();
        assert!(matches!(
            CanError::from_frame(&frame),
            Err(CanErrorDecodingFailure::NotAnError)
        ));
    }

    #[test]
    fn test_bus_off() {
        let frame = error_frame(CAN_ERR_BUSOFF, &[0; 8]);
        assert_eq!(CanError::from_frame(&frame), Ok(CanError::BusOff));
    }

    #[test]
    fn test_controller_problem() {
        let frame = error_frame(CAN_ERR_CRTL, &[0x00, 0x01, 0, 0, 0, 0, 0, 0]);
        assert_eq!(
            CanError::from_frame(&frame),
            Ok(CanError::ControllerProblem(
                ControllerProblem::ReceiveBufferOverflow
            ))
        );

        let frame = error_frame(CAN_ERR_CRTL, &[0x00, 0xFF, 0, 0, 0, 0, 0, 0]);
        assert!(matches!(
            CanError::from_frame(&frame),
            Err(CanErrorDecodingFailure::InvalidControllerProblem)
        ));
    }

    #[test]
    fn test_controller_problem_truncated_data() {
        let frame = error_frame(CAN_ERR_CRTL, &[0x00]);
        assert!(matches!(
            CanError::from_frame(&frame),
            Err(CanErrorDecodingFailure::NotEnoughData(1))
        ));
    }

    #[test]
    fn test_protocol_violation() {
        let frame = error_frame(CAN_ERR_PROT, &[0, 0, 0x40, 0, 0, 0, 0, 0]);
        assert_eq!(
            CanError::from_frame(&frame),
            Ok(CanError::ProtocolViolation(0x40))
        );
    }

    #[test]
    fn test_restarted() {
        let frame = error_frame(CAN_ERR_RESTARTED, &[0; 8]);
        assert_eq!(CanError::from_frame(&frame), Ok(CanError::Restarted));
    }

    #[test]
    fn test_error_carries_os_code() {
        let err = Error::Transmit {
            device: "can0".into(),
            source: io::Error::from_raw_os_error(libc::ENOBUFS),
        };
        assert_eq!(err.os_error(), Some(libc::ENOBUFS));
        assert_eq!(err.device(), Some("can0"));
        assert!(err.to_string().contains("can0"));
    }
}
