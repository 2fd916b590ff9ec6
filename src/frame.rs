// canlink/src/frame.rs
//
// Implements CAN 2.0 frames for the Rust 'canlink' library.
//
// This file is part of the Rust 'canlink' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! CAN bus frames.
//!
//! [`CanFrame`] wraps the C `can_frame` struct from
//! [libc](https://docs.rs/libc/latest/libc/struct.can_frame.html), so a
//! frame value *is* its fixed 16-byte wire image:
//!
//! ```text
//! offset 0..4   ID word (identifier + EFF/RTR/ERR flag bits)
//! offset 4      data length code (0..=8)
//! offset 5..8   padding / reserved
//! offset 8..16  data, only the first DLC bytes are valid
//! ```
//!
//! Received error frames are carried by the same type; classify them with
//! [`CanFrame::is_error_frame`] and
//! [`CanError::from_frame`](crate::CanError::from_frame).

use crate::{
    errors::ConstructionError,
    id::{id_from_raw, id_to_canid_t, IdFlags},
};
use embedded_can::{ExtendedId, Frame as EmbeddedFrame, Id, StandardId};
use itertools::Itertools;
use libc::{can_frame, canid_t};
use std::{fmt, mem};

pub use libc::{CAN_MAX_DLEN, CAN_MTU};

/// Creates a default C `can_frame`.
/// This initializes the entire structure to zeros.
#[inline(always)]
pub fn can_frame_default() -> can_frame {
    unsafe { mem::zeroed() }
}

/// A classic CAN 2.0 frame with up to 8 bytes of data.
///
/// Binary compatible with the kernel's `can_frame`, so reads and writes
/// on a raw CAN socket move exactly [`CAN_MTU`] (16) bytes per frame.
#[derive(Clone, Copy)]
#[repr(transparent)]
pub struct CanFrame(can_frame);

impl CanFrame {
    /// Initializes a frame from a raw ID word and data.
    ///
    /// The ID word is taken as-is, including any flag bits.
    pub(crate) fn init(can_id: canid_t, data: &[u8]) -> Result<Self, ConstructionError> {
        match data.len() {
            n if n <= CAN_MAX_DLEN => {
                let mut frame = can_frame_default();
                frame.can_id = can_id;
                frame.can_dlc = n as u8;
                frame.data[..n].copy_from_slice(data);
                Ok(Self(frame))
            }
            _ => Err(ConstructionError::TooMuchData),
        }
    }

    /// Creates a data frame using a raw, integer CAN ID.
    ///
    /// If the `id` is <= 0x7FF, it's assumed to be a standard ID,
    /// otherwise it is created as an extended ID. If you require an
    /// extended ID <= 0x7FF, use [`EmbeddedFrame::new`].
    pub fn from_raw_id(id: u32, data: &[u8]) -> Option<Self> {
        Self::new(id_from_raw(id)?, data)
    }

    /// Creates a remote transmission request frame using a raw, integer
    /// CAN ID.
    pub fn remote_from_raw_id(id: u32, dlc: usize) -> Option<Self> {
        Self::new_remote(id_from_raw(id)?, dlc)
    }

    /// Gets the composite SocketCAN ID word, with EFF/RTR/ERR flags.
    #[inline]
    pub fn id_word(&self) -> canid_t {
        self.0.can_id
    }

    /// Returns the actual CAN identifier, without the flag bits.
    pub fn raw_id(&self) -> canid_t {
        let mask = if self.is_extended() {
            libc::CAN_EFF_MASK
        } else {
            libc::CAN_SFF_MASK
        };
        self.0.can_id & mask
    }

    /// Returns the EFF/RTR/ERR flags from the ID word.
    #[inline]
    pub fn id_flags(&self) -> IdFlags {
        IdFlags::from_bits_truncate(self.0.can_id)
    }

    /// Checks if this is an error frame rather than a data frame.
    #[inline]
    pub fn is_error_frame(&self) -> bool {
        self.id_flags().contains(IdFlags::ERR)
    }

    /// Returns the error class bits of the ID word.
    ///
    /// Only meaningful when [`is_error_frame`](Self::is_error_frame) is
    /// true.
    #[inline]
    pub fn err(&self) -> u32 {
        self.0.can_id & libc::CAN_ERR_MASK
    }

    /// The frame's fixed-size wire image.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        crate::as_bytes(&self.0)
    }
}

impl EmbeddedFrame for CanFrame {
    /// Create a new CAN 2.0 data frame
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        Self::init(id_to_canid_t(id), data).ok()
    }

    /// Create a new remote transmission request frame.
    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        if dlc > CAN_MAX_DLEN {
            return None;
        }
        let mut frame = can_frame_default();
        frame.can_id = id_to_canid_t(id) | libc::CAN_RTR_FLAG;
        frame.can_dlc = dlc as u8;
        Some(Self(frame))
    }

    /// Check if frame uses 29-bit extended ID format.
    fn is_extended(&self) -> bool {
        self.id_flags().contains(IdFlags::EFF)
    }

    /// Check if frame is a remote transmission request.
    fn is_remote_frame(&self) -> bool {
        self.id_flags().contains(IdFlags::RTR)
    }

    /// Return the frame identifier.
    fn id(&self) -> Id {
        if self.is_extended() {
            // unwrap: the masked value is in range by construction
            ExtendedId::new(self.0.can_id & libc::CAN_EFF_MASK)
                .unwrap()
                .into()
        } else {
            StandardId::new((self.0.can_id & libc::CAN_SFF_MASK) as u16)
                .unwrap()
                .into()
        }
    }

    /// Data length code
    fn dlc(&self) -> usize {
        self.0.can_dlc as usize
    }

    /// A slice into the actual data.
    ///
    /// Never longer than the declared data length; bytes beyond the DLC
    /// are never exposed, even for a malformed kernel frame.
    fn data(&self) -> &[u8] {
        &self.0.data[..(self.0.can_dlc as usize).min(CAN_MAX_DLEN)]
    }
}

impl Default for CanFrame {
    /// The default frame has all fields and data set to zero, and all
    /// flags off.
    fn default() -> Self {
        Self(can_frame_default())
    }
}

impl fmt::Debug for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "CanFrame {{ ")?;
        fmt::UpperHex::fmt(self, f)?;
        write!(f, " }}")
    }
}

impl fmt::UpperHex for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(f, "{:X}#", self.0.can_id)?;
        let mut parts = self.data().iter().map(|v| format!("{:02X}", v));
        write!(f, "{}", parts.join(" "))
    }
}

impl From<can_frame> for CanFrame {
    /// Creates a `CanFrame` from a C `can_frame` struct.
    fn from(frame: can_frame) -> Self {
        Self(frame)
    }
}

impl AsRef<can_frame> for CanFrame {
    fn as_ref(&self) -> &can_frame {
        &self.0
    }
}

impl TryFrom<&[u8]> for CanFrame {
    type Error = ConstructionError;

    /// Decodes a frame from its fixed-size wire image.
    ///
    /// The image must be exactly [`CAN_MTU`] bytes and declare a data
    /// length of at most 8.
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != CAN_MTU {
            return Err(ConstructionError::InvalidWireLength);
        }
        let mut frame = can_frame_default();
        crate::as_bytes_mut(&mut frame).copy_from_slice(bytes);
        if frame.can_dlc as usize > CAN_MAX_DLEN {
            return Err(ConstructionError::TooMuchData);
        }
        Ok(Self(frame))
    }
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: &[u8] = &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88];

    #[test]
    fn test_wire_size() {
        assert_eq!(mem::size_of::<can_frame>(), CAN_MTU);
        let frame = CanFrame::from_raw_id(0x100, &[1, 2, 3]).unwrap();
        assert_eq!(frame.as_bytes().len(), CAN_MTU);
    }

    #[test]
    fn test_codec_round_trip() {
        // the round-trip law for every valid data length
        for dlc in 0..=CAN_MAX_DLEN {
            let frame = CanFrame::from_raw_id(0x123, &DATA[..dlc]).unwrap();
            let decoded = CanFrame::try_from(frame.as_bytes()).unwrap();

            assert_eq!(decoded.raw_id(), 0x123);
            assert_eq!(decoded.id_word(), frame.id_word());
            assert_eq!(decoded.dlc(), dlc);
            assert_eq!(decoded.data(), &DATA[..dlc]);
        }
    }

    #[test]
    fn test_data_too_long() {
        assert!(CanFrame::from_raw_id(0x1, &[0u8; 9]).is_none());
    }

    #[test]
    fn test_decode_rejects_bad_images() {
        let frame = CanFrame::from_raw_id(0x42, &[1, 2]).unwrap();

        // truncated image
        let bytes = frame.as_bytes();
        assert!(matches!(
            CanFrame::try_from(&bytes[..CAN_MTU - 1]),
            Err(ConstructionError::InvalidWireLength)
        ));

        // over-long declared data length
        let mut bytes = bytes.to_vec();
        bytes[4] = 9;
        assert!(matches!(
            CanFrame::try_from(bytes.as_slice()),
            Err(ConstructionError::TooMuchData)
        ));
    }

    #[test]
    fn test_standard_and_extended_ids() {
        let frame = CanFrame::from_raw_id(0x100, &[]).unwrap();
        assert!(!frame.is_extended());
        assert_eq!(frame.raw_id(), 0x100);
        assert_eq!(frame.id_word(), 0x100);

        let frame = CanFrame::from_raw_id(0x12345, &[]).unwrap();
        assert!(frame.is_extended());
        assert_eq!(frame.raw_id(), 0x12345);
        assert_eq!(frame.id_word(), 0x12345 | libc::CAN_EFF_FLAG);
    }

    #[test]
    fn test_remote_frame() {
        let frame = CanFrame::remote_from_raw_id(0x300, 4).unwrap();
        assert!(frame.is_remote_frame());
        assert_eq!(frame.dlc(), 4);
        assert!(CanFrame::remote_from_raw_id(0x300, 9).is_none());
    }

    #[test]
    fn test_data_never_exceeds_dlc() {
        let frame = CanFrame::from_raw_id(0x7F, &DATA[..3]).unwrap();
        assert_eq!(frame.data().len(), 3);

        // a malformed kernel image is clamped rather than over-read
        let mut raw = can_frame_default();
        raw.can_id = 0x7F;
        raw.can_dlc = 15;
        let frame = CanFrame::from(raw);
        assert_eq!(frame.data().len(), CAN_MAX_DLEN);
    }

    #[test]
    fn test_upper_hex() {
        let frame = CanFrame::from_raw_id(0x1AB, &[0xDE, 0xAD]).unwrap();
        assert_eq!(format!("{:X}", frame), "1AB#DE AD");
    }
}
