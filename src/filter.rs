// canlink/src/filter.rs
//
// Implements kernel acceptance filters for the Rust 'canlink' library.
//
// This file is part of the Rust 'canlink' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! CAN acceptance filters.
//!
//! Each filter contains an internal id and mask. Frames are considered to
//! be matched by a filter if `received_id & mask == filter_id & mask`
//! holds true. A socket can be given multiple filters; a frame passes if
//! it matches *any* of them, and a socket with no filters installed
//! accepts every frame.
//!
//! Filtering happens in the kernel: frames rejected by the filter set
//! never reach the socket's receive path at all. The whole rule set is
//! pushed in a single `setsockopt` call, so it is replaced atomically.

use libc::{can_filter, canid_t};
use std::fmt;

/// A single kernel-level acceptance rule.
///
/// Binary compatible with the kernel's `can_filter` (4-byte id followed
/// by 4-byte mask), so a `&[CanFilter]` is exactly the contiguous array
/// the filter-install call expects.
#[derive(Copy, Clone)]
#[repr(transparent)]
pub struct CanFilter(can_filter);

impl CanFilter {
    /// Constructs a new CAN filter.
    pub fn new(id: canid_t, mask: canid_t) -> Self {
        Self(can_filter {
            can_id: id,
            can_mask: mask,
        })
    }

    /// A filter that matches every frame.
    pub fn accept_all() -> Self {
        Self::new(0, 0)
    }

    /// The identifier the rule compares against.
    #[inline]
    pub fn id(&self) -> canid_t {
        self.0.can_id
    }

    /// The mask selecting which identifier bits are significant.
    #[inline]
    pub fn mask(&self) -> canid_t {
        self.0.can_mask
    }

    /// The kernel acceptance predicate, mirrored host-side.
    ///
    /// `id_word` is the full 32-bit ID word of a frame, flags included.
    #[inline]
    pub fn matches(&self, id_word: canid_t) -> bool {
        id_word & self.0.can_mask == self.0.can_id & self.0.can_mask
    }
}

impl fmt::Debug for CanFilter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "CanFilter {{ id: 0x{:X}, mask: 0x{:X} }}",
            self.0.can_id, self.0.can_mask
        )
    }
}

impl PartialEq for CanFilter {
    fn eq(&self, other: &Self) -> bool {
        self.0.can_id == other.0.can_id && self.0.can_mask == other.0.can_mask
    }
}

impl Eq for CanFilter {}

impl From<can_filter> for CanFilter {
    fn from(filt: can_filter) -> Self {
        Self(filt)
    }
}

impl From<(u32, u32)> for CanFilter {
    /// Creates a filter from an `(id, mask)` pair.
    fn from(filt: (u32, u32)) -> Self {
        CanFilter::new(filt.0, filt.1)
    }
}

impl AsRef<can_filter> for CanFilter {
    fn as_ref(&self) -> &can_filter {
        &self.0
    }
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    #[test]
    fn test_wire_layout() {
        // the kernel expects a packed array of 8-byte (id, mask) pairs
        assert_eq!(mem::size_of::<CanFilter>(), mem::size_of::<can_filter>());
        assert_eq!(mem::size_of::<CanFilter>(), 8);
    }

    #[test]
    fn test_match_law() {
        let filter = CanFilter::new(0x100, 0x7FF);

        assert!(filter.matches(0x100));
        assert!(!filter.matches(0x150));
        assert!(!filter.matches(0x200));

        // only masked bits are significant
        let filter = CanFilter::new(0x100, 0x700);
        assert!(filter.matches(0x100));
        assert!(filter.matches(0x150));
        assert!(!filter.matches(0x200));
    }

    #[test]
    fn test_rules_or_together() {
        let filters = [CanFilter::new(0x100, 0x7FF), CanFilter::new(0x200, 0x7FF)];

        let accepted = |id: canid_t| filters.iter().any(|f| f.matches(id));
        assert!(accepted(0x100));
        assert!(!accepted(0x150));
        assert!(accepted(0x200));
    }

    #[test]
    fn test_accept_all() {
        let filter = CanFilter::accept_all();
        for id in [0x0, 0x7FF, 0x1FFF_FFFF] {
            assert!(filter.matches(id));
        }
    }

    #[test]
    fn test_conversions() {
        let filter = CanFilter::from((0x200, 0x7FF));
        assert_eq!(filter, CanFilter::new(0x200, 0x7FF));
        assert_eq!(filter.id(), 0x200);
        assert_eq!(filter.mask(), 0x7FF);
        assert_eq!(filter.as_ref().can_id, 0x200);
    }
}
