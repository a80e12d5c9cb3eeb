//! Version-tagged references to continuation slots.

const INITIALIZED_BIT: u32 = 1 << 31;
const VERSION_MASK: u32 = INITIALIZED_BIT - 1;

/// Refers to a continuation slot without keeping it alive.
///
/// The handle packs the slot index and the slot's version at allocation time
/// into two 32-bit words; the high bit of the encoded version marks the
/// handle as initialized. Because the slot's version moves on every
/// reallocation, a stale handle can always be told apart from the slot's
/// current occupant. The all-zero value is the null handle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ContinuationHandle {
    index: u32,
    encoded_version: u32,
}

impl ContinuationHandle {
    /// The null handle. `initialized` is false and every completion query
    /// treats it as referring to nothing.
    pub fn null() -> Self {
        ContinuationHandle::default()
    }

    pub(crate) fn new(index: u32, version: i32) -> Self {
        debug_assert!(version > 0 && (version as u32) <= VERSION_MASK);
        ContinuationHandle {
            index,
            encoded_version: INITIALIZED_BIT | (version as u32 & VERSION_MASK),
        }
    }

    /// Whether this handle ever referred to an allocated slot. Says nothing
    /// about whether that slot is still live.
    pub fn initialized(&self) -> bool {
        self.encoded_version & INITIALIZED_BIT != 0
    }

    /// Index of the slot this handle was created for.
    pub fn slot_index(&self) -> usize {
        self.index as usize
    }

    /// Version the slot carried when this handle was created.
    pub fn version(&self) -> i32 {
        (self.encoded_version & VERSION_MASK) as i32
    }
}
