use crate::device::{LockMode, Segment};
use crate::error::RenderError;

/// Write position in a fixed-capacity ring of vertices.
///
/// The ring is split into `capacity / batch_size` equal segments. The offset
/// always points at the start of a segment and never reaches `capacity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingCursor {
    capacity: u32,
    batch_size: u32,
    offset: u32,
}

impl RingCursor {
    pub fn new(capacity: u32, batch_size: u32) -> Result<Self, RenderError> {
        if batch_size == 0 || capacity == 0 || capacity % batch_size != 0 {
            return Err(RenderError::InvalidRing {
                capacity,
                batch_size,
            });
        }
        Ok(Self {
            capacity,
            batch_size,
            offset: 0,
        })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn segment_count(&self) -> u32 {
        self.capacity / self.batch_size
    }

    /// Discard at the wrap point, append everywhere else.
    pub fn lock_mode(&self) -> LockMode {
        if self.offset == 0 {
            LockMode::Discard
        } else {
            LockMode::NoOverwrite
        }
    }

    /// The batch-sized segment starting at the current offset.
    pub fn segment(&self) -> Segment {
        Segment {
            offset: self.offset,
            len: self.batch_size,
            mode: self.lock_mode(),
        }
    }

    /// Move to the next segment, wrapping to 0 at the end of the ring.
    pub fn advance(&mut self) {
        self.offset += self.batch_size;
        if self.offset >= self.capacity {
            self.offset = 0;
        }
    }
}
