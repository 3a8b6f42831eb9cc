use std::path::PathBuf;

/// Errors from particle rendering.
///
/// Creation errors are fatal for `init`. `SegmentLock` is per frame: the
/// frame is skipped and the next `render` may succeed.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("vertex buffer creation failed: {0}")]
    BufferCreation(String),
    #[error("texture load failed for {path}: {reason}")]
    TextureLoad { path: PathBuf, reason: String },
    #[error("segment lock failed at offset {offset}: {reason}")]
    SegmentLock { offset: u32, reason: String },
    #[error("invalid ring: capacity {capacity} must be a non-zero multiple of batch size {batch_size}")]
    InvalidRing { capacity: u32, batch_size: u32 },
}

impl RenderError {
    /// True for errors that only cost the current frame.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SegmentLock { .. })
    }
}
