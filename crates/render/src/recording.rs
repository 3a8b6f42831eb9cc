use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::device::{
    BufferHandle, GraphicsDevice, LockMode, ParticleVertex, RenderState, Segment, TextureHandle,
};
use crate::error::RenderError;

/// One call made against a [`RecordingDevice`].
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    CreateBuffer {
        buffer: BufferHandle,
        capacity: u32,
    },
    LoadTexture {
        texture: TextureHandle,
        path: PathBuf,
    },
    SetState(RenderState),
    Lock {
        buffer: BufferHandle,
        segment: Segment,
    },
    Unlock {
        buffer: BufferHandle,
        segment: Segment,
        written: u32,
    },
    Draw {
        buffer: BufferHandle,
        texture: TextureHandle,
        first: u32,
        count: u32,
    },
}

#[derive(Debug)]
struct RecordedBuffer {
    vertices: Vec<ParticleVertex>,
    /// Ranges handed to the GPU since the last discard lock.
    in_flight: Vec<Range<u32>>,
}

/// Headless [`GraphicsDevice`] that records every call.
///
/// Buffers are plain vectors. The device also checks the ring discipline:
/// a no-overwrite lock that overlaps data written since the last discard is
/// reported by [`RecordingDevice::overwrite_hazards`]. Failures can be
/// injected for buffer creation, texture loads and individual locks.
#[derive(Debug)]
pub struct RecordingDevice {
    calls: Vec<DeviceCall>,
    buffers: Vec<RecordedBuffer>,
    textures: Vec<PathBuf>,
    state: RenderState,
    open: Option<(BufferHandle, Segment)>,
    hazards: Vec<Segment>,
    unscoped_draws: usize,
    locks_taken: usize,
    fail_buffer_creation: bool,
    fail_texture_load: bool,
    fail_lock_at: Option<usize>,
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            buffers: Vec::new(),
            textures: Vec::new(),
            state: RenderState::baseline(),
            open: None,
            hazards: Vec::new(),
            unscoped_draws: 0,
            locks_taken: 0,
            fail_buffer_creation: false,
            fail_texture_load: false,
            fail_lock_at: None,
        }
    }
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `create_vertex_buffer` call fail.
    pub fn fail_buffer_creation(mut self) -> Self {
        self.fail_buffer_creation = true;
        self
    }

    /// Make every `load_texture` call fail.
    pub fn fail_texture_load(mut self) -> Self {
        self.fail_texture_load = true;
        self
    }

    /// Fail the lock with zero-based index `n`, counted over the device's lifetime.
    pub fn fail_lock_at(&mut self, n: usize) {
        self.fail_lock_at = Some(n);
    }

    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// `(first, count)` of every draw recorded so far.
    pub fn draws(&self) -> Vec<(u32, u32)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                DeviceCall::Draw { first, count, .. } => Some((*first, *count)),
                _ => None,
            })
            .collect()
    }

    pub fn draw_counts(&self) -> Vec<u32> {
        self.draws().into_iter().map(|(_, count)| count).collect()
    }

    /// Every segment locked so far, in order.
    pub fn locks(&self) -> Vec<Segment> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                DeviceCall::Lock { segment, .. } => Some(*segment),
                _ => None,
            })
            .collect()
    }

    /// Render state currently applied.
    pub fn state(&self) -> &RenderState {
        &self.state
    }

    /// No-overwrite locks that touched data still in flight.
    pub fn overwrite_hazards(&self) -> &[Segment] {
        &self.hazards
    }

    /// Draws issued while the baseline state was applied.
    pub fn unscoped_draws(&self) -> usize {
        self.unscoped_draws
    }

    pub fn is_locked(&self) -> bool {
        self.open.is_some()
    }

    pub fn texture_path(&self, texture: TextureHandle) -> Option<&Path> {
        self.textures.get(texture.0 as usize).map(PathBuf::as_path)
    }

    /// Current contents of a buffer.
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<&[ParticleVertex]> {
        self.buffers
            .get(buffer.0 as usize)
            .map(|b| b.vertices.as_slice())
    }

    fn lock_error(segment: Segment, reason: impl Into<String>) -> RenderError {
        RenderError::SegmentLock {
            offset: segment.offset,
            reason: reason.into(),
        }
    }
}

impl GraphicsDevice for RecordingDevice {
    fn create_vertex_buffer(&mut self, capacity: u32) -> Result<BufferHandle, RenderError> {
        if self.fail_buffer_creation {
            return Err(RenderError::BufferCreation(
                "injected buffer creation failure".into(),
            ));
        }
        let buffer = BufferHandle(self.buffers.len() as u32);
        self.buffers.push(RecordedBuffer {
            vertices: vec![ParticleVertex::default(); capacity as usize],
            in_flight: Vec::new(),
        });
        self.calls.push(DeviceCall::CreateBuffer { buffer, capacity });
        Ok(buffer)
    }

    fn load_texture(&mut self, path: &Path) -> Result<TextureHandle, RenderError> {
        if self.fail_texture_load {
            return Err(RenderError::TextureLoad {
                path: path.to_path_buf(),
                reason: "injected texture load failure".into(),
            });
        }
        let texture = TextureHandle(self.textures.len() as u32);
        self.textures.push(path.to_path_buf());
        self.calls.push(DeviceCall::LoadTexture {
            texture,
            path: path.to_path_buf(),
        });
        Ok(texture)
    }

    fn set_render_state(&mut self, state: &RenderState) {
        self.state = *state;
        self.calls.push(DeviceCall::SetState(*state));
    }

    fn lock(&mut self, buffer: BufferHandle, segment: Segment) -> Result<(), RenderError> {
        let index = self.locks_taken;
        self.locks_taken += 1;
        if self.fail_lock_at == Some(index) {
            return Err(Self::lock_error(segment, "injected lock failure"));
        }
        if self.open.is_some() {
            return Err(Self::lock_error(segment, "another segment is already locked"));
        }
        let Some(recorded) = self.buffers.get_mut(buffer.0 as usize) else {
            return Err(Self::lock_error(segment, format!("unknown buffer {buffer:?}")));
        };
        if segment.end() as usize > recorded.vertices.len() {
            return Err(Self::lock_error(segment, "segment exceeds buffer capacity"));
        }

        match segment.mode {
            LockMode::Discard => recorded.in_flight.clear(),
            LockMode::NoOverwrite => {
                let range = segment.offset..segment.end();
                if recorded
                    .in_flight
                    .iter()
                    .any(|r| r.start < range.end && range.start < r.end)
                {
                    tracing::warn!(?segment, "no-overwrite lock overlaps in-flight data");
                    self.hazards.push(segment);
                }
            }
        }

        self.open = Some((buffer, segment));
        self.calls.push(DeviceCall::Lock { buffer, segment });
        Ok(())
    }

    fn unlock(&mut self, buffer: BufferHandle, segment: Segment, vertices: &[ParticleVertex]) {
        if self.open != Some((buffer, segment)) {
            tracing::warn!(?segment, "unlock does not match the open segment");
        }
        self.open = None;

        let written = vertices.len().min(segment.len as usize);
        if let Some(recorded) = self.buffers.get_mut(buffer.0 as usize) {
            let start = segment.offset as usize;
            if start >= recorded.vertices.len() {
                tracing::warn!(?segment, "unlock starts past the end of the buffer");
            } else {
                let end = (start + written).min(recorded.vertices.len());
                recorded.vertices[start..end].copy_from_slice(&vertices[..end - start]);
                if end > start {
                    recorded.in_flight.push(segment.offset..end as u32);
                }
            }
        }
        self.calls.push(DeviceCall::Unlock {
            buffer,
            segment,
            written: written as u32,
        });
    }

    fn draw_points(&mut self, buffer: BufferHandle, texture: TextureHandle, first: u32, count: u32) {
        if self.state.is_baseline() {
            self.unscoped_draws += 1;
        }
        self.calls.push(DeviceCall::Draw {
            buffer,
            texture,
            first,
            count,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(offset: u32, mode: LockMode) -> Segment {
        Segment {
            offset,
            len: 4,
            mode,
        }
    }

    #[test]
    fn unlock_writes_into_buffer() {
        let mut dev = RecordingDevice::new();
        let buf = dev.create_vertex_buffer(8).unwrap();
        let seg = segment(4, LockMode::NoOverwrite);
        dev.lock(buf, seg).unwrap();
        let v = ParticleVertex {
            position: [1.0, 2.0, 3.0],
            color: [1.0; 4],
        };
        dev.unlock(buf, seg, &[v, v]);
        let contents = dev.buffer_contents(buf).unwrap();
        assert_eq!(contents[4], v);
        assert_eq!(contents[5], v);
        assert_eq!(contents[6], ParticleVertex::default());
        assert!(!dev.is_locked());
    }

    #[test]
    fn double_lock_is_rejected() {
        let mut dev = RecordingDevice::new();
        let buf = dev.create_vertex_buffer(8).unwrap();
        dev.lock(buf, segment(0, LockMode::Discard)).unwrap();
        assert!(dev.lock(buf, segment(4, LockMode::NoOverwrite)).is_err());
    }

    #[test]
    fn out_of_range_lock_is_rejected() {
        let mut dev = RecordingDevice::new();
        let buf = dev.create_vertex_buffer(8).unwrap();
        let err = dev.lock(buf, segment(6, LockMode::NoOverwrite)).unwrap_err();
        assert!(err.is_recoverable());
        assert!(dev.lock(BufferHandle(9), segment(0, LockMode::Discard)).is_err());
    }

    #[test]
    fn unlock_after_rejected_lock_leaves_buffer_untouched() {
        let mut dev = RecordingDevice::new();
        let buf = dev.create_vertex_buffer(8).unwrap();
        let seg = segment(12, LockMode::NoOverwrite);
        assert!(dev.lock(buf, seg).is_err());

        let v = ParticleVertex {
            position: [1.0, 2.0, 3.0],
            color: [1.0; 4],
        };
        dev.unlock(buf, seg, &[v, v]);
        let contents = dev.buffer_contents(buf).unwrap();
        assert_eq!(contents.len(), 8);
        assert!(contents.iter().all(|c| *c == ParticleVertex::default()));
        assert!(!dev.is_locked());
        assert!(matches!(
            dev.calls().last(),
            Some(DeviceCall::Unlock { written: 2, .. })
        ));
    }

    #[test]
    fn overwriting_in_flight_data_is_a_hazard() {
        let mut dev = RecordingDevice::new();
        let buf = dev.create_vertex_buffer(8).unwrap();
        let v = [ParticleVertex::default(); 4];

        let first = segment(0, LockMode::Discard);
        dev.lock(buf, first).unwrap();
        dev.unlock(buf, first, &v);

        let again = segment(0, LockMode::NoOverwrite);
        dev.lock(buf, again).unwrap();
        dev.unlock(buf, again, &v);
        assert_eq!(dev.overwrite_hazards(), &[again]);

        let wrap = segment(0, LockMode::Discard);
        dev.lock(buf, wrap).unwrap();
        dev.unlock(buf, wrap, &v);
        assert_eq!(dev.overwrite_hazards().len(), 1);
    }

    #[test]
    fn injected_failures() {
        let mut dev = RecordingDevice::new().fail_buffer_creation();
        assert!(matches!(
            dev.create_vertex_buffer(8),
            Err(RenderError::BufferCreation(_))
        ));

        let mut dev = RecordingDevice::new().fail_texture_load();
        assert!(matches!(
            dev.load_texture(Path::new("snowflake.dds")),
            Err(RenderError::TextureLoad { .. })
        ));

        let mut dev = RecordingDevice::new();
        let buf = dev.create_vertex_buffer(8).unwrap();
        dev.fail_lock_at(0);
        assert!(dev.lock(buf, segment(0, LockMode::Discard)).is_err());
        assert!(dev.lock(buf, segment(0, LockMode::Discard)).is_ok());
    }

    #[test]
    fn draws_under_baseline_are_counted() {
        let mut dev = RecordingDevice::new();
        dev.draw_points(BufferHandle(0), TextureHandle(0), 0, 1);
        assert_eq!(dev.unscoped_draws(), 1);
        assert_eq!(dev.draws(), vec![(0, 1)]);
    }
}
