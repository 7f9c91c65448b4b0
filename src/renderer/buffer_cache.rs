// renderer/buffer_cache.rs
use std::rc::Rc;

use crate::error::DeviceError;
use crate::renderer::{BufferKind, BufferUsage, GraphicsDevice};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);

impl BufferId {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// A device buffer plus the byte capacity it was allocated with.
///
/// Resources are shared through [`SharedBuffer`] and never resized; a write
/// that does not fit replaces the whole resource.
#[derive(Debug)]
pub struct BufferResource<B> {
    id: BufferId,
    raw: B,
    capacity: u64,
    kind: BufferKind,
}

impl<B> BufferResource<B> {
    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn raw(&self) -> &B {
        &self.raw
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn kind(&self) -> BufferKind {
        self.kind
    }
}

pub type SharedBuffer<B> = Rc<BufferResource<B>>;

/// CPU-side bytes paired with the buffer that mirrors them on the device.
#[derive(Debug)]
pub struct BufferSource<B> {
    bytes: Vec<u8>,
    dirty: bool,
    buffer: Option<SharedBuffer<B>>,
}

impl<B> BufferSource<B> {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            dirty: true,
            buffer: None,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn buffer(&self) -> Option<&SharedBuffer<B>> {
        self.buffer.as_ref()
    }

    pub fn set_bytes(&mut self, bytes: Vec<u8>) {
        self.bytes = bytes;
        self.dirty = true;
    }

    /// Replaces the contents only when they differ, keeping clean data clean.
    pub fn replace_if_changed(&mut self, bytes: &[u8]) {
        if self.bytes != bytes {
            self.bytes.clear();
            self.bytes.extend_from_slice(bytes);
            self.dirty = true;
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Takes over `previous`'s device buffer so the next upload can reuse or retire it.
    pub fn inherit_buffer(&mut self, previous: &mut BufferSource<B>) {
        if self.buffer.is_none() {
            self.buffer = previous.buffer.take();
            self.dirty = true;
        }
    }

    #[cfg(test)]
    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Brings the device buffer up to date through `cache`.
    pub fn upload<D>(
        &mut self,
        cache: &mut BufferCache<D>,
        device: &D,
        request: BufferRequest<'_>,
    ) -> Result<Option<SharedBuffer<B>>, DeviceError>
    where
        D: GraphicsDevice<Buffer = B>,
    {
        let acquired = cache.acquire(device, &mut self.buffer, &self.bytes, self.dirty, request)?;
        self.dirty = false;
        Ok(acquired)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BufferRequest<'a> {
    pub label: &'a str,
    pub kind: BufferKind,
    pub usage: BufferUsage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    pub created: u64,
    pub updated: u64,
    pub reused: u64,
    pub retired: u64,
    pub released: u64,
}

struct Retired<B> {
    buffer: SharedBuffer<B>,
    frame: u64,
}

/// Reuse/replace policy for device buffers.
pub struct BufferCache<D: GraphicsDevice> {
    next_id: u64,
    frame: u64,
    release_delay: u64,
    retired: Vec<Retired<D::Buffer>>,
    stats: BufferStats,
}

impl<D: GraphicsDevice> BufferCache<D> {
    pub fn new(release_delay_frames: u32) -> Self {
        Self {
            next_id: 1,
            frame: 0,
            release_delay: u64::from(release_delay_frames.max(1)),
            retired: Vec::new(),
            stats: BufferStats::default(),
        }
    }

    /// Returns a buffer holding `contents`, reusing the one in `slot` when it fits.
    ///
    /// Empty contents yield `None` and leave `slot` alone. A buffer that is too
    /// small is replaced and parked until a later frame boundary.
    pub fn acquire(
        &mut self,
        device: &D,
        slot: &mut Option<SharedBuffer<D::Buffer>>,
        contents: &[u8],
        dirty: bool,
        request: BufferRequest<'_>,
    ) -> Result<Option<SharedBuffer<D::Buffer>>, DeviceError> {
        let len = contents.len() as u64;
        if len == 0 {
            return Ok(None);
        }

        if let Some(existing) = slot.as_ref() {
            if len <= existing.capacity {
                if dirty {
                    device.update_buffer(&existing.raw, 0, contents);
                    self.stats.updated += 1;
                } else {
                    self.stats.reused += 1;
                }
                return Ok(Some(Rc::clone(existing)));
            }
        }

        let raw = device.create_buffer(request.label, request.kind, request.usage, contents)?;
        let resource = Rc::new(BufferResource {
            id: BufferId(self.next_id),
            raw,
            capacity: len,
            kind: request.kind,
        });
        self.next_id += 1;
        self.stats.created += 1;
        log::debug!(
            "Created {:?} buffer {} '{}' ({} bytes)",
            request.kind,
            resource.id.0,
            request.label,
            len
        );

        if let Some(previous) = slot.replace(Rc::clone(&resource)) {
            self.retire(previous);
        }
        Ok(Some(resource))
    }

    /// Parks a buffer until no draw can still reference it.
    pub fn retire(&mut self, buffer: SharedBuffer<D::Buffer>) {
        self.stats.retired += 1;
        self.retired.push(Retired {
            buffer,
            frame: self.frame,
        });
    }

    /// Advances the frame counter and drops retired buffers nobody else holds.
    pub fn finish_frame(&mut self) -> usize {
        self.frame += 1;
        let frame = self.frame;
        let delay = self.release_delay;
        let before = self.retired.len();
        self.retired
            .retain(|r| frame - r.frame < delay || Rc::strong_count(&r.buffer) > 1);
        let released = before - self.retired.len();
        if released > 0 {
            self.stats.released += released as u64;
            log::debug!("Released {} retired buffers", released);
        }
        released
    }

    pub fn pending_release(&self) -> usize {
        self.retired.len()
    }

    pub fn stats(&self) -> BufferStats {
        self.stats
    }

    pub fn clear(&mut self) {
        self.retired.clear();
    }
}
