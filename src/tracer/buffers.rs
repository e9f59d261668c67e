//! Ownership of the four structured scene buffers.

use tracing::{debug, warn};

use super::backend::{BufferSlot, ComputeBackend, ElementCounts, SceneBindings};
use super::gpu_data::FlatScene;
use crate::util::Result;

/// Sole owner of the triangle/mesh/sphere/light buffers.
///
/// Buffers are freed through the backend that created them, so release is
/// explicit: call [`GpuSceneBuffers::release`] before dropping.
#[derive(Debug)]
pub struct GpuSceneBuffers<B> {
    slots: [Option<B>; 4],
    counts: ElementCounts,
}

impl<B> Default for GpuSceneBuffers<B> {
    fn default() -> Self {
        Self {
            slots: [None, None, None, None],
            counts: ElementCounts::default(),
        }
    }
}

impl<B> GpuSceneBuffers<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every buffer with one sized to `flat`.
    ///
    /// Each previous buffer is released before its replacement is
    /// allocated. Empty arrays leave their slot unallocated. If any
    /// allocation fails, all slots are released.
    #[tracing::instrument(skip_all, fields(bytes = flat.byte_size()))]
    pub fn rebuild<D>(&mut self, backend: &mut D, flat: &FlatScene) -> Result<SceneBindings<'_, B>>
    where
        D: ComputeBackend<Buffer = B>,
    {
        for slot in BufferSlot::ALL {
            if let Err(e) = self.replace(backend, slot, flat.bytes(slot), flat.count(slot)) {
                self.release(backend);
                return Err(e);
            }
        }
        Ok(self.bindings())
    }

    fn replace<D>(
        &mut self,
        backend: &mut D,
        slot: BufferSlot,
        bytes: &[u8],
        count: u32,
    ) -> Result<()>
    where
        D: ComputeBackend<Buffer = B>,
    {
        if let Some(old) = self.slots[slot.index()].take() {
            backend.release_buffer(old);
        }
        self.counts.set(slot, 0);

        if count == 0 {
            debug!(slot = slot.label(), "empty, left unallocated");
            return Ok(());
        }

        let buffer = backend.create_storage_buffer(slot, bytes)?;
        debug!(slot = slot.label(), count, bytes = bytes.len(), "uploaded");
        self.slots[slot.index()] = Some(buffer);
        self.counts.set(slot, count);
        Ok(())
    }

    /// Free all buffers. Safe to call repeatedly.
    pub fn release<D>(&mut self, backend: &mut D)
    where
        D: ComputeBackend<Buffer = B>,
    {
        for slot in &mut self.slots {
            if let Some(buffer) = slot.take() {
                backend.release_buffer(buffer);
            }
        }
        self.counts = ElementCounts::default();
    }

    /// Handles and counts for binding.
    pub fn bindings(&self) -> SceneBindings<'_, B> {
        SceneBindings {
            buffers: [
                self.slots[0].as_ref(),
                self.slots[1].as_ref(),
                self.slots[2].as_ref(),
                self.slots[3].as_ref(),
            ],
            counts: self.counts,
        }
    }

    pub fn counts(&self) -> ElementCounts {
        self.counts
    }

    pub fn is_allocated(&self, slot: BufferSlot) -> bool {
        self.slots[slot.index()].is_some()
    }

    /// True if any slot holds a buffer.
    pub fn any_allocated(&self) -> bool {
        self.slots.iter().any(Option::is_some)
    }
}

impl<B> Drop for GpuSceneBuffers<B> {
    fn drop(&mut self) {
        if self.any_allocated() {
            warn!("scene buffers dropped without release");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracer::dry_run::{BackendCall, DryRunBackend};
    use crate::tracer::gpu_data::{LightRecord, TriangleRecord};
    use bytemuck::Zeroable;

    fn flat(triangles: usize, lights: usize) -> FlatScene {
        FlatScene {
            triangles: vec![TriangleRecord::zeroed(); triangles],
            lights: vec![LightRecord::zeroed(); lights],
            ..Default::default()
        }
    }

    #[test]
    fn test_zero_count_slots_unallocated() {
        let mut backend = DryRunBackend::default();
        let mut buffers = GpuSceneBuffers::new();
        let bindings = buffers.rebuild(&mut backend, &flat(3, 0)).expect("rebuild");

        assert!(bindings.get(BufferSlot::Triangles).is_some());
        assert!(bindings.get(BufferSlot::Lights).is_none());
        assert_eq!(bindings.counts.triangles, 3);
        assert_eq!(bindings.counts.lights, 0);
        assert_eq!(backend.live_buffers(), 1);
        assert_eq!(backend.buffer(BufferSlot::Triangles).map(|b| b.bytes), Some(3 * 96));

        buffers.release(&mut backend);
    }

    #[test]
    fn test_rebuild_releases_previous_first() {
        let mut backend = DryRunBackend::default();
        let mut buffers = GpuSceneBuffers::new();
        buffers.rebuild(&mut backend, &flat(2, 1)).expect("first");
        backend.calls.clear();

        buffers.rebuild(&mut backend, &flat(5, 0)).expect("second");
        assert_eq!(
            backend.calls,
            vec![
                BackendCall::Release(BufferSlot::Triangles),
                BackendCall::Create(BufferSlot::Triangles, 5 * 96),
                BackendCall::Release(BufferSlot::Lights),
            ]
        );
        assert_eq!(backend.live_buffers(), 1);
        assert_eq!(buffers.counts().triangles, 5);

        buffers.release(&mut backend);
    }

    #[test]
    fn test_release_idempotent() {
        let mut backend = DryRunBackend::default();
        let mut buffers = GpuSceneBuffers::new();
        buffers.rebuild(&mut backend, &flat(1, 1)).expect("rebuild");

        buffers.release(&mut backend);
        buffers.release(&mut backend);
        assert_eq!(backend.live_buffers(), 0);
        assert!(!buffers.any_allocated());
        assert_eq!(buffers.counts(), ElementCounts::default());
    }

    #[test]
    fn test_allocation_failure_releases_everything() {
        let mut backend = DryRunBackend::default();
        backend.fail_slot = Some(BufferSlot::Lights);
        let mut buffers = GpuSceneBuffers::new();
        let err = buffers.rebuild(&mut backend, &flat(4, 2)).unwrap_err();

        assert!(matches!(err, crate::Error::GpuResource(_)));
        assert!(!buffers.any_allocated());
        assert_eq!(backend.live_buffers(), 0);
    }
}
