//! Backend that validates and records calls without a GPU.
//!
//! Used by `scenetrace render --dry-run` and by the test suite. It checks
//! the same preconditions the wgpu backend relies on (live handles, counts
//! matching buffer sizes, an output target) and keeps a call log.

use tracing::trace;

use super::backend::{BufferSlot, ComputeBackend, ElementCounts, SceneBindings};
use super::KERNEL_WORKGROUP_SIZE;
use super::uniforms::TraceUniforms;
use crate::util::{Error, Result};

/// Recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Create(BufferSlot, usize),
    Release(BufferSlot),
    EnsureOutput(u32, u32),
    ClearOutput,
    Dispatch { groups: [u32; 3], counts: ElementCounts },
}

/// Handle returned by [`DryRunBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DryRunBuffer {
    pub id: u64,
    pub slot: BufferSlot,
    pub bytes: usize,
}

#[derive(Debug)]
pub struct DryRunBackend {
    pub workgroup_size: [u32; 3],
    pub calls: Vec<BackendCall>,
    /// Fail allocation for this slot.
    pub fail_slot: Option<BufferSlot>,
    /// Fail every dispatch.
    pub fail_dispatch: bool,
    pub last_uniforms: Option<TraceUniforms>,
    live: Vec<DryRunBuffer>,
    next_id: u64,
    output: Option<(u32, u32)>,
    dispatches: usize,
}

impl Default for DryRunBackend {
    fn default() -> Self {
        Self::with_workgroup_size(KERNEL_WORKGROUP_SIZE)
    }
}

impl DryRunBackend {
    pub fn with_workgroup_size(workgroup_size: [u32; 3]) -> Self {
        Self {
            workgroup_size,
            calls: Vec::new(),
            fail_slot: None,
            fail_dispatch: false,
            last_uniforms: None,
            live: Vec::new(),
            next_id: 0,
            output: None,
            dispatches: 0,
        }
    }

    /// Number of buffers created and not yet released.
    pub fn live_buffers(&self) -> usize {
        self.live.len()
    }

    /// Live buffer for a slot.
    pub fn buffer(&self, slot: BufferSlot) -> Option<&DryRunBuffer> {
        self.live.iter().find(|b| b.slot == slot)
    }

    pub fn output(&self) -> Option<(u32, u32)> {
        self.output
    }

    pub fn dispatch_count(&self) -> usize {
        self.dispatches
    }

    /// Number of buffer allocations in the call log.
    pub fn create_count(&self) -> usize {
        self.calls.iter().filter(|c| matches!(c, BackendCall::Create(..))).count()
    }
}

impl ComputeBackend for DryRunBackend {
    type Buffer = DryRunBuffer;

    fn workgroup_size(&self) -> [u32; 3] {
        self.workgroup_size
    }

    fn create_storage_buffer(&mut self, slot: BufferSlot, contents: &[u8]) -> Result<DryRunBuffer> {
        if self.fail_slot == Some(slot) {
            return Err(Error::gpu(format!("{}: simulated allocation failure", slot.label())));
        }
        if contents.is_empty() {
            return Err(Error::gpu(format!("{}: zero-sized buffer", slot.label())));
        }
        self.calls.push(BackendCall::Create(slot, contents.len()));

        let buffer = DryRunBuffer { id: self.next_id, slot, bytes: contents.len() };
        self.next_id += 1;
        self.live.push(buffer.clone());
        Ok(buffer)
    }

    fn release_buffer(&mut self, buffer: DryRunBuffer) {
        self.calls.push(BackendCall::Release(buffer.slot));
        self.live.retain(|b| b.id != buffer.id);
    }

    fn ensure_output(&mut self, width: u32, height: u32) -> Result<()> {
        if self.output != Some((width, height)) {
            self.calls.push(BackendCall::EnsureOutput(width, height));
            self.output = Some((width, height));
        }
        Ok(())
    }

    fn clear_output(&mut self) {
        if self.output.take().is_some() {
            self.calls.push(BackendCall::ClearOutput);
        }
    }

    fn dispatch(
        &mut self,
        bindings: SceneBindings<'_, DryRunBuffer>,
        uniforms: &TraceUniforms,
        groups: [u32; 3],
    ) -> Result<()> {
        if self.fail_dispatch {
            return Err(Error::gpu("simulated submission failure"));
        }
        if self.output.is_none() {
            return Err(Error::gpu("no output target"));
        }
        for slot in BufferSlot::ALL {
            let count = bindings.counts.get(slot) as usize;
            match bindings.get(slot) {
                Some(buffer) => {
                    if !self.live.iter().any(|b| b.id == buffer.id) {
                        return Err(Error::gpu(format!(
                            "{}: buffer already released",
                            slot.label()
                        )));
                    }
                    if buffer.bytes != count * slot.stride() {
                        return Err(Error::gpu(format!(
                            "{}: {} bytes bound for {count} elements",
                            slot.label(),
                            buffer.bytes
                        )));
                    }
                }
                None if count != 0 => {
                    return Err(Error::gpu(format!(
                        "{}: {count} elements but no buffer",
                        slot.label()
                    )));
                }
                None => {}
            }
        }

        trace!(?groups, "dry-run dispatch");
        self.calls.push(BackendCall::Dispatch { groups, counts: bindings.counts });
        self.last_uniforms = Some(*uniforms);
        self.dispatches += 1;
        Ok(())
    }
}
