//! Fixed ring of in-flight encoder frames.
//!
//! Every slot pairs a device texture, its registered and mapped NVENC input
//! resource, an output bitstream buffer and the last compressed payload.
//! Slots are allocated once per session and selected round-robin by the
//! frame counter, which the ring owns and never resets.

use tracing::{debug, error};

use rtc_common::{GpuTexture, GraphicsDevice};

use crate::error::EncoderError;

use super::ffi::{NvEncBufferFormat, NvEncInputResourceType};
use super::registrar::{InputFrame, OutputBitstream, Registrar};

/// Number of frames in flight.
pub const RING_CAPACITY: usize = 3;

/// One ring slot.
#[derive(Debug, Default)]
pub struct Frame {
    /// Device texture the capture pipeline copies into.
    pub texture: Option<GpuTexture>,
    pub input: Option<InputFrame>,
    pub output: Option<OutputBitstream>,
    /// Payload of the most recent encode through this slot.
    pub encoded: Vec<u8>,
}

impl Frame {
    /// Whether the slot holds no resources.
    pub fn is_empty(&self) -> bool {
        self.texture.is_none() && self.input.is_none() && self.output.is_none()
    }

    /// Whether the slot is ready for submission.
    pub fn is_populated(&self) -> bool {
        self.texture.is_some()
            && self.input.as_ref().is_some_and(InputFrame::is_mapped)
            && self.output.as_ref().is_some_and(OutputBitstream::is_allocated)
    }
}

/// Fixed-capacity ring of [`Frame`]s.
#[derive(Debug)]
pub struct FrameRing {
    slots: Vec<Frame>,
    frame_count: u64,
}

impl Default for FrameRing {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameRing {
    pub fn new() -> Self {
        Self {
            slots: (0..RING_CAPACITY).map(|_| Frame::default()).collect(),
            frame_count: 0,
        }
    }

    /// Populate every slot: texture, register, map, output bitstream.
    ///
    /// Stops at the first failure, leaving the ring partially populated;
    /// callers follow up with [`teardown`](Self::teardown).
    pub fn allocate(
        &mut self,
        registrar: &Registrar<'_>,
        device: &mut dyn GraphicsDevice,
        resource_type: NvEncInputResourceType,
        format: NvEncBufferFormat,
        width: u32,
        height: u32,
    ) -> Result<(), EncoderError> {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let texture = device.create_default_texture(width, height)?;
            let native = device.input_resource(&texture);
            slot.texture = Some(texture);
            let native = native?;

            let input = slot.input.insert(registrar.register(
                resource_type,
                native,
                width,
                height,
                format,
            )?);
            registrar.map(input)?;

            slot.output = Some(registrar.create_bitstream()?);
            debug!(index, width, height, "Allocated ring slot");
        }
        Ok(())
    }

    /// Release every slot's resources in reverse acquisition order.
    ///
    /// Works on a partially populated ring and is idempotent. Failures are
    /// logged; the slot is cleared regardless.
    pub fn teardown(&mut self, registrar: &Registrar<'_>, device: &mut dyn GraphicsDevice) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_empty() {
                continue;
            }
            if let Some(mut input) = slot.input.take() {
                if let Err(e) = registrar.discard(&mut input) {
                    error!(index, error = %e, "Failed to release ring input");
                }
            }
            if let Some(mut output) = slot.output.take() {
                if let Err(e) = registrar.destroy_bitstream(&mut output) {
                    error!(index, error = %e, "Failed to destroy ring output");
                }
            }
            if let Some(texture) = slot.texture.take() {
                device.release_texture(texture);
            }
            slot.encoded = Vec::new();
            debug!(index, "Released ring slot");
        }
    }

    /// Slot selected by the current frame counter.
    pub fn current_index(&self) -> usize {
        (self.frame_count % RING_CAPACITY as u64) as usize
    }

    pub fn current(&self) -> &Frame {
        &self.slots[self.current_index()]
    }

    pub fn current_mut(&mut self) -> &mut Frame {
        let index = self.current_index();
        &mut self.slots[index]
    }

    pub fn slot(&self, index: usize) -> Option<&Frame> {
        self.slots.get(index)
    }

    /// Move to the next slot after a successful submission.
    pub fn advance(&mut self) {
        self.frame_count += 1;
    }

    /// Frames submitted through the ring since creation.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Whether no slot holds any resource.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Frame::is_empty)
    }

    /// Whether every slot is ready for submission.
    pub fn is_populated(&self) -> bool {
        self.slots.iter().all(Frame::is_populated)
    }
}
