use bytemuck::Pod;

use crate::{
    BitBuffer, BufferMarks, Buffers, Kind, Location, MainStack, Result,
    Scalar, TapeCreateInfo, TapeError, TapeSettings,
};

/// A checkpointable adjoint tape.
///
/// Values are pushed during a forward sweep and popped in exact reverse order
/// during the adjoint sweep. `start_repeat`, `reset_repeat` and `end_repeat`
/// bracket a recorded segment that will be read more than once.
#[derive(Debug)]
pub struct AdStack {
    settings: TapeSettings,
    stack: MainStack,
    buffers: Buffers,
    /// One entry per repeat level, in lock-step with the main stack's levels.
    marks: Vec<BufferMarks>,
    /// Bytes pushed into typed buffers minus bytes they spilled.
    buffered_traffic: i64,
}

impl AdStack {
    pub fn new(info: TapeCreateInfo) -> Result<Self> {
        Self::with_settings(TapeSettings::from_info(info))
    }

    pub fn with_settings(settings: TapeSettings) -> Result<Self> {
        let settings = settings.checked()?;
        Ok(Self {
            settings,
            stack: MainStack::new(settings.block_size)?,
            buffers: Buffers::new(settings.buffer_capacity),
            marks: Vec::new(),
            buffered_traffic: 0,
        })
    }

    #[inline]
    pub fn settings(&self) -> TapeSettings {
        self.settings
    }

    #[inline]
    pub fn stack(&self) -> &MainStack {
        &self.stack
    }

    #[inline]
    pub fn buffers(&self) -> &Buffers {
        &self.buffers
    }

    #[inline]
    pub fn location(&self) -> Location {
        self.stack.location()
    }

    pub fn set_location(&mut self, location: Location) -> Result<()> {
        self.stack.set_location(location)
    }

    // ── Bulk ──────────────────────────────────────────────────────────

    pub fn push_n_array(&mut self, data: &[u8], protect: bool) -> Result<()> {
        self.stack.push_bytes(data, protect)
    }

    pub fn pop_n_array(&mut self, out: &mut [u8], protect: bool) -> Result<()> {
        self.stack.pop_bytes(out, protect)
    }

    /// Pushes a whole array straight to the main stack, bypassing the buffers.
    pub fn push_array<T: Pod>(&mut self, data: &[T]) -> Result<()> {
        self.stack.push_bytes(bytemuck::cast_slice(data), true)
    }

    pub fn pop_array<T: Pod>(&mut self, out: &mut [T]) -> Result<()> {
        self.stack.pop_bytes(bytemuck::cast_slice_mut(out), true)
    }

    // ── Scalars ───────────────────────────────────────────────────────

    #[inline]
    pub fn push<T: Scalar>(&mut self, value: T) -> Result<()> {
        let flushed = T::buffer_mut(&mut self.buffers).push(value, &mut self.stack)?;
        self.buffered_traffic += size_of::<T>() as i64;
        if flushed {
            self.buffered_traffic -= (self.settings.buffer_capacity * size_of::<T>()) as i64;
        }
        Ok(())
    }

    #[inline]
    pub fn pop<T: Scalar>(&mut self) -> Result<T> {
        T::buffer_mut(&mut self.buffers).pop(&mut self.stack)
    }

    #[inline]
    pub fn push_bit(&mut self, bit: bool) -> Result<()> {
        self.buffers.bits.push(bit, &mut self.stack).map(|_| ())
    }

    #[inline]
    pub fn pop_bit(&mut self) -> Result<bool> {
        self.buffers.bits.pop(&mut self.stack)
    }

    pub fn push_boolean(&mut self, value: bool) -> Result<()> {
        self.push_bit(value)
    }

    pub fn pop_boolean(&mut self) -> Result<bool> {
        self.pop_bit()
    }

    /// Records a branch tag of `bits` bits (1 to 8).
    ///
    /// Bits go least significant first; the last pushed bit is set when any
    /// bit at or above the top position is set. Popping with the same width
    /// rebuilds the tag most significant bit first.
    pub fn push_control(&mut self, value: u32, bits: u32) -> Result<()> {
        check_control_width(bits)?;
        let mut rest = value;
        for _ in 1..bits {
            self.push_bit(rest & 1 == 1)?;
            rest >>= 1;
        }
        self.push_bit(rest != 0)
    }

    pub fn pop_control(&mut self, bits: u32) -> Result<u32> {
        check_control_width(bits)?;
        let mut value = 0;
        for _ in 0..bits {
            value = (value << 1) | u32::from(self.pop_bit()?);
        }
        Ok(value)
    }

    // ── Repeat levels ─────────────────────────────────────────────────

    /// Opens a repeat level over the main stack and every buffer.
    ///
    /// The buffers' valid contents are recorded into the new level's
    /// protected region so `reset_repeat` can bring them back.
    pub fn start_repeat(&mut self) -> Result<()> {
        let pending = self.stack.begin_repeat();
        let marks = self.buffers.marks();
        if let Err(err) = self.buffers.save(&mut self.stack) {
            self.stack.abandon_repeat(pending);
            return Err(err);
        }
        self.stack.commit_repeat(pending);
        self.marks.push(marks);
        Ok(())
    }

    /// Abandons the current replay: the next pushes land exactly where the
    /// first pass put them and every buffer is as it was at `start_repeat`.
    pub fn reset_repeat(&mut self) -> Result<()> {
        self.stack.reset_repeat_begin()?;
        let marks = self
            .marks
            .last()
            .copied()
            .expect("buffer marks track repeat levels");
        self.buffers.restore(&marks, &mut self.stack)?;
        self.stack.reset_repeat_finish()
    }

    pub fn end_repeat(&mut self) -> Result<()> {
        self.stack.end_repeat()?;
        self.marks.pop();
        Ok(())
    }

    #[inline]
    pub fn repeat_depth(&self) -> usize {
        debug_assert_eq!(self.marks.len(), self.stack.repeat_depth());
        self.marks.len()
    }

    /// Buffer fill indices captured by each open repeat level, outermost first.
    pub fn repeat_marks(&self) -> &[BufferMarks] {
        &self.marks
    }

    // ── Diagnostics ───────────────────────────────────────────────────

    #[inline]
    pub fn buffer_index(&self, kind: Kind) -> usize {
        self.buffers.index(kind)
    }

    pub fn bit_buffer(&self) -> &BitBuffer {
        self.buffers.bits()
    }

    pub fn current_blocks(&self) -> usize {
        self.stack.current_blocks()
    }

    pub fn peak_blocks(&self) -> usize {
        self.stack.chain().len()
    }

    pub fn peak_bytes(&self) -> u64 {
        self.peak_blocks() as u64 * self.settings.block_size as u64
    }

    /// Bytes pushed by protected bulk transfers and scalar pushes together.
    pub fn total_traffic(&self) -> u64 {
        self.stack.traffic().saturating_add_signed(self.buffered_traffic)
    }
}

fn check_control_width(bits: u32) -> Result<()> {
    if (1..=8).contains(&bits) {
        Ok(())
    } else {
        Err(TapeError::InvalidControlWidth(bits))
    }
}
