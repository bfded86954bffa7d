//! A synthetic forward/adjoint sweep driven the way generated adjoint code
//! drives the tape.
//!
//! Every step records one value of every kind, a control tag and a short
//! array, all derived from the step number so the adjoint sweep can check
//! what it pops. With checkpointing on, the forward sweep records only one
//! snapshot per segment; the adjoint sweep opens a repeat level over each
//! snapshot, re-records the segment from it and replays that several times.

use std::io::{self, Write};

use crate::{AdStack, Complex8, Complex16, Result, TapeError};

/// Width of the per-step control tag.
const TAG_BITS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepConfig {
    pub steps: usize,
    /// Steps per checkpointed segment; 0 records every step up front.
    pub checkpoint_every: usize,
    /// Times each segment is re-recorded and popped during the adjoint sweep.
    pub replays: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            steps: 100,
            checkpoint_every: 10,
            replays: 2,
        }
    }
}

impl SweepConfig {
    pub fn validate(&self) -> std::result::Result<(), &'static str> {
        if self.checkpoint_every > 0 && self.replays == 0 {
            return Err("replays must be > 0 when checkpointing");
        }
        Ok(())
    }

    fn segments(&self) -> Vec<(usize, usize)> {
        let width = if self.checkpoint_every == 0 {
            self.steps.max(1)
        } else {
            self.checkpoint_every
        };
        (0..self.steps)
            .step_by(width)
            .map(|start| (start, (start + width).min(self.steps)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub step: usize,
    pub expected: String,
    pub found: String,
}

#[derive(Debug, Default)]
pub struct SweepReport {
    /// Steps popped and checked, counting every replay.
    pub steps_checked: usize,
    pub mismatches: Vec<Mismatch>,
    pub peak_blocks: usize,
    pub peak_bytes: u64,
    pub total_traffic: u64,
    /// Whether the tape ended where it started, cursor and buffers included.
    pub balanced: bool,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty() && self.balanced
    }
}

#[derive(Debug, Clone, PartialEq)]
struct StepValues {
    integer4: i32,
    integer8: i64,
    real4: f32,
    real8: f64,
    complex8: Complex8,
    complex16: Complex16,
    character: u8,
    bit: bool,
    pointer: usize,
    tag: u32,
    array: Vec<f64>,
}

impl StepValues {
    fn for_step(step: usize) -> Self {
        let s = step as i64;
        Self {
            integer4: (s as i32).wrapping_mul(7) - 3,
            integer8: s * 1_000_003,
            real4: step as f32 * 0.5,
            real8: -(step as f64) * 0.25,
            complex8: Complex8::new(step as f32, -1.5),
            complex16: Complex16::new(0.125, step as f64),
            character: b'a' + (step % 26) as u8,
            bit: step % 3 == 0,
            pointer: 0x1000 + step * 8,
            tag: (step % (1 << TAG_BITS)) as u32,
            array: (0..step % 4).map(|i| (step * 10 + i) as f64).collect(),
        }
    }
}

/// State a segment restarts from.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Snapshot {
    start: i64,
    state: [f64; 3],
}

impl Snapshot {
    fn at(start: usize) -> Self {
        let x = start as f64;
        Self {
            start: start as i64,
            state: [x, x * x, 1.0 / (x + 1.0)],
        }
    }
}

pub struct Sweep<'a> {
    tape: &'a mut AdStack,
    config: SweepConfig,
    trace: Option<&'a mut dyn Write>,
    report: SweepReport,
}

impl<'a> Sweep<'a> {
    pub fn new(tape: &'a mut AdStack, config: SweepConfig) -> Self {
        Self {
            tape,
            config,
            trace: None,
            report: SweepReport::default(),
        }
    }

    /// Writes one line per recorded or popped step to `out`.
    pub fn with_trace(mut self, out: &'a mut dyn Write) -> Self {
        self.trace = Some(out);
        self
    }

    pub fn run(mut self) -> Result<SweepReport> {
        self.config.validate().map_err(TapeError::InvalidSettings)?;
        let start = self.tape.location();
        let marks = self.tape.buffers().marks();
        let segments = self.config.segments();

        if self.config.checkpoint_every == 0 {
            for step in 0..self.config.steps {
                self.record(step)?;
            }
            for step in (0..self.config.steps).rev() {
                self.check(step)?;
            }
        } else {
            for &(first, _) in &segments {
                self.push_snapshot(first)?;
            }
            for &(first, end) in segments.iter().rev() {
                self.replay_segment(first, end)?;
            }
        }

        self.report.balanced = self.tape.location() == start
            && self.tape.buffers().marks() == marks
            && self.tape.repeat_depth() == 0;
        self.report.peak_blocks = self.tape.peak_blocks();
        self.report.peak_bytes = self.tape.peak_bytes();
        self.report.total_traffic = self.tape.total_traffic();
        log::debug!(
            "sweep finished: {} steps checked, {} mismatches",
            self.report.steps_checked,
            self.report.mismatches.len()
        );
        Ok(self.report)
    }

    fn replay_segment(&mut self, first: usize, end: usize) -> Result<()> {
        self.tape.start_repeat()?;
        for replay in 0..self.config.replays {
            if replay > 0 {
                self.tape.reset_repeat()?;
            }
            let last = replay + 1 == self.config.replays;
            self.pop_snapshot(first, if last { "-s" } else { "Ls" })?;
            for step in first..end {
                self.record(step)?;
            }
            for step in (first..end).rev() {
                self.check(step)?;
            }
        }
        self.tape.end_repeat()
    }

    fn record(&mut self, step: usize) -> Result<()> {
        let values = StepValues::for_step(step);
        let tape = &mut *self.tape;
        tape.push(values.integer4)?;
        tape.push(values.integer8)?;
        tape.push(values.real4)?;
        tape.push(values.real8)?;
        tape.push(values.complex8)?;
        tape.push(values.complex16)?;
        tape.push(values.character)?;
        tape.push_bit(values.bit)?;
        tape.push(values.pointer)?;
        tape.push_control(values.tag, TAG_BITS)?;
        tape.push_array(&values.array)?;
        self.trace_step("+", step, values.array.len());
        Ok(())
    }

    fn check(&mut self, step: usize) -> Result<()> {
        let expected = StepValues::for_step(step);
        let tape = &mut *self.tape;
        let mut array = vec![0.0f64; expected.array.len()];
        tape.pop_array(&mut array)?;
        let tag = tape.pop_control(TAG_BITS)?;
        let pointer = tape.pop::<usize>()?;
        let bit = tape.pop_bit()?;
        let character = tape.pop::<u8>()?;
        let complex16 = tape.pop::<Complex16>()?;
        let complex8 = tape.pop::<Complex8>()?;
        let real8 = tape.pop::<f64>()?;
        let real4 = tape.pop::<f32>()?;
        let integer8 = tape.pop::<i64>()?;
        let integer4 = tape.pop::<i32>()?;
        let found = StepValues {
            integer4,
            integer8,
            real4,
            real8,
            complex8,
            complex16,
            character,
            bit,
            pointer,
            tag,
            array,
        };
        self.trace_step("-", step, expected.array.len());

        self.report.steps_checked += 1;
        if found != expected {
            log::error!("step {step}: expected {expected:?}, found {found:?}");
            self.report.mismatches.push(Mismatch {
                step,
                expected: format!("{expected:?}"),
                found: format!("{found:?}"),
            });
        }
        Ok(())
    }

    fn push_snapshot(&mut self, first: usize) -> Result<()> {
        let snapshot = Snapshot::at(first);
        self.tape.push(snapshot.start)?;
        self.tape.push_array(&snapshot.state)?;
        self.trace_snapshot("+s", first);
        Ok(())
    }

    fn pop_snapshot(&mut self, first: usize, prefix: &str) -> Result<()> {
        let mut state = [0.0; 3];
        self.tape.pop_array(&mut state)?;
        let start = self.tape.pop::<i64>()?;
        self.trace_snapshot(prefix, first);

        let expected = Snapshot::at(first);
        let found = Snapshot { start, state };
        if found != expected {
            log::error!("snapshot {first}: expected {expected:?}, found {found:?}");
            self.report.mismatches.push(Mismatch {
                step: first,
                expected: format!("{expected:?}"),
                found: format!("{found:?}"),
            });
        }
        Ok(())
    }

    fn trace_step(&mut self, prefix: &str, step: usize, array_len: usize) {
        let Some(out) = self.trace.as_mut() else {
            return;
        };
        if let Err(err) = write_step(out, prefix, step, array_len) {
            log::warn!("dropping sweep trace: {err}");
            self.trace = None;
        }
    }

    fn trace_snapshot(&mut self, prefix: &str, first: usize) {
        let Some(out) = self.trace.as_mut() else {
            return;
        };
        if let Err(err) = writeln!(out, "{prefix}{first:02}: I8 R8[3]") {
            log::warn!("dropping sweep trace: {err}");
            self.trace = None;
        }
    }
}

fn write_step(
    out: &mut dyn Write,
    prefix: &str,
    step: usize,
    array_len: usize,
) -> io::Result<()> {
    write!(
        out,
        "{prefix}{step:02}: I4 I8 R4 R8 C8 C16 char bit PTR bit[{TAG_BITS}]"
    )?;
    if array_len != 0 {
        write!(out, " R8[{array_len}]")?;
    }
    writeln!(out)
}
