//! One tape for the whole process, behind flat named entry points.
//!
//! This is the surface generated adjoint code links against. It has no way
//! to hand an error back, so every [`TapeError`] raised here is reported and
//! ends the process with status 1. Use [`AdStack`] directly for recoverable
//! errors.

use std::process;
use std::sync::OnceLock;

use parking_lot::Mutex;

use crate::{
    AdStack, Complex8, Complex16, Kind, Location, Result, TapeCreateInfo,
    TapeError,
};

static TAPE: OnceLock<Mutex<AdStack>> = OnceLock::new();

fn tape() -> &'static Mutex<AdStack> {
    TAPE.get_or_init(|| {
        let tape = AdStack::new(TapeCreateInfo::default())
            .unwrap_or_else(|err| fatal(err));
        Mutex::new(tape)
    })
}

fn with_tape<R>(op: impl FnOnce(&mut AdStack) -> Result<R>) -> R {
    let mut guard = tape().lock();
    let result = op(&mut *guard);
    drop(guard);
    result.unwrap_or_else(|err| fatal(err))
}

#[cold]
fn fatal(err: TapeError) -> ! {
    log::error!("fatal tape error: {err}");
    eprintln!("adstack: {err}");
    process::exit(1);
}

/// Replaces the process tape with an empty one built from `info`.
///
/// Unlike every other entry point, invalid settings are returned rather
/// than fatal, so a caller can fall back to the defaults.
pub fn reinitialize(info: TapeCreateInfo) -> Result<()> {
    let fresh = AdStack::new(info)?;
    *tape().lock() = fresh;
    log::debug!("process tape reinitialized");
    Ok(())
}

// ── Scalars and arrays ────────────────────────────────────────────────

macro_rules! entry_points {
    ($($ty:ty => $push:ident, $pop:ident, $push_array:ident, $pop_array:ident;)*) => {
        $(
            #[inline]
            pub fn $push(value: $ty) {
                with_tape(|tape| tape.push(value))
            }

            #[inline]
            pub fn $pop() -> $ty {
                with_tape(|tape| tape.pop::<$ty>())
            }

            pub fn $push_array(values: &[$ty]) {
                with_tape(|tape| tape.push_array(values))
            }

            pub fn $pop_array(out: &mut [$ty]) {
                with_tape(|tape| tape.pop_array(out))
            }
        )*
    };
}

entry_points! {
    i32 => push_integer4, pop_integer4, push_integer4_array, pop_integer4_array;
    i64 => push_integer8, pop_integer8, push_integer8_array, pop_integer8_array;
    f32 => push_real4, pop_real4, push_real4_array, pop_real4_array;
    f64 => push_real8, pop_real8, push_real8_array, pop_real8_array;
    Complex8 => push_complex8, pop_complex8, push_complex8_array, pop_complex8_array;
    Complex16 => push_complex16, pop_complex16, push_complex16_array, pop_complex16_array;
    u8 => push_character, pop_character, push_character_array, pop_character_array;
    usize => push_pointer, pop_pointer, push_pointer_array, pop_pointer_array;
}

pub fn push_bit(bit: bool) {
    with_tape(|tape| tape.push_bit(bit))
}

pub fn pop_bit() -> bool {
    with_tape(|tape| tape.pop_bit())
}

pub fn push_boolean(value: bool) {
    with_tape(|tape| tape.push_boolean(value))
}

pub fn pop_boolean() -> bool {
    with_tape(|tape| tape.pop_boolean())
}

pub fn push_control(value: u32, bits: u32) {
    with_tape(|tape| tape.push_control(value, bits))
}

pub fn pop_control(bits: u32) -> u32 {
    with_tape(|tape| tape.pop_control(bits))
}

pub fn push_n_array(data: &[u8], protect: bool) {
    with_tape(|tape| tape.push_n_array(data, protect))
}

pub fn pop_n_array(out: &mut [u8], protect: bool) {
    with_tape(|tape| tape.pop_n_array(out, protect))
}

// ── Repeat levels ─────────────────────────────────────────────────────

pub fn start_repeat() {
    with_tape(|tape| tape.start_repeat())
}

pub fn reset_repeat() {
    with_tape(|tape| tape.reset_repeat())
}

pub fn end_repeat() {
    with_tape(|tape| tape.end_repeat())
}

// ── Diagnostics ───────────────────────────────────────────────────────

pub fn location() -> Location {
    tape().lock().location()
}

pub fn set_location(location: Location) {
    with_tape(|tape| tape.set_location(location))
}

pub fn repeat_depth() -> usize {
    tape().lock().repeat_depth()
}

pub fn buffer_index(kind: Kind) -> usize {
    tape().lock().buffer_index(kind)
}

pub fn peak_blocks() -> usize {
    tape().lock().peak_blocks()
}

pub fn peak_bytes() -> u64 {
    tape().lock().peak_bytes()
}

pub fn total_traffic() -> u64 {
    tape().lock().total_traffic()
}

/// Prints every block and the repeat chain to stdout.
pub fn show_stack() {
    println!("{}", tape().lock().dump());
}

/// Prints every typed buffer to stdout.
pub fn show_buffers() {
    print!("{}", tape().lock().dump_buffers());
}

pub fn show_size(pos: usize) {
    println!("{}", tape().lock().size_line(pos));
}

pub fn show_location() {
    let tape = tape().lock();
    println!("{}", tape.location().display(tape.settings().block_size));
}

pub fn show_peak_size() {
    let tape = tape().lock();
    println!(
        "{} bytes maximum tape memory ({} blocks)",
        tape.peak_bytes(),
        tape.peak_blocks()
    );
}

pub fn show_total_traffic() {
    println!("{} bytes pushed", tape().lock().total_traffic());
}
