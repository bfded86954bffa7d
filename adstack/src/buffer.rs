//! Per-kind staging buffers in front of the main stack.
//!
//! Scalar pushes land in a small fixed-capacity buffer of their kind and only
//! reach the main stack as one bulk transfer per full buffer. Pops drain the
//! buffer and pull a whole buffer back when it runs empty.

use std::fmt;

use bytemuck::{Pod, Zeroable};

use crate::{MainStack, Result};

// ── Element kinds ─────────────────────────────────────────────────────

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Complex8 {
    pub re: f32,
    pub im: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Complex16 {
    pub re: f64,
    pub im: f64,
}

impl Complex8 {
    pub const fn new(re: f32, im: f32) -> Self {
        Self { re, im }
    }
}

impl Complex16 {
    pub const fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Integer4 = 0,
    Integer8 = 1,
    Real4 = 2,
    Real8 = 3,
    Complex8 = 4,
    Complex16 = 5,
    Character = 6,
    Bit = 7,
    Pointer = 8,
}

impl Kind {
    pub const COUNT: usize = 9;

    pub const ALL: [Kind; Kind::COUNT] = [
        Kind::Integer4,
        Kind::Integer8,
        Kind::Real4,
        Kind::Real8,
        Kind::Complex8,
        Kind::Complex16,
        Kind::Character,
        Kind::Bit,
        Kind::Pointer,
    ];

    /// Short tag used in traces and dumps.
    pub fn tag(self) -> &'static str {
        match self {
            Kind::Integer4 => "I4",
            Kind::Integer8 => "I8",
            Kind::Real4 => "R4",
            Kind::Real8 => "R8",
            Kind::Complex8 => "C8",
            Kind::Complex16 => "C16",
            Kind::Character => "char",
            Kind::Bit => "bit",
            Kind::Pointer => "PTR",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A value kind with its own typed buffer.
///
/// Pointers are stored as `usize`, so their width on the tape is fixed by
/// the target at build time and never mixed within one tape.
pub trait Scalar: Pod + fmt::Debug {
    const KIND: Kind;

    fn buffer(buffers: &Buffers) -> &TypedBuffer<Self>;

    fn buffer_mut(buffers: &mut Buffers) -> &mut TypedBuffer<Self>;
}

macro_rules! scalar {
    ($($ty:ty => $kind:ident, $field:ident;)*) => {
        $(
            impl Scalar for $ty {
                const KIND: Kind = Kind::$kind;

                #[inline(always)]
                fn buffer(buffers: &Buffers) -> &TypedBuffer<Self> {
                    &buffers.$field
                }

                #[inline(always)]
                fn buffer_mut(buffers: &mut Buffers) -> &mut TypedBuffer<Self> {
                    &mut buffers.$field
                }
            }
        )*
    };
}

scalar! {
    i32 => Integer4, integer4;
    i64 => Integer8, integer8;
    f32 => Real4, real4;
    f64 => Real8, real8;
    Complex8 => Complex8, complex8;
    Complex16 => Complex16, complex16;
    u8 => Character, character;
    usize => Pointer, pointer;
}

// ── Typed buffer ──────────────────────────────────────────────────────

#[derive(Debug)]
pub struct TypedBuffer<T> {
    items: Box<[T]>,
    /// Number of valid, unflushed elements.
    index: usize,
}

impl<T: Pod> TypedBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: vec![T::zeroed(); capacity].into_boxed_slice(),
            index: 0,
        }
    }

    #[inline(always)]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Appends `value`, spilling the full buffer to `stack` when it fills up.
    /// Returns whether a spill happened.
    #[inline]
    pub fn push(&mut self, value: T, stack: &mut MainStack) -> Result<bool> {
        self.items[self.index] = value;
        if self.index + 1 >= self.capacity() {
            stack.push_bytes(bytemuck::cast_slice(&self.items), true)?;
            self.index = 0;
            Ok(true)
        } else {
            self.index += 1;
            Ok(false)
        }
    }

    /// Takes the top value, refilling a whole buffer from `stack` when empty.
    #[inline]
    pub fn pop(&mut self, stack: &mut MainStack) -> Result<T> {
        if self.index == 0 {
            stack.pop_bytes(bytemuck::cast_slice_mut(&mut self.items), true)?;
            self.index = self.capacity() - 1;
        } else {
            self.index -= 1;
        }
        Ok(self.items[self.index])
    }

    /// Copies the valid elements onto `stack`, outside repeat protection.
    fn save(&self, stack: &mut MainStack) -> Result<()> {
        stack.push_bytes(bytemuck::cast_slice(&self.items[..self.index]), false)
    }

    /// Reverse of [`save`](Self::save) for a buffer that held `index` elements.
    fn restore(&mut self, index: usize, stack: &mut MainStack) -> Result<()> {
        self.index = index;
        stack.pop_bytes(
            bytemuck::cast_slice_mut(&mut self.items[..index]),
            false,
        )
    }
}

// ── Bit buffer ────────────────────────────────────────────────────────

/// 32 packed bits. The most recently pushed bit is the lowest one.
#[derive(Debug, Default)]
pub struct BitBuffer {
    word: u32,
    index: usize,
}

impl BitBuffer {
    pub const BITS: usize = u32::BITS as usize;

    #[inline(always)]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline(always)]
    pub fn word(&self) -> u32 {
        self.word
    }

    #[inline]
    pub fn push(&mut self, bit: bool, stack: &mut MainStack) -> Result<bool> {
        let word = (self.word << 1) | u32::from(bit);
        if self.index + 1 >= Self::BITS {
            stack.push_bytes(&word.to_ne_bytes(), true)?;
            self.word = 0;
            self.index = 0;
            Ok(true)
        } else {
            self.word = word;
            self.index += 1;
            Ok(false)
        }
    }

    #[inline]
    pub fn pop(&mut self, stack: &mut MainStack) -> Result<bool> {
        if self.index == 0 {
            let mut bytes = [0u8; 4];
            stack.pop_bytes(&mut bytes, true)?;
            self.word = u32::from_ne_bytes(bytes);
            self.index = Self::BITS - 1;
        } else {
            self.index -= 1;
        }
        let bit = self.word & 1 == 1;
        self.word >>= 1;
        Ok(bit)
    }

    // an empty bit buffer always holds a zero word, so it has nothing to save
    fn save(&self, stack: &mut MainStack) -> Result<()> {
        if self.index == 0 {
            return Ok(());
        }
        stack.push_bytes(&self.word.to_ne_bytes(), false)
    }

    fn restore(&mut self, index: usize, stack: &mut MainStack) -> Result<()> {
        self.index = index;
        self.word = 0;
        if index == 0 {
            return Ok(());
        }
        let mut bytes = [0u8; 4];
        stack.pop_bytes(&mut bytes, false)?;
        self.word = u32::from_ne_bytes(bytes);
        Ok(())
    }
}

// ── All buffers ───────────────────────────────────────────────────────

/// Fill indices of every buffer, indexed by [`Kind`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferMarks(pub [usize; Kind::COUNT]);

impl BufferMarks {
    #[inline]
    pub fn get(&self, kind: Kind) -> usize {
        self.0[kind as usize]
    }
}

#[derive(Debug)]
pub struct Buffers {
    pub(crate) integer4: TypedBuffer<i32>,
    pub(crate) integer8: TypedBuffer<i64>,
    pub(crate) real4: TypedBuffer<f32>,
    pub(crate) real8: TypedBuffer<f64>,
    pub(crate) complex8: TypedBuffer<Complex8>,
    pub(crate) complex16: TypedBuffer<Complex16>,
    pub(crate) character: TypedBuffer<u8>,
    pub(crate) bits: BitBuffer,
    pub(crate) pointer: TypedBuffer<usize>,
}

impl Buffers {
    pub fn new(capacity: usize) -> Self {
        Self {
            integer4: TypedBuffer::new(capacity),
            integer8: TypedBuffer::new(capacity),
            real4: TypedBuffer::new(capacity),
            real8: TypedBuffer::new(capacity),
            complex8: TypedBuffer::new(capacity),
            complex16: TypedBuffer::new(capacity),
            character: TypedBuffer::new(capacity),
            bits: BitBuffer::default(),
            pointer: TypedBuffer::new(capacity),
        }
    }

    pub fn index(&self, kind: Kind) -> usize {
        match kind {
            Kind::Integer4 => self.integer4.index(),
            Kind::Integer8 => self.integer8.index(),
            Kind::Real4 => self.real4.index(),
            Kind::Real8 => self.real8.index(),
            Kind::Complex8 => self.complex8.index(),
            Kind::Complex16 => self.complex16.index(),
            Kind::Character => self.character.index(),
            Kind::Bit => self.bits.index(),
            Kind::Pointer => self.pointer.index(),
        }
    }

    pub fn marks(&self) -> BufferMarks {
        BufferMarks(Kind::ALL.map(|kind| self.index(kind)))
    }

    pub fn bits(&self) -> &BitBuffer {
        &self.bits
    }

    /// Pushes the valid part of every buffer onto `stack`.
    pub(crate) fn save(&self, stack: &mut MainStack) -> Result<()> {
        self.integer4.save(stack)?;
        self.integer8.save(stack)?;
        self.real4.save(stack)?;
        self.real8.save(stack)?;
        self.complex8.save(stack)?;
        self.complex16.save(stack)?;
        self.character.save(stack)?;
        self.bits.save(stack)?;
        self.pointer.save(stack)
    }

    /// Pops what [`save`](Self::save) pushed while `marks` were current.
    pub(crate) fn restore(
        &mut self,
        marks: &BufferMarks,
        stack: &mut MainStack,
    ) -> Result<()> {
        self.pointer.restore(marks.get(Kind::Pointer), stack)?;
        self.bits.restore(marks.get(Kind::Bit), stack)?;
        self.character.restore(marks.get(Kind::Character), stack)?;
        self.complex16.restore(marks.get(Kind::Complex16), stack)?;
        self.complex8.restore(marks.get(Kind::Complex8), stack)?;
        self.real8.restore(marks.get(Kind::Real8), stack)?;
        self.real4.restore(marks.get(Kind::Real4), stack)?;
        self.integer8.restore(marks.get(Kind::Integer8), stack)?;
        self.integer4.restore(marks.get(Kind::Integer4), stack)
    }
}
