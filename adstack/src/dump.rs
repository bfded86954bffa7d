//! Human-readable views of a tape, for debugging generated adjoint code.
//!
//! None of these affect tape semantics.

use std::fmt::{self, Display, Formatter};

use bytemuck::Pod;

use crate::{AdStack, Kind, Location, RepeatCell, TypedBuffer};

/// Every block in hex, `|` at the cursor, followed by the repeat chain.
pub struct TapeDump<'a> {
    tape: &'a AdStack,
}

/// Contents of every typed buffer, `|` at the fill index, followed by the
/// index each open repeat level captured for that kind.
pub struct BufferDump<'a> {
    tape: &'a AdStack,
}

/// One-line position summary: cursor location and every fill index.
pub struct SizeLine<'a> {
    tape: &'a AdStack,
    pos: usize,
}

impl AdStack {
    pub fn dump(&self) -> TapeDump<'_> {
        TapeDump { tape: self }
    }

    pub fn dump_buffers(&self) -> BufferDump<'_> {
        BufferDump { tape: self }
    }

    pub fn size_line(&self, pos: usize) -> SizeLine<'_> {
        SizeLine { tape: self, pos }
    }
}

/// Renders the repeat chain as `<backPop|resume|freePush> ; ...`.
pub fn repeat_chain(repeats: &[RepeatCell], block_size: usize) -> String {
    if repeats.is_empty() {
        return " none!".to_string();
    }
    let mut out = String::new();
    for (i, cell) in repeats.iter().enumerate() {
        if i != 0 {
            out.push_str(" ; ");
        }
        let back_pop = cell
            .back_pop
            .map(|loc| loc.display(block_size).to_string())
            .unwrap_or_default();
        out.push_str(&format!(
            "<{back_pop}|{}|{}>",
            cell.resume.display(block_size),
            cell.free_push.display(block_size)
        ));
    }
    out
}

impl Display for TapeDump<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let stack = self.tape.stack();
        let block_size = stack.block_size();
        let cursor = stack.location();

        for (i, block) in stack.chain().iter().enumerate() {
            if i != 0 {
                write!(f, "\n        ")?;
            }
            write!(f, "[{}] ", block.rank)?;
            for (offset, byte) in block.contents.iter().enumerate() {
                if offset != 0 && offset % 4 == 0 {
                    write!(f, ".")?;
                }
                if cursor == Location::new(block.rank, offset, block_size)
                    && !(offset == 0 && block.rank > 0)
                {
                    write!(f, " | ")?;
                }
                write!(f, "{byte:02x}")?;
            }
            // a cursor on a block boundary belongs to the end of the lower block
            if cursor == Location::new(block.rank + 1, 0, block_size) {
                write!(f, " | ")?;
            }
        }
        write!(
            f,
            "\n        REPEATS:{}",
            repeat_chain(stack.repeats(), block_size)
        )
    }
}

fn write_buffer<T: Pod>(
    f: &mut Formatter<'_>,
    buffer: &TypedBuffer<T>,
    item: impl Fn(&mut Formatter<'_>, T) -> fmt::Result,
) -> fmt::Result {
    for (i, &value) in buffer.items().iter().enumerate() {
        if i == buffer.index() {
            write!(f, " | ")?;
        }
        item(f, value)?;
    }
    Ok(())
}

impl BufferDump<'_> {
    fn write_marks(&self, f: &mut Formatter<'_>, kind: Kind) -> fmt::Result {
        write!(f, "        REPEATS:")?;
        let marks = self.tape.repeat_marks();
        if marks.is_empty() {
            return writeln!(f, " none!");
        }
        let indices: Vec<String> =
            marks.iter().map(|m| m.get(kind).to_string()).collect();
        writeln!(f, "{}", indices.join(" ; "))
    }
}

impl Display for BufferDump<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let buffers = self.tape.buffers();

        write!(f, "        I4:")?;
        write_buffer(f, &buffers.integer4, |f, v| write!(f, " {v:11}"))?;
        self.write_marks(f, Kind::Integer4)?;

        write!(f, "        I8:")?;
        write_buffer(f, &buffers.integer8, |f, v| write!(f, " {v:11}"))?;
        self.write_marks(f, Kind::Integer8)?;

        write!(f, "        R4:")?;
        write_buffer(f, &buffers.real4, |f, v| write!(f, " {v:.6}"))?;
        self.write_marks(f, Kind::Real4)?;

        write!(f, "        R8:")?;
        write_buffer(f, &buffers.real8, |f, v| write!(f, " {v:.6}"))?;
        self.write_marks(f, Kind::Real8)?;

        write!(f, "        C8:")?;
        write_buffer(f, &buffers.complex8, |f, v| {
            write!(f, " ({:.6},{:.6})", v.re, v.im)
        })?;
        self.write_marks(f, Kind::Complex8)?;

        write!(f, "        C16:")?;
        write_buffer(f, &buffers.complex16, |f, v| {
            write!(f, " ({:.6},{:.6})", v.re, v.im)
        })?;
        self.write_marks(f, Kind::Complex16)?;

        write!(f, "        STR:")?;
        write_buffer(f, &buffers.character, |f, v| {
            write!(f, " {}", v.escape_ascii())
        })?;
        self.write_marks(f, Kind::Character)?;

        let bits = buffers.bits();
        write!(f, "        BITS:{} in {:08x}", bits.index(), bits.word())?;
        self.write_marks(f, Kind::Bit)?;

        write!(f, "        PTR:")?;
        write_buffer(f, &buffers.pointer, |f, v| write!(f, " {v:x}"))?;
        self.write_marks(f, Kind::Pointer)
    }
}

impl Display for SizeLine<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let block_size = self.tape.settings().block_size;
        let indices: Vec<String> = Kind::ALL
            .iter()
            .map(|&kind| self.tape.buffer_index(kind).to_string())
            .collect();
        write!(
            f,
            " --{:5}--> <{}>{}",
            self.pos,
            self.tape.location().display(block_size),
            indices.join(".")
        )
    }
}
