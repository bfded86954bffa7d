mod block;
mod buffer;
mod dump;
mod error;
mod location;
mod repeat;
mod settings;
mod stack;
mod tape;

pub mod global;
pub mod sweep;

pub use block::{Block, BlockChain, BlockId};
pub use buffer::{
    BitBuffer, BufferMarks, Buffers, Complex8, Complex16, Kind, Scalar,
    TypedBuffer,
};
pub use dump::{BufferDump, SizeLine, TapeDump, repeat_chain};
pub use error::{Result, TapeError};
pub use location::{Location, LocationDisplay};
pub use repeat::{PendingRepeat, RepeatCell};
pub use settings::{TapeCreateInfo, TapeSettings};
pub use stack::MainStack;
pub use tape::AdStack;
