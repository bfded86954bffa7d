//! Error types for the tape

use thiserror::Error;

use crate::Location;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TapeError {
    #[error("out of memory (allocated {blocks} blocks of {block_size} bytes)")]
    OutOfMemory { blocks: usize, block_size: usize },

    #[error("popping from an empty stack: requested {requested} bytes, {available} available")]
    PopUnderflow { requested: usize, available: usize },

    #[error("{operation} called with no active repeat level")]
    NoActiveRepeat { operation: &'static str },

    #[error("location {location} lies beyond the {allocated} allocated bytes")]
    LocationOutOfRange { location: Location, allocated: usize },

    #[error("control tags are 1 to 8 bits wide, got {0}")]
    InvalidControlWidth(u32),

    #[error("invalid tape settings: {0}")]
    InvalidSettings(&'static str),
}

pub type Result<T> = std::result::Result<T, TapeError>;
