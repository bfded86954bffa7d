use crate::{Complex16, TapeError};

/// Largest element a typed buffer holds, in bytes.
const LARGEST_ELEMENT: usize = size_of::<Complex16>();

// TODO: let each kind carry its own capacity, pointer buffers rarely need 512
#[derive(Debug, Default, Clone, Copy)]
pub struct TapeCreateInfo {
    /// Size of one block of the main stack in bytes.
    pub block_size: Option<usize>,
    /// Number of elements a typed buffer holds before it spills to the main stack.
    pub buffer_capacity: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapeSettings {
    pub block_size: usize,
    pub buffer_capacity: usize,
}

impl Default for TapeSettings {
    fn default() -> Self {
        Self {
            block_size: 65_536,   // 64 KB = 2^16
            buffer_capacity: 512, // elements, per kind
        }
    }
}

impl TapeSettings {
    pub fn from_info(info: TapeCreateInfo) -> Self {
        let mut settings = Self::default();
        info.block_size.inspect(|&val| settings.block_size = val);
        info.buffer_capacity
            .inspect(|&val| settings.buffer_capacity = val);
        settings
    }

    #[inline]
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.block_size == 0 {
            return Err("block_size must be > 0");
        }
        if self.buffer_capacity == 0 {
            return Err("buffer_capacity must be > 0");
        }
        if self.buffer_capacity.checked_mul(LARGEST_ELEMENT).is_none() {
            return Err("buffer_capacity too large for a single flush");
        }
        if self.block_size.checked_mul(u32::MAX as usize).is_none() {
            return Err("block_size too large for tape locations");
        }
        Ok(())
    }

    pub(crate) fn checked(self) -> Result<Self, TapeError> {
        self.validate().map_err(TapeError::InvalidSettings)?;
        Ok(self)
    }
}
