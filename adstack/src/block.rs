//! Doubly chained blocks backing the main stack.
//!
//! Blocks live in an arena owned by [`BlockChain`] and refer to their
//! neighbours by index. A block is never freed once allocated, so its rank
//! (position from the head) is a stable identity for the life of the chain.

use crate::{Result, TapeError};

/// Arena index of a block. Equal to the block's rank.
pub type BlockId = usize;

#[derive(Debug)]
pub struct Block {
    pub rank: usize,
    pub prev: Option<BlockId>,
    pub next: Option<BlockId>,
    pub contents: Box<[u8]>,
}

#[derive(Debug)]
pub struct BlockChain {
    blocks: Vec<Block>,
    block_size: usize,
}

impl BlockChain {
    pub const HEAD: BlockId = 0;

    /// Creates the chain with its head block already allocated.
    pub fn new(block_size: usize) -> Result<Self> {
        let mut chain = Self {
            blocks: Vec::new(),
            block_size,
        };
        let contents = chain.allocate_contents()?;
        chain.blocks.push(Block {
            rank: 0,
            prev: None,
            next: None,
            contents,
        });
        Ok(chain)
    }

    #[inline(always)]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of blocks ever allocated, which is also the peak block count.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Total bytes addressable without allocating.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.blocks.len() * self.block_size
    }

    #[inline(always)]
    pub fn get(&self, id: BlockId) -> &Block {
        &self.blocks[id]
    }

    #[inline(always)]
    pub fn get_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id]
    }

    #[inline]
    pub fn tail(&self) -> BlockId {
        self.blocks.len() - 1
    }

    /// Grows the chain until at least `count` blocks exist.
    ///
    /// Every block is allocated before any is linked in, so on failure the
    /// chain is left exactly as it was.
    pub fn ensure_blocks(&mut self, count: usize) -> Result<()> {
        let missing = count.saturating_sub(self.blocks.len());
        if missing == 0 {
            return Ok(());
        }
        self.blocks
            .try_reserve(missing)
            .map_err(|_| self.out_of_memory())?;
        let mut fresh = Vec::with_capacity(missing);
        for _ in 0..missing {
            fresh.push(self.allocate_contents()?);
        }
        for contents in fresh {
            let tail = self.tail();
            self.link(tail, contents);
        }
        Ok(())
    }

    /// Walks the chain from the head through the `next` links.
    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        let mut cursor = Some(Self::HEAD);
        std::iter::from_fn(move || {
            let block = &self.blocks[cursor?];
            cursor = block.next;
            Some(block)
        })
    }

    fn link(&mut self, prev: BlockId, contents: Box<[u8]>) -> BlockId {
        debug_assert_eq!(prev, self.tail(), "blocks are only linked at the tail");
        let id = self.blocks.len();
        self.blocks.push(Block {
            rank: self.blocks[prev].rank + 1,
            prev: Some(prev),
            next: None,
            contents,
        });
        self.blocks[prev].next = Some(id);
        log::debug!(
            "allocated block {} ({} bytes, {} total)",
            id,
            self.block_size,
            self.capacity()
        );
        id
    }

    fn allocate_contents(&self) -> Result<Box<[u8]>> {
        let mut contents = Vec::new();
        contents
            .try_reserve_exact(self.block_size)
            .map_err(|_| self.out_of_memory())?;
        contents.resize(self.block_size, 0u8);
        Ok(contents.into_boxed_slice())
    }

    #[cold]
    fn out_of_memory(&self) -> TapeError {
        let err = TapeError::OutOfMemory {
            blocks: self.blocks.len(),
            block_size: self.block_size,
        };
        log::error!("{err}");
        err
    }
}
