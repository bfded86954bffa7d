use crate::{BlockChain, BlockId, Location, RepeatCell, Result, TapeError};

/// The byte stack underneath every typed buffer.
///
/// `push_bytes` and `pop_bytes` are the only operations that move bytes in
/// or out of the block chain; everything above funnels through them.
#[derive(Debug)]
pub struct MainStack {
    pub(crate) chain: BlockChain,
    /// Block holding the cursor.
    pub(crate) current: BlockId,
    /// Cursor offset inside `current`, `0..=block_size`.
    pub(crate) top: usize,
    pub(crate) repeats: Vec<RepeatCell>,
    /// Bytes moved by protected pushes.
    pub(crate) traffic: u64,
}

impl MainStack {
    pub fn new(block_size: usize) -> Result<Self> {
        Ok(Self {
            chain: BlockChain::new(block_size)?,
            current: BlockChain::HEAD,
            top: 0,
            repeats: Vec::new(),
            traffic: 0,
        })
    }

    #[inline(always)]
    pub fn block_size(&self) -> usize {
        self.chain.block_size()
    }

    #[inline(always)]
    pub fn chain(&self) -> &BlockChain {
        &self.chain
    }

    #[inline]
    pub fn location(&self) -> Location {
        let rank = self.chain.get(self.current).rank;
        Location::new(rank, self.top, self.block_size())
    }

    /// Moves the cursor to `location`, which must lie within allocated blocks.
    pub fn set_location(&mut self, location: Location) -> Result<()> {
        let allocated = self.chain.capacity();
        if location.bytes() > allocated {
            return Err(TapeError::LocationOutOfRange {
                location,
                allocated,
            });
        }
        self.seek(location);
        Ok(())
    }

    /// Blocks from the head up to the cursor.
    #[inline]
    pub fn current_blocks(&self) -> usize {
        self.chain.get(self.current).rank + 1
    }

    #[inline]
    pub fn traffic(&self) -> u64 {
        self.traffic
    }

    /// Copies `data` onto the stack at the cursor, growing the chain as needed.
    ///
    /// With `protect` set, a cursor inside the active repeat level's
    /// read-only region is first redirected to that level's `free_push`.
    pub fn push_bytes(&mut self, data: &[u8], protect: bool) -> Result<()> {
        let from = protect
            .then(|| self.read_only_redirect())
            .flatten()
            .unwrap_or_else(|| self.location());
        self.reserve(from, data.len())?;
        if protect {
            self.check_push_in_read_only();
            self.traffic += data.len() as u64;
        }

        let block_size = self.block_size();
        let mut rest = data;
        loop {
            let take = (block_size - self.top).min(rest.len());
            let block = self.chain.get_mut(self.current);
            block.contents[self.top..self.top + take]
                .copy_from_slice(&rest[..take]);
            self.top += take;
            rest = &rest[take..];
            if rest.is_empty() {
                break;
            }
            self.current = block.next.expect("push reserved the next block");
            self.top = 0;
        }

        log::trace!(
            "push {} bytes {} => {}",
            data.len(),
            from.display(block_size),
            self.location().display(block_size)
        );
        Ok(())
    }

    /// Fills `out` with the topmost `out.len()` bytes and moves the cursor
    /// below them.
    ///
    /// With `protect` set, landing exactly on the active level's `free_push`
    /// while a redirect is open rewinds the cursor to the redirected-from
    /// location.
    pub fn pop_bytes(&mut self, out: &mut [u8], protect: bool) -> Result<()> {
        let from = self.location();
        let requested = out.len();
        if requested > from.bytes() {
            let err = TapeError::PopUnderflow {
                requested,
                available: from.bytes(),
            };
            log::error!("{err}");
            return Err(err);
        }

        let block_size = self.block_size();
        let mut end = requested;
        loop {
            let take = self.top.min(end);
            let block = self.chain.get(self.current);
            out[end - take..end]
                .copy_from_slice(&block.contents[self.top - take..self.top]);
            self.top -= take;
            end -= take;
            if end == 0 {
                break;
            }
            self.current = block.prev.expect("enough bytes lie below the cursor");
            self.top = block_size;
        }

        log::trace!(
            "pop {} bytes {} => {}",
            requested,
            from.display(block_size),
            self.location().display(block_size)
        );
        if protect {
            self.check_pop_to_read_only();
        }
        Ok(())
    }

    /// Walks the chain one block at a time to `location`.
    ///
    /// A location on a block boundary is kept at the end of the lower block,
    /// so seeking to the very end of the tape never needs an unallocated block.
    pub(crate) fn seek(&mut self, location: Location) {
        let block_size = self.block_size();
        let (rank, offset) = match location.bytes() {
            0 => (0, 0),
            n if n % block_size == 0 => (n / block_size - 1, block_size),
            _ => (location.rank(block_size), location.offset(block_size)),
        };
        loop {
            let block = self.chain.get(self.current);
            if rank > block.rank {
                self.current = block.next.expect("seek target is allocated");
            } else if rank < block.rank {
                self.current = block.prev.expect("rank 0 is the head");
            } else {
                break;
            }
        }
        self.top = offset;
    }

    /// Makes sure every block touched by writing `len` bytes at `from` exists.
    fn reserve(&mut self, from: Location, len: usize) -> Result<()> {
        let end = from.bytes() + len;
        let needed = end.div_ceil(self.block_size()).max(1);
        self.chain.ensure_blocks(needed)
    }
}
