//! Repeated access to a recorded segment of the main stack.
//!
//! A repeat level marks everything between `resume` and `free_push` as
//! read-only. While the level is active, protected pushes that would land
//! inside that region are redirected past `free_push`, and the matching pops
//! bring the cursor back to where the redirected push started.

use crate::{Location, MainStack, Result, TapeError};

/// One level of the repeat stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatCell {
    /// Where each replay of this level starts reading.
    pub resume: Location,
    /// End of the protected region, start of the scratch region.
    pub free_push: Location,
    /// Location a protected push was redirected away from, if that redirect
    /// is still open.
    pub back_pop: Option<Location>,
}

/// A repeat level that has recorded its `resume` location but is not active
/// yet. Returned by [`MainStack::begin_repeat`] and consumed by
/// [`MainStack::commit_repeat`].
#[derive(Debug)]
#[must_use = "a pending repeat must be committed or abandoned"]
pub struct PendingRepeat {
    resume: Location,
}

impl PendingRepeat {
    pub fn resume(&self) -> Location {
        self.resume
    }
}

impl MainStack {
    #[inline]
    pub fn repeat_depth(&self) -> usize {
        self.repeats.len()
    }

    #[inline]
    pub fn active_repeat(&self) -> Option<&RepeatCell> {
        self.repeats.last()
    }

    /// Repeat levels from the outermost to the active one.
    pub fn repeats(&self) -> &[RepeatCell] {
        &self.repeats
    }

    /// First phase of opening a repeat level.
    ///
    /// Records the cursor as the new level's `resume` location. If the cursor
    /// lies inside the enclosing level's read-only region, it is moved to
    /// that level's `free_push` so whatever the caller records next cannot
    /// overwrite it.
    pub fn begin_repeat(&mut self) -> PendingRepeat {
        let resume = self.location();
        if let Some(enclosing) = self.repeats.last()
            && resume < enclosing.free_push
        {
            let free_push = enclosing.free_push;
            self.seek(free_push);
        }
        PendingRepeat { resume }
    }

    /// Second phase of opening a repeat level.
    ///
    /// Everything recorded since [`begin_repeat`](Self::begin_repeat) becomes
    /// the protected region; the cursor returns to `resume` and the level
    /// becomes active.
    pub fn commit_repeat(&mut self, pending: PendingRepeat) {
        let free_push = self.location();
        self.seek(pending.resume);
        self.repeats.push(RepeatCell {
            resume: pending.resume,
            free_push,
            back_pop: None,
        });
        log::debug!(
            "repeat level {} opened: resume {} free push {}",
            self.repeats.len(),
            pending.resume.display(self.block_size()),
            free_push.display(self.block_size())
        );
    }

    /// Drops a pending level and puts the cursor back at its `resume`.
    pub fn abandon_repeat(&mut self, pending: PendingRepeat) {
        self.seek(pending.resume);
    }

    /// First phase of restarting the active level.
    ///
    /// Any open redirect is discarded without returning to its `back_pop`,
    /// and the cursor moves to `free_push`.
    pub fn reset_repeat_begin(&mut self) -> Result<()> {
        let top = self.repeats.last_mut().ok_or_else(|| {
            no_active_repeat("reset_repeat")
        })?;
        top.back_pop = None;
        let free_push = top.free_push;
        self.seek(free_push);
        Ok(())
    }

    /// Second phase of restarting the active level: back to `resume`.
    pub fn reset_repeat_finish(&mut self) -> Result<()> {
        let resume = self
            .repeats
            .last()
            .ok_or_else(|| no_active_repeat("reset_repeat"))?
            .resume;
        self.seek(resume);
        log::debug!(
            "repeat level {} reset to {}",
            self.repeats.len(),
            resume.display(self.block_size())
        );
        Ok(())
    }

    /// Closes the active level.
    ///
    /// An open redirect is closed first so the enclosing level sees the
    /// cursor where the protected data continues. If that leaves the cursor
    /// on the enclosing level's `free_push` while its own redirect is open,
    /// the enclosing redirect is closed too, as a pop landing there would.
    /// Returns the closed cell.
    pub fn end_repeat(&mut self) -> Result<RepeatCell> {
        let cell = self
            .repeats
            .pop()
            .ok_or_else(|| no_active_repeat("end_repeat"))?;
        if let Some(back_pop) = cell.back_pop {
            self.seek(back_pop);
        }
        log::debug!(
            "repeat level {} closed at {}",
            self.repeats.len() + 1,
            self.location().display(self.block_size())
        );
        // the enclosing level may have its own redirect ending here
        self.check_pop_to_read_only();
        Ok(cell)
    }

    /// The active level's `free_push`, if the cursor lies below it.
    pub(crate) fn read_only_redirect(&self) -> Option<Location> {
        let top = self.repeats.last()?;
        (self.location() < top.free_push).then_some(top.free_push)
    }

    /// Redirects a push that would overwrite the protected region.
    pub(crate) fn check_push_in_read_only(&mut self) {
        let Some(free_push) = self.read_only_redirect() else {
            return;
        };
        let current = self.location();
        if let Some(top) = self.repeats.last_mut() {
            top.back_pop = Some(current);
        }
        self.seek(free_push);
        log::trace!(
            "free push {} => {}",
            current.display(self.block_size()),
            free_push.display(self.block_size())
        );
    }

    /// Resumes reading protected data once the scratch region is consumed.
    pub(crate) fn check_pop_to_read_only(&mut self) {
        let current = self.location();
        let Some(top) = self.repeats.last_mut() else {
            return;
        };
        let Some(back_pop) = top.back_pop else {
            return;
        };
        if current == top.free_push {
            top.back_pop = None;
            self.seek(back_pop);
            log::trace!(
                "back pop {} => {}",
                current.display(self.block_size()),
                back_pop.display(self.block_size())
            );
        }
    }
}

#[cold]
fn no_active_repeat(operation: &'static str) -> TapeError {
    let err = TapeError::NoActiveRepeat { operation };
    log::error!("{err}");
    err
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack_with(bytes: &[u8]) -> MainStack {
        let mut stack = MainStack::new(16).unwrap();
        stack.push_bytes(bytes, true).unwrap();
        stack
    }

    fn open(stack: &mut MainStack, recorded: &[u8]) {
        let pending = stack.begin_repeat();
        stack.push_bytes(recorded, false).unwrap();
        stack.commit_repeat(pending);
    }

    #[test]
    fn commit_captures_free_push_and_returns_to_resume() {
        let mut stack = stack_with(&[1, 2, 3, 4]);
        open(&mut stack, &[5, 6]);
        let cell = *stack.active_repeat().unwrap();
        assert_eq!(cell.resume, Location(4));
        assert_eq!(cell.free_push, Location(6));
        assert_eq!(cell.back_pop, None);
        assert_eq!(stack.location(), Location(4));
    }

    #[test]
    fn push_below_free_push_is_redirected_and_pop_rewinds() {
        let mut stack = stack_with(&[1, 2, 3, 4]);
        open(&mut stack, &[5, 6]);

        // cursor at 4, protected region is 4..6
        stack.push_bytes(&[7, 8, 9], true).unwrap();
        let cell = *stack.active_repeat().unwrap();
        assert_eq!(cell.back_pop, Some(Location(4)));
        assert_eq!(stack.location(), Location(9), "written after free push");

        let mut out = [0u8; 3];
        stack.pop_bytes(&mut out, true).unwrap();
        assert_eq!(out, [7, 8, 9]);
        assert_eq!(stack.location(), Location(4), "rewound to back pop");
        assert_eq!(stack.active_repeat().unwrap().back_pop, None);

        // the protected bytes are intact
        let mut below = [0u8; 4];
        stack.pop_bytes(&mut below, true).unwrap();
        assert_eq!(below, [1, 2, 3, 4]);
    }

    #[test]
    fn unprotected_push_is_never_redirected() {
        let mut stack = stack_with(&[1, 2]);
        open(&mut stack, &[3, 4]);
        stack.push_bytes(&[9], false).unwrap();
        assert_eq!(stack.location(), Location(3));
        assert_eq!(stack.active_repeat().unwrap().back_pop, None);
    }

    #[test]
    fn reset_discards_open_redirect_and_returns_to_resume() {
        let mut stack = stack_with(&[1, 2]);
        open(&mut stack, &[3, 4]);
        stack.push_bytes(&[9, 9], true).unwrap();
        assert!(stack.active_repeat().unwrap().back_pop.is_some());

        stack.reset_repeat_begin().unwrap();
        assert_eq!(stack.location(), Location(4));
        assert_eq!(stack.active_repeat().unwrap().back_pop, None);
        stack.reset_repeat_finish().unwrap();
        assert_eq!(stack.location(), Location(2));
    }

    #[test]
    fn end_closes_open_redirect() {
        let mut stack = stack_with(&[1, 2]);
        open(&mut stack, &[3, 4]);
        stack.push_bytes(&[9, 9], true).unwrap();
        assert_eq!(stack.location(), Location(6));

        let cell = stack.end_repeat().unwrap();
        assert_eq!(cell.back_pop, Some(Location(2)));
        assert_eq!(stack.location(), Location(2));
        assert_eq!(stack.repeat_depth(), 0);
    }

    #[test]
    fn nested_level_starts_after_enclosing_free_push() {
        let mut stack = stack_with(&[1, 2]);
        open(&mut stack, &[3, 4]);
        // cursor at 2, inside the outer protected region 2..4
        let pending = stack.begin_repeat();
        assert_eq!(pending.resume(), Location(2));
        assert_eq!(stack.location(), Location(4));
        stack.push_bytes(&[5], false).unwrap();
        stack.commit_repeat(pending);

        let inner = *stack.active_repeat().unwrap();
        assert_eq!(inner.resume, Location(2));
        assert_eq!(inner.free_push, Location(5));
        assert_eq!(stack.location(), Location(2));

        stack.end_repeat().unwrap();
        stack.end_repeat().unwrap();
        assert_eq!(stack.location(), Location(2));
    }

    #[test]
    fn closing_inner_level_on_outer_free_push_resumes_outer_back_pop() {
        let mut stack = MainStack::new(8).unwrap();
        stack.push_bytes(&[1], true).unwrap();
        stack.push_bytes(&[2], true).unwrap();
        open(&mut stack, &[]);

        let mut one = [0u8; 1];
        stack.pop_bytes(&mut one, true).unwrap();
        stack.push_bytes(&[3; 19], true).unwrap();
        stack.push_bytes(&[4; 3], true).unwrap();
        assert_eq!(stack.active_repeat().unwrap().back_pop, Some(Location(1)));
        assert_eq!(stack.location(), Location(24));

        open(&mut stack, &[]);
        let mut scratch = [0u8; 22];
        stack.pop_bytes(&mut scratch, true).unwrap();
        assert_eq!(stack.location(), Location(2), "on the outer free push");
        stack.push_bytes(&[5], true).unwrap();
        assert_eq!(stack.location(), Location(25));

        stack.end_repeat().unwrap();
        assert_eq!(stack.location(), Location(1), "outer redirect closed");
        let outer = *stack.active_repeat().unwrap();
        assert_eq!(outer.back_pop, None);

        stack.pop_bytes(&mut one, true).unwrap();
        assert_eq!(one, [1], "next pop reads unconsumed protected data");
    }

    #[test]
    fn reset_and_end_without_level_are_errors() {
        let mut stack = MainStack::new(16).unwrap();
        assert_eq!(
            stack.reset_repeat_begin(),
            Err(TapeError::NoActiveRepeat {
                operation: "reset_repeat"
            })
        );
        assert!(stack.reset_repeat_finish().is_err());
        assert_eq!(
            stack.end_repeat(),
            Err(TapeError::NoActiveRepeat {
                operation: "end_repeat"
            })
        );
    }

    #[test]
    fn abandon_restores_resume() {
        let mut stack = stack_with(&[1, 2, 3]);
        let pending = stack.begin_repeat();
        stack.push_bytes(&[4, 5], false).unwrap();
        stack.abandon_repeat(pending);
        assert_eq!(stack.location(), Location(3));
        assert_eq!(stack.repeat_depth(), 0);
    }
}
