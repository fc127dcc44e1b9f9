//! Per-thread trampoline for settlement propagation.
//!
//! Settling a promise runs its dependents, which settle their own promises, and so on.
//! Done naively that recursion is as deep as the dependency graph. Instead, every walk
//! goes through [`propagate`]: walks nested up to [`INLINE_DEPTH`] run immediately, deeper
//! ones are queued and drained by the outermost walk on this thread before it returns.
//! Propagation stays eager and on the settling thread; only the stack stays bounded.

use core::cell::{Cell, RefCell};
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};

/// Nested walks run inline up to this depth, then go through the queue.
const INLINE_DEPTH: usize = 32;

type Walk = Box<dyn FnOnce()>;

thread_local! {
   static DEPTH: Cell<usize> = const { Cell::new(0) };
   static QUEUE: RefCell<VecDeque<Walk>> = const { RefCell::new(VecDeque::new()) };
}

/// Restores the nesting depth, also when a walk unwinds.
struct Depth(usize);

impl Depth {
   #[inline]
   fn enter(depth: usize) -> Self {
      DEPTH.with(|cell| cell.replace(depth));
      Self(depth - 1)
   }
}

impl Drop for Depth {
   #[inline]
   fn drop(&mut self) {
      DEPTH.with(|cell| cell.set(self.0));
   }
}

/// Runs `walk` now if the stack allows it, otherwise queues it for the outermost walk.
///
/// Only the outermost call returns after the queue is empty. A nested call may return
/// before its walk ran, but the walk always runs on this thread before the outermost
/// call returns. Panics are resumed the same way: inline walks unwind into their caller,
/// queued walks are all drained first and the first of their panics is resumed by the
/// outermost call.
pub(crate) fn propagate(walk: impl FnOnce() + 'static) {
   let depth = DEPTH.with(Cell::get);

   if depth >= INLINE_DEPTH {
      QUEUE.with(|queue| queue.borrow_mut().push_back(Box::new(walk)));
      return;
   }

   if depth > 0 {
      let _depth = Depth::enter(depth + 1);
      walk();
      return;
   }

   let mut fault = run_outermost(Box::new(walk));
   while let Some(next) = QUEUE.with(|queue| queue.borrow_mut().pop_front()) {
      if let Some(payload) = run_outermost(next) {
         fault.get_or_insert(payload);
      }
   }
   if let Some(payload) = fault {
      panic::resume_unwind(payload);
   }
}

#[inline]
fn run_outermost(walk: Walk) -> Option<Box<dyn Any + Send>> {
   let _depth = Depth::enter(1);
   panic::catch_unwind(AssertUnwindSafe(walk)).err()
}
