//! The completable promise: a thread-safe, settle-once cell with dependents.
//!
//! This module provides [`Completable<T>`], the producer handle, and [`Deferred<T>`], the
//! read-only view handed to consumers. Both refer to the same shared cell.
//!
//! A pending cell collects dependents registered through `then`, `combine` and `catch`.
//! Settling the cell stores the outcome, publishes the terminal phase, wakes blocked
//! readers and then, with the lock released, walks the dependents in registration order
//! on the settling thread. Each dependent settles its own cell the same way, so a chain
//! of any depth runs eagerly the moment its root settles. Nested walks go through the
//! per-thread trampoline, which bounds the stack however deep the chain is.
//!
//! Every dependent also holds the cell it settles. Dropping a cell that never settled
//! releases that subtree iteratively for the same reason.

use core::cell::UnsafeCell;
use core::{fmt, mem};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::SettleError;
use crate::state::{Phase, SettleGuard, SettleState};
use crate::trampoline;
use crate::{Cause, Promise, Rejected, Thenable, Value};

/// Callback run when the cell it is registered on settles, and the cell it settles.
struct Dependent<T> {
   callback: Box<dyn FnOnce(Result<&T, &Cause>) + Send>,
   child: Box<dyn Orphan>,
}

/// Type-erased handle on a cell owned by a dependent edge.
trait Orphan: Send {
   /// Drops the handle. If it was the last one, the cell's own children are moved onto
   /// `stack` instead of being dropped in place.
   fn release(self: Box<Self>, stack: &mut Vec<Box<dyn Orphan>>);
}

impl<T: Value> Orphan for Arc<Shared<T>> {
   fn release(self: Box<Self>, stack: &mut Vec<Box<dyn Orphan>>) {
      if let Some(mut shared) = Arc::into_inner(*self) {
         mem::take(shared.hooks.get_mut()).detach(stack);
      }
   }
}

/// Drops `orphan` and every cell only it kept alive, one cell at a time.
fn release(orphan: Box<dyn Orphan>) {
   let mut stack = Vec::new();
   orphan.release(&mut stack);
   while let Some(next) = stack.pop() {
      next.release(&mut stack);
   }
}

/// Callback observing a rejection of the cell that owns it.
type Handler = Box<dyn FnOnce(&Cause) + Send>;

/// Everything that runs once the cell settles. Only touched under the registration lock.
struct Hooks<T> {
   dependents: Vec<Dependent<T>>,
   on_reject: Option<Handler>,
}

impl<T> Default for Hooks<T> {
   fn default() -> Self {
      Self {
         dependents: Vec::new(),
         on_reject: None,
      }
   }
}

impl<T> Hooks<T> {
   /// Runs the rejection handler and every dependent against `outcome`.
   ///
   /// A panicking callback does not stop the walk. The first panic is resumed once every
   /// dependent has been given the outcome.
   fn run(self, outcome: Result<&T, &Cause>) {
      let mut fault = None;

      if let (Err(cause), Some(handler)) = (outcome, self.on_reject) {
         if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(cause))) {
            tracing::error!(%cause, "rejection handler panicked");
            fault = Some(payload);
         }
      }

      for Dependent { callback, child } in self.dependents {
         if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(outcome))) {
            tracing::error!("dependent callback panicked during propagation");
            fault.get_or_insert(payload);
         }
         release(child);
      }

      if let Some(payload) = fault {
         panic::resume_unwind(payload);
      }
   }

   /// Drops every callback and moves the child cells onto `stack`.
   fn detach(self, stack: &mut Vec<Box<dyn Orphan>>) {
      for Dependent { callback, child } in self.dependents {
         drop(callback);
         stack.push(child);
      }
   }
}

/// The shared cell behind `Completable` and `Deferred`.
struct Shared<T> {
   state: SettleState,
   outcome: UnsafeCell<mem::MaybeUninit<Result<T, Cause>>>,
   hooks: UnsafeCell<Hooks<T>>,
}

impl<T> Shared<T> {
   fn new(on_reject: Option<Handler>) -> Self {
      Self {
         state: SettleState::new(),
         outcome: UnsafeCell::new(mem::MaybeUninit::uninit()),
         hooks: UnsafeCell::new(Hooks {
            dependents: Vec::new(),
            on_reject,
         }),
      }
   }

   /// Returns the outcome without checking the phase.
   ///
   /// # Safety
   ///
   /// The caller must have observed a settled phase.
   #[inline]
   unsafe fn outcome_unchecked(&self) -> Result<&T, &Cause> {
      debug_assert!(self.state.phase().is_settled(), "outcome read on a pending promise");
      // SAFETY: The caller guarantees the phase is settled, so the slot was written
      // before the Release store that the caller's Acquire load observed.
      unsafe { (*self.outcome.get()).assume_init_ref().as_ref() }
   }

   /// Returns the outcome if settled. Never blocks.
   #[inline]
   fn outcome(&self) -> Option<Result<&T, &Cause>> {
      if self.state.phase().is_settled() {
         // SAFETY: The phase is settled.
         Some(unsafe { self.outcome_unchecked() })
      } else {
         None
      }
   }

   /// Blocks until settled and returns the outcome.
   #[inline]
   fn wait(&self) -> Result<&T, &Cause> {
      self.state.wait();
      // SAFETY: `wait` only returns once the phase is settled.
      unsafe { self.outcome_unchecked() }
   }

   /// Appends a dependent. The guard proves the registration lock is held.
   #[inline]
   fn push(&self, _guard: &SettleGuard<'_>, dependent: Dependent<T>) {
      // SAFETY: The hook list is only accessed while the registration lock is held.
      unsafe { (*self.hooks.get()).dependents.push(dependent) }
   }
}

impl<T: Value> Shared<T> {
   /// Performs the one-time transition, then propagates to the dependents.
   fn settle(self: &Arc<Self>, outcome: Result<T, Cause>) -> Result<(), SettleError> {
      let guard = match self.state.lock() {
         Ok(guard) => guard,
         Err(prior) => {
            tracing::debug!(?prior, "refused to settle an already settled promise");
            return Err(SettleError::from_phase(prior));
         }
      };

      let phase = if outcome.is_ok() {
         Phase::Fulfilled
      } else {
         Phase::Rejected
      };

      // SAFETY: We hold the lock and the phase is still pending, so nobody reads the
      // outcome slot or the hook list concurrently.
      let hooks = unsafe {
         (*self.outcome.get()).write(outcome);
         mem::take(&mut *self.hooks.get())
      };
      guard.settle(phase);

      tracing::trace!(?phase, dependents = hooks.dependents.len(), "promise settled");

      let shared = Arc::clone(self);
      trampoline::propagate(move || {
         // SAFETY: The outcome was written and published above.
         hooks.run(unsafe { shared.outcome_unchecked() });
      });
      Ok(())
   }
}

// SAFETY:
// The outcome slot is written once under the registration lock before the terminal phase
// is published with Release ordering, and only read after an Acquire load observes it.
// Readers on any thread get `&T`, so `T: Sync` is required, and the value may be
// dropped or cloned out on another thread, so `T: Send` is required.
unsafe impl<T: Send + Sync> Sync for Shared<T> {}

impl<T> Drop for Shared<T> {
   fn drop(&mut self) {
      if self.state.phase().is_settled() {
         // SAFETY: The slot is initialized and we have exclusive access.
         unsafe { self.outcome.get_mut().assume_init_drop() };
      }

      let hooks = mem::take(self.hooks.get_mut());
      if !hooks.dependents.is_empty() {
         let mut stack = Vec::new();
         hooks.detach(&mut stack);
         while let Some(next) = stack.pop() {
            next.release(&mut stack);
         }
      }
   }
}

/// Builds a dependent whose `callback` settles `sink`.
#[inline]
fn dependent<T, U, F>(sink: &Completable<U>, callback: F) -> Dependent<T>
where
   U: Value,
   F: FnOnce(Result<&T, &Cause>) + Send + 'static,
{
   Dependent {
      callback: Box::new(callback),
      child: Box::new(Arc::clone(&sink.deferred.shared)),
   }
}

/// Settles `target` with a copy of `outcome`.
#[inline]
fn copy_into<T: Value>(outcome: Result<&T, &Cause>, target: &Completable<T>) {
   match outcome {
      Ok(value) => target.complete(value.clone()),
      Err(cause) => target.reject(cause.clone()),
   }
}

/// Builds a dependent that copies the parent's outcome into `target`.
fn relay<T: Value>(target: Completable<T>) -> Dependent<T> {
   let child = target.clone();
   dependent::<T, T, _>(&child, move |outcome| copy_into(outcome, &target))
}

/// Read-only view of a completable promise.
///
/// This is what consumers receive from compositions on a pending promise. It supports
/// the full [`Thenable`] contract but cannot be settled.
pub struct Deferred<T> {
   shared: Arc<Shared<T>>,
}

impl<T> Clone for Deferred<T> {
   #[inline]
   fn clone(&self) -> Self {
      Self {
         shared: Arc::clone(&self.shared),
      }
   }
}

impl<T: Value> Deferred<T> {
   /// Returns the current phase. Never blocks.
   #[inline]
   pub fn phase(&self) -> Phase {
      self.shared.state.phase()
   }

   /// Returns the outcome if settled, `None` while pending. Never blocks.
   #[inline]
   pub fn try_get(&self) -> Option<Result<T, Cause>> {
      self.shared.outcome().map(|outcome| outcome.cloned().map_err(Cause::clone))
   }

   /// Blocks until settled and borrows the outcome.
   #[inline]
   pub fn wait(&self) -> Result<&T, &Cause> {
      self.shared.wait()
   }

   /// Waits for the outcome without parking the async runtime's worker where possible.
   ///
   /// Yields to the runtime first. With the `async-tokio-mt` feature on a multi-thread
   /// runtime it then falls back to a blocking wait inside `block_in_place`. On a
   /// current-thread runtime, or with only `async-tokio`, it keeps yielding until the
   /// promise settles, so the producer must run on another thread or task.
   #[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
   pub async fn get_async(&self) -> Result<T, Cause> {
      self.shared.state.wait_async().await;
      // SAFETY: `wait_async` only returns once the phase is settled.
      let outcome = unsafe { self.shared.outcome_unchecked() };
      outcome.cloned().map_err(Cause::clone)
   }

   /// Copies this promise's eventual outcome into `target`.
   pub(crate) fn forward(&self, target: Completable<T>) {
      let guard = match self.shared.state.lock() {
         Ok(guard) => guard,
         Err(_) => {
            // SAFETY: `lock` only fails once the phase is settled.
            let outcome = unsafe { self.shared.outcome_unchecked() };
            return copy_into(outcome, &target);
         }
      };
      self.shared.push(&guard, relay(target));
   }

   /// Borrows the settled outcome after a failed `lock`.
   #[inline]
   fn settled(&self) -> Result<&T, &Cause> {
      // SAFETY: Only called after `lock` reported a terminal phase.
      unsafe { self.shared.outcome_unchecked() }
   }
}

impl<T: Value> Thenable<T> for Deferred<T> {
   #[inline]
   fn is_resolved(&self) -> bool {
      self.phase() == Phase::Fulfilled
   }

   #[inline]
   fn is_rejected(&self) -> bool {
      self.phase() == Phase::Rejected
   }

   fn then<U, F>(&self, transform: F) -> Promise<U>
   where
      U: Value,
      F: FnOnce(&T) -> U + Send + 'static,
   {
      let guard = match self.shared.state.lock() {
         Ok(guard) => guard,
         Err(_) => {
            return match self.settled() {
               Ok(value) => Promise::completed(transform(value)),
               Err(cause) => Promise::Rejected(Rejected::new(cause.clone())),
            };
         }
      };

      let target = Completable::new();
      let sink = target.clone();
      self.shared.push(
         &guard,
         dependent::<T, U, _>(&target, move |outcome| match outcome {
            Ok(value) => sink.complete(transform(value)),
            Err(cause) => sink.reject(cause.clone()),
         }),
      );
      drop(guard);
      target.into_promise()
   }

   fn combine<U, F>(&self, producer: F) -> Promise<U>
   where
      U: Value,
      F: FnOnce(&T) -> Promise<U> + Send + 'static,
   {
      let guard = match self.shared.state.lock() {
         Ok(guard) => guard,
         Err(_) => {
            return match self.settled() {
               Ok(value) => producer(value),
               Err(cause) => Promise::Rejected(Rejected::new(cause.clone())),
            };
         }
      };

      // The result settles only once the produced promise does, which in turn can
      // only be produced once this promise is fulfilled.
      let target = Completable::new();
      let sink = target.clone();
      self.shared.push(
         &guard,
         dependent::<T, U, _>(&target, move |outcome| match outcome {
            Ok(value) => producer(value).forward(sink),
            Err(cause) => sink.reject(cause.clone()),
         }),
      );
      drop(guard);
      target.into_promise()
   }

   fn catch<F>(&self, handler: F) -> Promise<T>
   where
      F: FnOnce(&Cause) + Send + 'static,
   {
      let guard = match self.shared.state.lock() {
         Ok(guard) => guard,
         Err(_) => {
            return match self.settled() {
               Ok(_) => Promise::Deferred(self.clone()),
               Err(cause) => {
                  handler(cause);
                  Promise::Rejected(Rejected::new(cause.clone()))
               }
            };
         }
      };

      let target = Completable::with_handler(Box::new(handler));
      self.shared.push(&guard, relay(target.clone()));
      drop(guard);
      target.into_promise()
   }

   fn get(&self) -> Result<T, Cause> {
      self.wait().cloned().map_err(Cause::clone)
   }
}

impl<T: fmt::Debug> fmt::Debug for Deferred<T> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let mut d = f.debug_tuple("Deferred");
      match self.shared.outcome() {
         Some(Ok(value)) => d.field(value),
         Some(Err(cause)) => d.field(cause),
         None => d.field(&format_args!("<pending>")),
      };
      d.finish()
   }
}

/// A promise settled by its producer.
///
/// `Completable` is the producer-side handle: it can be cloned and moved to the thread
/// that eventually calls [`complete`](Completable::complete) or
/// [`reject`](Completable::reject), while consumers compose on it or on the
/// [`Promise`] returned by [`promise`](Completable::promise).
///
/// Settling runs every registered dependent synchronously on the settling thread.
/// A callback may settle other promises, but must not settle the promise it is
/// registered on: that promise is already settled and the attempt faults.
///
/// Propagation nested inside a callback may be deferred until the outermost settlement
/// on that thread finishes its walk. A callback that settles a promise therefore must not
/// block waiting for that promise's dependents.
///
/// # Examples
///
/// ```
/// use promissory::{Completable, Thenable};
/// use std::thread;
///
/// let promise = Completable::<i32>::new();
/// let squared = promise.then(|x: &i32| x * x);
///
/// let producer = promise.clone();
/// thread::spawn(move || producer.complete(7));
///
/// assert_eq!(squared.get().unwrap(), 49);
/// ```
pub struct Completable<T> {
   deferred: Deferred<T>,
}

impl<T> Clone for Completable<T> {
   #[inline]
   fn clone(&self) -> Self {
      Self {
         deferred: self.deferred.clone(),
      }
   }
}

impl<T: Value> Completable<T> {
   /// Creates a new pending promise.
   #[inline]
   #[must_use]
   pub fn new() -> Self {
      Self::from_shared(Shared::new(None))
   }

   /// Creates a pending promise that calls `handler` when rejected.
   fn with_handler(handler: Handler) -> Self {
      Self::from_shared(Shared::new(Some(handler)))
   }

   #[inline]
   fn from_shared(shared: Shared<T>) -> Self {
      Self {
         deferred: Deferred {
            shared: Arc::new(shared),
         },
      }
   }

   /// Returns the current phase. Never blocks.
   #[inline]
   pub fn phase(&self) -> Phase {
      self.deferred.phase()
   }

   /// Fulfills the promise with `value` and propagates it to every dependent.
   ///
   /// # Panics
   ///
   /// Panics with [`SettleError`] if the promise was already settled. The stored
   /// outcome is left untouched.
   #[track_caller]
   pub fn complete(&self, value: T) {
      if let Err(err) = self.try_complete(value) {
         panic!("{err}");
      }
   }

   /// Rejects the promise with `cause` and propagates it to every dependent.
   ///
   /// The promise's own rejection handler, if any, runs before the dependents.
   ///
   /// # Panics
   ///
   /// Panics with [`SettleError`] if the promise was already settled.
   #[track_caller]
   pub fn reject(&self, cause: impl Into<Cause>) {
      if let Err(err) = self.try_reject(cause) {
         panic!("{err}");
      }
   }

   /// Fulfills the promise, or reports which settlement came first.
   pub fn try_complete(&self, value: T) -> Result<(), SettleError> {
      self.deferred.shared.settle(Ok(value))
   }

   /// Rejects the promise, or reports which settlement came first.
   pub fn try_reject(&self, cause: impl Into<Cause>) -> Result<(), SettleError> {
      self.deferred.shared.settle(Err(cause.into()))
   }

   /// Returns the outcome if settled, `None` while pending. Never blocks.
   #[inline]
   pub fn try_get(&self) -> Option<Result<T, Cause>> {
      self.deferred.try_get()
   }

   /// Blocks until settled and borrows the outcome.
   #[inline]
   pub fn wait(&self) -> Result<&T, &Cause> {
      self.deferred.wait()
   }

   /// Waits for the outcome asynchronously. See [`Deferred::get_async`].
   #[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
   pub async fn get_async(&self) -> Result<T, Cause> {
      self.deferred.get_async().await
   }

   /// Returns a consumer view of this promise.
   #[inline]
   pub fn promise(&self) -> Promise<T> {
      Promise::Deferred(self.deferred.clone())
   }

   /// Converts this handle into a consumer view.
   #[inline]
   pub fn into_promise(self) -> Promise<T> {
      Promise::Deferred(self.deferred)
   }
}

impl<T: Value> Thenable<T> for Completable<T> {
   #[inline]
   fn is_resolved(&self) -> bool {
      self.deferred.is_resolved()
   }

   #[inline]
   fn is_rejected(&self) -> bool {
      self.deferred.is_rejected()
   }

   #[inline]
   fn then<U, F>(&self, transform: F) -> Promise<U>
   where
      U: Value,
      F: FnOnce(&T) -> U + Send + 'static,
   {
      self.deferred.then(transform)
   }

   #[inline]
   fn combine<U, F>(&self, producer: F) -> Promise<U>
   where
      U: Value,
      F: FnOnce(&T) -> Promise<U> + Send + 'static,
   {
      self.deferred.combine(producer)
   }

   #[inline]
   fn catch<F>(&self, handler: F) -> Promise<T>
   where
      F: FnOnce(&Cause) + Send + 'static,
   {
      self.deferred.catch(handler)
   }

   #[inline]
   fn get(&self) -> Result<T, Cause> {
      self.deferred.get()
   }
}

impl<T: Value> Default for Completable<T> {
   /// Creates a new pending promise.
   #[inline]
   fn default() -> Self {
      Self::new()
   }
}

impl<T: fmt::Debug> fmt::Debug for Completable<T> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let mut d = f.debug_tuple("Completable");
      match self.deferred.shared.outcome() {
         Some(Ok(value)) => d.field(value),
         Some(Err(cause)) => d.field(cause),
         None => d.field(&format_args!("<pending>")),
      };
      d.finish()
   }
}
