//! The promise type returned by every composition.

use core::fmt;

use crate::{Cause, Completable, Completed, Deferred, Phase, Rejected, Thenable, Value};

/// A promise of any kind.
///
/// Compositions return whichever kind fits the receiver's state at the time of the call:
/// an already settled receiver yields `Completed` or `Rejected` (its callback has already
/// run), a pending one yields `Deferred`. Calling code composes through [`Thenable`] and
/// never needs to match on the kind.
pub enum Promise<T> {
   /// Fulfilled from construction.
   Completed(Completed<T>),
   /// Rejected from construction.
   Rejected(Rejected<T>),
   /// Backed by a completable cell, possibly still pending.
   Deferred(Deferred<T>),
}

impl<T: Value> Promise<T> {
   /// Creates a fulfilled promise.
   #[inline]
   #[must_use]
   pub fn completed(value: T) -> Self {
      Self::Completed(Completed::new(value))
   }

   /// Creates a rejected promise.
   #[inline]
   #[must_use]
   pub fn rejected(cause: impl Into<Cause>) -> Self {
      Self::Rejected(Rejected::new(cause))
   }

   /// Returns the current phase. Never blocks.
   pub fn phase(&self) -> Phase {
      match self {
         Self::Completed(_) => Phase::Fulfilled,
         Self::Rejected(_) => Phase::Rejected,
         Self::Deferred(deferred) => deferred.phase(),
      }
   }

   /// Returns the outcome if settled, `None` while pending. Never blocks.
   pub fn try_get(&self) -> Option<Result<T, Cause>> {
      match self {
         Self::Completed(completed) => Some(completed.get()),
         Self::Rejected(rejected) => Some(rejected.get()),
         Self::Deferred(deferred) => deferred.try_get(),
      }
   }

   /// Waits for the outcome asynchronously. See [`Deferred::get_async`].
   #[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
   pub async fn get_async(&self) -> Result<T, Cause> {
      match self {
         Self::Completed(completed) => completed.get(),
         Self::Rejected(rejected) => rejected.get(),
         Self::Deferred(deferred) => deferred.get_async().await,
      }
   }

   /// Settles `target` with this promise's outcome once it is known.
   pub(crate) fn forward(&self, target: Completable<T>) {
      match self {
         Self::Completed(completed) => target.complete(completed.value().clone()),
         Self::Rejected(rejected) => target.reject(rejected.cause().clone()),
         Self::Deferred(deferred) => deferred.forward(target),
      }
   }
}

impl<T: Value> Thenable<T> for Promise<T> {
   fn is_resolved(&self) -> bool {
      match self {
         Self::Completed(completed) => completed.is_resolved(),
         Self::Rejected(rejected) => rejected.is_resolved(),
         Self::Deferred(deferred) => deferred.is_resolved(),
      }
   }

   fn is_rejected(&self) -> bool {
      match self {
         Self::Completed(completed) => completed.is_rejected(),
         Self::Rejected(rejected) => rejected.is_rejected(),
         Self::Deferred(deferred) => deferred.is_rejected(),
      }
   }

   fn then<U, F>(&self, transform: F) -> Promise<U>
   where
      U: Value,
      F: FnOnce(&T) -> U + Send + 'static,
   {
      match self {
         Self::Completed(completed) => completed.then(transform),
         Self::Rejected(rejected) => rejected.then(transform),
         Self::Deferred(deferred) => deferred.then(transform),
      }
   }

   fn combine<U, F>(&self, producer: F) -> Promise<U>
   where
      U: Value,
      F: FnOnce(&T) -> Promise<U> + Send + 'static,
   {
      match self {
         Self::Completed(completed) => completed.combine(producer),
         Self::Rejected(rejected) => rejected.combine(producer),
         Self::Deferred(deferred) => deferred.combine(producer),
      }
   }

   fn catch<F>(&self, handler: F) -> Promise<T>
   where
      F: FnOnce(&Cause) + Send + 'static,
   {
      match self {
         Self::Completed(completed) => completed.catch(handler),
         Self::Rejected(rejected) => rejected.catch(handler),
         Self::Deferred(deferred) => deferred.catch(handler),
      }
   }

   fn get(&self) -> Result<T, Cause> {
      match self {
         Self::Completed(completed) => completed.get(),
         Self::Rejected(rejected) => rejected.get(),
         Self::Deferred(deferred) => deferred.get(),
      }
   }
}

impl<T: Clone> Clone for Promise<T> {
   fn clone(&self) -> Self {
      match self {
         Self::Completed(completed) => Self::Completed(completed.clone()),
         Self::Rejected(rejected) => Self::Rejected(rejected.clone()),
         Self::Deferred(deferred) => Self::Deferred(deferred.clone()),
      }
   }
}

impl<T> From<Completed<T>> for Promise<T> {
   #[inline]
   fn from(completed: Completed<T>) -> Self {
      Self::Completed(completed)
   }
}

impl<T> From<Rejected<T>> for Promise<T> {
   #[inline]
   fn from(rejected: Rejected<T>) -> Self {
      Self::Rejected(rejected)
   }
}

impl<T> From<Deferred<T>> for Promise<T> {
   #[inline]
   fn from(deferred: Deferred<T>) -> Self {
      Self::Deferred(deferred)
   }
}

impl<T: Value> From<Completable<T>> for Promise<T> {
   #[inline]
   fn from(completable: Completable<T>) -> Self {
      completable.into_promise()
   }
}

impl<T: fmt::Debug> fmt::Debug for Promise<T> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self {
         Self::Completed(completed) => fmt::Debug::fmt(completed, f),
         Self::Rejected(rejected) => fmt::Debug::fmt(rejected, f),
         Self::Deferred(deferred) => fmt::Debug::fmt(deferred, f),
      }
   }
}
