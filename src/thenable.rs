//! The capability contract shared by every promise kind.

use crate::{Cause, Promise};

/// Bound for values carried by promises.
///
/// Values are read from any thread once settled and handed by reference to every
/// dependent, and [`Thenable::get`] returns an owned copy.
pub trait Value: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Value for T {}

/// A computation whose result can be composed upon.
///
/// Implemented by [`Completed`](crate::Completed), [`Rejected`](crate::Rejected),
/// [`Deferred`](crate::Deferred), [`Completable`](crate::Completable) and
/// [`Promise`]. Every composition returns a [`Promise`], whose concrete kind depends on
/// whether the receiver had settled at the time of the call.
///
/// Callbacks run synchronously: on the calling thread if the receiver has already
/// settled, otherwise on whichever thread settles it.
pub trait Thenable<T: Value> {
   /// Returns `true` once the promise is fulfilled.
   fn is_resolved(&self) -> bool;

   /// Returns `true` once the promise is rejected.
   fn is_rejected(&self) -> bool;

   /// Maps the eventual value through `transform`.
   ///
   /// A rejection skips `transform` and is carried into the returned promise.
   fn then<U, F>(&self, transform: F) -> Promise<U>
   where
      U: Value,
      F: FnOnce(&T) -> U + Send + 'static;

   /// Chains a dependent computation producing another promise.
   ///
   /// The returned promise settles no earlier than both this promise and the one
   /// produced by `producer`, taking the latter's outcome. A rejection of either
   /// rejects the result.
   fn combine<U, F>(&self, producer: F) -> Promise<U>
   where
      U: Value,
      F: FnOnce(&T) -> Promise<U> + Send + 'static;

   /// Observes a rejection.
   ///
   /// `handler` runs at most once, with the cause, if and when this promise is rejected.
   /// Handling does not stop propagation: the returned promise is still rejected.
   fn catch<F>(&self, handler: F) -> Promise<T>
   where
      F: FnOnce(&Cause) + Send + 'static;

   /// Returns the value or the cause, blocking while the promise is pending.
   fn get(&self) -> Result<T, Cause>;
}
