//! Promises that are settled from construction.
//!
//! [`Completed`] and [`Rejected`] are immutable value holders. They need no
//! synchronization: every composition runs on the calling thread before returning.

use core::fmt;
use core::marker::PhantomData;

use crate::{Cause, Promise, Thenable, Value};

/// A promise fulfilled from construction.
#[derive(Clone, PartialEq, Eq)]
pub struct Completed<T> {
   value: T,
}

impl<T> Completed<T> {
   /// Wraps an already known value.
   #[inline]
   #[must_use]
   pub const fn new(value: T) -> Self {
      Self { value }
   }

   /// Borrows the value.
   #[inline]
   pub fn value(&self) -> &T {
      &self.value
   }

   /// Unwraps the value.
   #[inline]
   pub fn into_inner(self) -> T {
      self.value
   }
}

impl<T: Value> Thenable<T> for Completed<T> {
   #[inline]
   fn is_resolved(&self) -> bool {
      true
   }

   #[inline]
   fn is_rejected(&self) -> bool {
      false
   }

   fn then<U, F>(&self, transform: F) -> Promise<U>
   where
      U: Value,
      F: FnOnce(&T) -> U + Send + 'static,
   {
      Promise::completed(transform(&self.value))
   }

   fn combine<U, F>(&self, producer: F) -> Promise<U>
   where
      U: Value,
      F: FnOnce(&T) -> Promise<U> + Send + 'static,
   {
      producer(&self.value)
   }

   fn catch<F>(&self, _handler: F) -> Promise<T>
   where
      F: FnOnce(&Cause) + Send + 'static,
   {
      Promise::Completed(self.clone())
   }

   #[inline]
   fn get(&self) -> Result<T, Cause> {
      Ok(self.value.clone())
   }
}

impl<T> From<T> for Completed<T> {
   #[inline]
   fn from(value: T) -> Self {
      Self::new(value)
   }
}

impl<T: fmt::Debug> fmt::Debug for Completed<T> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_tuple("Completed").field(&self.value).finish()
   }
}

/// A promise rejected from construction.
///
/// `then` and `combine` never invoke their callbacks; `catch` invokes its handler
/// immediately with the stored cause.
pub struct Rejected<T> {
   cause: Cause,
   _value: PhantomData<fn() -> T>,
}

impl<T> Rejected<T> {
   /// Wraps an already known cause.
   #[inline]
   #[must_use]
   pub fn new(cause: impl Into<Cause>) -> Self {
      Self {
         cause: cause.into(),
         _value: PhantomData,
      }
   }

   /// Borrows the cause.
   #[inline]
   pub fn cause(&self) -> &Cause {
      &self.cause
   }

   /// Re-types the rejection for a different value type, keeping the cause.
   #[inline]
   pub fn cast<U>(&self) -> Rejected<U> {
      Rejected::new(self.cause.clone())
   }
}

impl<T: Value> Thenable<T> for Rejected<T> {
   #[inline]
   fn is_resolved(&self) -> bool {
      false
   }

   #[inline]
   fn is_rejected(&self) -> bool {
      true
   }

   fn then<U, F>(&self, _transform: F) -> Promise<U>
   where
      U: Value,
      F: FnOnce(&T) -> U + Send + 'static,
   {
      Promise::Rejected(self.cast())
   }

   fn combine<U, F>(&self, _producer: F) -> Promise<U>
   where
      U: Value,
      F: FnOnce(&T) -> Promise<U> + Send + 'static,
   {
      Promise::Rejected(self.cast())
   }

   fn catch<F>(&self, handler: F) -> Promise<T>
   where
      F: FnOnce(&Cause) + Send + 'static,
   {
      handler(&self.cause);
      Promise::Rejected(self.clone())
   }

   #[inline]
   fn get(&self) -> Result<T, Cause> {
      Err(self.cause.clone())
   }
}

impl<T> Clone for Rejected<T> {
   fn clone(&self) -> Self {
      self.cast()
   }
}

impl<T> fmt::Debug for Rejected<T> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_tuple("Rejected").field(&self.cause).finish()
   }
}
