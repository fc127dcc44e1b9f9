//! Rejection causes.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// The reason a promise was rejected.
///
/// A `Cause` is a shared, type-erased error. Cloning it is cheap and every clone refers
/// to the same underlying error, which is how a single rejection reaches every dependent
/// of a promise. There is no empty `Cause`: a rejection always carries a reason.
#[derive(Clone)]
pub struct Cause(Arc<dyn Error + Send + Sync + 'static>);

impl Cause {
   /// Wraps an error.
   #[inline]
   pub fn new<E>(error: E) -> Self
   where
      E: Error + Send + Sync + 'static,
   {
      Self(Arc::new(error))
   }

   /// Creates a cause from a plain message.
   pub fn msg<M>(message: M) -> Self
   where
      M: fmt::Display + fmt::Debug + Send + Sync + 'static,
   {
      Self(Arc::new(Message(message)))
   }

   /// Returns `true` if both causes refer to the same underlying error.
   #[inline]
   pub fn ptr_eq(&self, other: &Self) -> bool {
      Arc::ptr_eq(&self.0, &other.0)
   }

   /// Attempts to downcast to the concrete error type.
   pub fn downcast_ref<E>(&self) -> Option<&E>
   where
      E: Error + 'static,
   {
      self.0.downcast_ref::<E>()
   }

   /// Borrows the underlying error.
   #[inline]
   pub fn as_error(&self) -> &(dyn Error + Send + Sync + 'static) {
      &*self.0
   }
}

impl<E> From<E> for Cause
where
   E: Error + Send + Sync + 'static,
{
   #[inline]
   fn from(error: E) -> Self {
      Self::new(error)
   }
}

impl AsRef<dyn Error + Send + Sync + 'static> for Cause {
   fn as_ref(&self) -> &(dyn Error + Send + Sync + 'static) {
      self.as_error()
   }
}

impl fmt::Display for Cause {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      fmt::Display::fmt(&*self.0, f)
   }
}

impl fmt::Debug for Cause {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_tuple("Cause").field(&format_args!("{:?}", &*self.0)).finish()
   }
}

/// Error produced by [`Cause::msg`].
struct Message<M>(M);

impl<M: fmt::Display> fmt::Display for Message<M> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      fmt::Display::fmt(&self.0, f)
   }
}

impl<M: fmt::Debug> fmt::Debug for Message<M> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      fmt::Debug::fmt(&self.0, f)
   }
}

impl<M: fmt::Display + fmt::Debug> Error for Message<M> {}
