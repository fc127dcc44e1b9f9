//! Protocol faults raised by producers.

use thiserror::Error;

use crate::state::Phase;

/// A second settlement was attempted on a [`Completable`](crate::Completable).
///
/// This is a contract violation by the producer, not a rejection consumers are expected
/// to handle. [`Completable::complete`](crate::Completable::complete) and
/// [`Completable::reject`](crate::Completable::reject) panic with this error; the
/// `try_` variants return it instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum SettleError {
   /// `complete` was already called on this promise.
   #[error("Complete() was already called on this promise")]
   AlreadyFulfilled,
   /// `reject` was already called on this promise.
   #[error("Reject() was already called on this promise")]
   AlreadyRejected,
}

impl SettleError {
   /// Maps the phase that won the race to the matching fault.
   pub(crate) fn from_phase(prior: Phase) -> Self {
      match prior {
         Phase::Rejected => Self::AlreadyRejected,
         Phase::Fulfilled | Phase::Pending => Self::AlreadyFulfilled,
      }
   }

   /// The phase the promise was already in.
   pub fn prior(&self) -> Phase {
      match self {
         Self::AlreadyFulfilled => Phase::Fulfilled,
         Self::AlreadyRejected => Phase::Rejected,
      }
   }
}
