//! Thread-safe, composable promises.
//!
//! A promise is a placeholder for a value that becomes available later. This crate
//! provides:
//!
//! - [`Completable<T>`]: A promise settled exactly once by its producer, through
//!   [`complete`](Completable::complete) or [`reject`](Completable::reject).
//! - [`Completed<T>`] and [`Rejected<T>`]: Promises settled from construction.
//! - [`Promise<T>`]: The value every composition returns, whichever kind it turns out to be.
//! - [`all`]: Fan-in of many promises into one promise of an ordered `Vec`.
//!
//! All kinds implement [`Thenable`], which offers `then` (map the value), `combine` (chain
//! a computation producing another promise), `catch` (observe a rejection) and the
//! blocking `get`.
//!
//! # Execution model
//!
//! There is no executor. Callbacks run synchronously: immediately on the calling thread
//! if the promise has already settled, otherwise on whichever thread settles it. Settling
//! a promise walks its dependents in registration order, so a whole chain runs eagerly
//! the moment its root settles. The only blocking operation is `get` on a pending promise.
//!
//! Rejections are data: a [`Cause`] flows through every dependent, skipping transforms,
//! and every `catch` along the way observes it. Settling a promise twice is a producer
//! bug and panics with [`SettleError`].
//!
//! # Examples
//!
//! ## Chaining
//!
//! ```rust
//! use promissory::{Completable, Promise, Thenable};
//! use std::thread;
//!
//! let promise = Completable::<i32>::new();
//! let squared = promise.then(|x: &i32| x * x);
//! let shifted = promise.combine(|x: &i32| Promise::completed(x + 3));
//!
//! let producer = promise.clone();
//! thread::spawn(move || producer.complete(2));
//!
//! assert_eq!(squared.get().unwrap(), 4);
//! assert_eq!(shifted.get().unwrap(), 5);
//! ```
//!
//! ## Rejection
//!
//! ```rust
//! use promissory::{Cause, Completable, Thenable};
//!
//! let promise = Completable::<i32>::new();
//! let doubled = promise.then(|x| x * 2).catch(|cause| eprintln!("failed: {cause}"));
//!
//! promise.reject(Cause::msg("disk on fire"));
//! assert_eq!(doubled.get().unwrap_err().to_string(), "disk on fire");
//! ```
//!
//! A rejection always carries a cause, so there is no way to reject without one:
//!
//! ```compile_fail
//! use promissory::Completable;
//!
//! let promise = Completable::<i32>::new();
//! promise.reject(None);
//! ```

/// Fan-in combinator.
mod all;

/// Rejection causes.
mod cause;

/// Completable promise implementation.
mod completable;

/// Protocol faults.
mod error;

/// Already settled promises.
mod immediate;

/// The promise enum.
mod promise;

/// Internal settlement state management.
mod state;

/// The capability contract.
mod thenable;

/// Stack-bounded propagation.
mod trampoline;

pub use all::all;
pub use cause::Cause;
pub use completable::{Completable, Deferred};
pub use error::SettleError;
pub use immediate::{Completed, Rejected};
pub use promise::Promise;
pub use state::Phase;
pub use thenable::{Thenable, Value};
