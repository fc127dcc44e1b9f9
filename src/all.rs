//! Fan-in over many promises.

use crate::{Promise, Thenable, Value};

/// Joins promises into one promise of their values, in input order.
///
/// The result is fulfilled once every input is fulfilled. If any input is rejected the
/// result is rejected with the first rejection the fold observes; when several inputs
/// reject concurrently, which cause wins is not specified. An empty input yields an
/// already fulfilled, empty `Vec`.
///
/// Built purely from [`Thenable::then`] and [`Thenable::combine`]: the first input
/// seeds a one-element vector and every further input is appended through `combine`.
///
/// # Examples
///
/// ```
/// use promissory::{all, Promise, Thenable};
///
/// let joined = all([Promise::completed(1), Promise::completed(2)]);
/// assert_eq!(joined.get().unwrap(), vec![1, 2]);
/// ```
pub fn all<T, I>(promises: I) -> Promise<Vec<T>>
where
   T: Value,
   I: IntoIterator<Item = Promise<T>>,
{
   let mut promises = promises.into_iter();

   let Some(first) = promises.next() else {
      return Promise::completed(Vec::new());
   };
   let seed = first.then(|value: &T| vec![value.clone()]);

   promises.fold(seed, |cursor, next| {
      cursor.combine(move |left: &Vec<T>| {
         let mut values = left.clone();
         next.then(move |right: &T| {
            values.push(right.clone());
            values
         })
      })
   })
}
