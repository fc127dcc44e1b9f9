use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use promissory::{all, Cause, Completable, Phase, Promise, SettleError, Thenable};

const WAITERS: usize = 100;
const LATE_CHECKERS: usize = 20;

#[test]
fn test_new_is_pending() {
   let promise = Completable::<i32>::new();
   assert_eq!(promise.phase(), Phase::Pending);
   assert!(!promise.is_resolved());
   assert!(!promise.is_rejected());
   assert!(promise.try_get().is_none());
}

#[test]
fn test_deferred_fulfillment() {
   let promise = Completable::<i32>::new();

   let squared = promise.then(|x| x * x);
   let cubed = squared.then(|x| x * x * x);
   let combined = promise.combine(|x| Promise::completed(x + 3));

   assert_eq!(squared.phase(), Phase::Pending);
   assert_eq!(combined.phase(), Phase::Pending);

   // And then something happened... in the background.
   let producer = promise.clone();
   thread::spawn(move || producer.complete(2));

   assert_eq!(squared.get().unwrap(), 4);
   assert_eq!(combined.get().unwrap(), 5);
   assert_eq!(cubed.get().unwrap(), 64);

   // Already settled, so this must run before `then` returns.
   let ran = Arc::new(AtomicUsize::new(0));
   let ran_clone = Arc::clone(&ran);
   let late = combined.then(move |x| {
      ran_clone.fetch_add(1, Ordering::SeqCst);
      *x
   });
   assert_eq!(ran.load(Ordering::SeqCst), 1);
   assert!(matches!(late, Promise::Completed(_)));

   let joined = all([squared, cubed, combined]);
   assert!(joined.is_resolved());
   assert_eq!(joined.get().unwrap(), vec![4, 64, 5]);
}

#[test]
fn test_get_blocks_until_complete() {
   let promise = Completable::<String>::new();
   let producer = promise.clone();

   let handle = thread::spawn(move || {
      thread::sleep(Duration::from_millis(50));
      producer.complete("ready".to_string());
   });

   assert_eq!(promise.get().unwrap(), "ready");
   assert!(promise.is_resolved());
   handle.join().unwrap();
}

#[test]
fn test_chain_runs_on_completing_thread() {
   let promise = Completable::<i32>::new();
   let observed = Arc::new(Mutex::new(None));
   let observed_clone = Arc::clone(&observed);

   let tail = promise.then(move |x| {
      *observed_clone.lock().unwrap() = Some(thread::current().id());
      x + 1
   });

   let producer = promise.clone();
   let completer = thread::spawn(move || {
      producer.complete(1);
      thread::current().id()
   });
   let completer_id = completer.join().unwrap();

   // The transform ran eagerly, before `complete` returned.
   assert_eq!(tail.try_get().unwrap().unwrap(), 2);
   assert_eq!(*observed.lock().unwrap(), Some(completer_id));
}

#[test]
fn test_dependents_run_in_registration_order() {
   let promise = Completable::<u8>::new();
   let order = Arc::new(Mutex::new(Vec::new()));

   for i in 0..5 {
      let order = Arc::clone(&order);
      promise.then(move |_| order.lock().unwrap().push(i));
   }

   promise.complete(0);
   assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_reentrant_complete() {
   let (done_tx, done_rx) = mpsc::channel();

   thread::spawn(move || {
      let a = Completable::<i32>::new();
      let b = Completable::<i32>::new();

      let a_clone = a.clone();
      let sum = b.combine(move |b_value| {
         let b_value = *b_value;
         a_clone.then(move |a_value| a_value + b_value)
      });

      // Completing `a` completes `b`, whose combine reaches back into `a`.
      let b_clone = b.clone();
      a.then(move |_| b_clone.complete(3));

      a.complete(2);
      done_tx.send(sum.get().unwrap()).unwrap();
   });

   let sum = done_rx
      .recv_timeout(Duration::from_secs(5))
      .expect("reentrant completion appears to have deadlocked");
   assert_eq!(sum, 5);
}

#[test]
fn test_concurrent_registration_and_completion() {
   let promise = Completable::<bool>::new();
   let counter = Arc::new(AtomicUsize::new(0));
   let (waiter_tx, waiter_rx) = mpsc::channel();

   for _ in 0..WAITERS {
      let promise = promise.clone();
      let counter = Arc::clone(&counter);
      let waiter_tx = waiter_tx.clone();
      thread::spawn(move || {
         let waiter = promise.then(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
         });
         waiter_tx.send(waiter).unwrap();
      });
   }

   let producer = promise.clone();
   thread::spawn(move || producer.complete(true));

   // Gathered here so that only one thread builds the list.
   let waiters: Vec<Promise<()>> = (0..WAITERS).map(|_| waiter_rx.recv().unwrap()).collect();

   // Every waiter must settle whether it registered before or after completion.
   let joined = all(waiters).get();
   assert!(joined.is_ok(), "unexpected rejection: {joined:?}");
   assert_eq!(counter.load(Ordering::SeqCst), WAITERS);

   for _ in 0..LATE_CHECKERS {
      let counter = Arc::clone(&counter);
      promise.then(move |_| {
         counter.fetch_add(1, Ordering::SeqCst);
      });
   }
   assert_eq!(counter.load(Ordering::SeqCst), WAITERS + LATE_CHECKERS);
}

#[test]
fn test_rejection_reaches_every_dependent() {
   let promise = Completable::<i32>::new();
   let expected = Cause::msg("expected error");

   let direct = Arc::new(Mutex::new(None));
   let direct_clone = Arc::clone(&direct);
   promise.catch(move |cause| *direct_clone.lock().unwrap() = Some(cause.clone()));

   let derived = Arc::new(Mutex::new(None));
   let derived_clone = Arc::clone(&derived);
   let transform_ran = Arc::new(AtomicUsize::new(0));
   let transform_ran_clone = Arc::clone(&transform_ran);
   promise
      .then(move |x| {
         transform_ran_clone.fetch_add(1, Ordering::SeqCst);
         x + 1
      })
      .catch(move |cause| *derived_clone.lock().unwrap() = Some(cause.clone()));

   let also_rejected = promise.combine(|_| Promise::completed(true));

   promise.reject(expected.clone());

   assert!(direct.lock().unwrap().as_ref().unwrap().ptr_eq(&expected));
   assert!(derived.lock().unwrap().as_ref().unwrap().ptr_eq(&expected));
   assert_eq!(transform_ran.load(Ordering::SeqCst), 0);
   assert!(also_rejected.is_rejected());
   assert!(also_rejected.get().unwrap_err().ptr_eq(&expected));

   // Catch on an already rejected promise fires immediately with the same cause.
   let late = Arc::new(AtomicUsize::new(0));
   let late_clone = Arc::clone(&late);
   let expected_clone = expected.clone();
   let rejected = promise.catch(move |cause| {
      assert!(cause.ptr_eq(&expected_clone));
      late_clone.fetch_add(1, Ordering::SeqCst);
   });
   assert_eq!(late.load(Ordering::SeqCst), 1);
   assert!(matches!(rejected, Promise::Rejected(_)));
   assert!(rejected.get().unwrap_err().ptr_eq(&expected));
}

#[test]
fn test_catch_handlers_fire_in_registration_order() {
   let promise = Completable::<i32>::new();
   let order = Arc::new(Mutex::new(Vec::new()));

   let first = Arc::clone(&order);
   promise.catch(move |_| first.lock().unwrap().push("direct"));
   let second = Arc::clone(&order);
   promise.then(|x| x * 2).catch(move |_| second.lock().unwrap().push("derived"));
   let third = Arc::clone(&order);
   promise
      .catch(|_| {})
      .catch(move |_| third.lock().unwrap().push("downstream"));

   promise.reject(Cause::msg("nope"));
   assert_eq!(*order.lock().unwrap(), vec!["direct", "derived", "downstream"]);
}

#[test]
fn test_catch_on_fulfilled_is_noop() {
   let promise = Completable::<i32>::new();
   promise.complete(7);

   let handled = Arc::new(AtomicUsize::new(0));
   let handled_clone = Arc::clone(&handled);
   let same = promise.catch(move |_| {
      handled_clone.fetch_add(1, Ordering::SeqCst);
   });

   assert!(matches!(same, Promise::Deferred(_)));
   assert_eq!(same.get().unwrap(), 7);
   assert_eq!(handled.load(Ordering::SeqCst), 0);
}

#[test]
fn test_pending_catch_passes_value_through() {
   let promise = Completable::<i32>::new();
   let handled = Arc::new(AtomicUsize::new(0));
   let handled_clone = Arc::clone(&handled);

   let passthrough = promise.catch(move |_| {
      handled_clone.fetch_add(1, Ordering::SeqCst);
   });
   promise.complete(11);

   assert_eq!(passthrough.get().unwrap(), 11);
   assert_eq!(handled.load(Ordering::SeqCst), 0);
}

#[test]
fn test_combine_waits_for_inner_promise() {
   let outer = Completable::<i32>::new();
   let inner = Completable::<i32>::new();

   let inner_clone = inner.clone();
   let combined = outer.combine(move |x| {
      let x = *x;
      inner_clone.then(move |y| x + y)
   });

   outer.complete(1);
   // The outer value alone is not enough.
   assert_eq!(combined.phase(), Phase::Pending);

   inner.complete(2);
   assert_eq!(combined.get().unwrap(), 3);
}

#[test]
fn test_combine_inner_rejection_rejects_result() {
   let outer = Completable::<i32>::new();
   let inner = Completable::<i32>::new();

   let inner_clone = inner.clone();
   let combined = outer.combine(move |_| inner_clone.promise());

   outer.complete(1);
   let cause = Cause::msg("inner failed");
   inner.reject(cause.clone());

   assert!(combined.is_rejected());
   assert!(combined.get().unwrap_err().ptr_eq(&cause));
}

#[test]
fn test_combine_producer_rejection_rejects_result() {
   let outer = Completable::<i32>::new();
   let combined = outer.combine(|x| {
      if *x < 0 {
         Promise::rejected(Cause::msg("negative"))
      } else {
         Promise::completed(*x as u32)
      }
   });

   outer.complete(-1);
   assert_eq!(combined.get().unwrap_err().to_string(), "negative");
}

#[test]
fn test_combine_outer_rejection_skips_producer() {
   let outer = Completable::<i32>::new();
   let produced = Arc::new(AtomicUsize::new(0));
   let produced_clone = Arc::clone(&produced);

   let combined = outer.combine(move |x| {
      produced_clone.fetch_add(1, Ordering::SeqCst);
      Promise::completed(*x)
   });

   let cause = Cause::msg("outer failed");
   outer.reject(cause.clone());

   assert!(combined.get().unwrap_err().ptr_eq(&cause));
   assert_eq!(produced.load(Ordering::SeqCst), 0);
}

#[test]
fn test_multi_thread_get_is_idempotent() {
   let promise = Completable::<Vec<u32>>::new();

   let readers: Vec<_> = (0..10)
      .map(|_| {
         let promise = promise.clone();
         thread::spawn(move || {
            let first = promise.get().unwrap();
            let second = promise.get().unwrap();
            assert_eq!(first, second);
            first
         })
      })
      .collect();

   thread::sleep(Duration::from_millis(10));
   promise.complete(vec![1, 2, 3]);

   for handle in readers {
      assert_eq!(handle.join().unwrap(), vec![1, 2, 3]);
   }
   assert!(promise.is_resolved());
   assert!(!promise.is_rejected());
   assert_eq!(promise.wait().ok(), Some(&vec![1, 2, 3]));
}

#[test]
fn test_multi_thread_rejected_get_is_idempotent() {
   let promise = Completable::<i32>::new();
   let cause = Cause::msg("shared failure");

   let readers: Vec<_> = (0..10)
      .map(|_| {
         let promise = promise.clone();
         thread::spawn(move || promise.get().unwrap_err())
      })
      .collect();

   promise.reject(cause.clone());

   for handle in readers {
      assert!(handle.join().unwrap().ptr_eq(&cause));
   }
   assert!(promise.is_rejected());
   assert!(!promise.is_resolved());
   assert!(promise.get().unwrap_err().ptr_eq(&cause));
}

#[test]
#[should_panic(expected = "Complete() was already called on this promise")]
fn test_complete_twice_panics() {
   let promise = Completable::<i32>::new();
   promise.complete(1);
   promise.complete(2);
}

#[test]
#[should_panic(expected = "Complete() was already called on this promise")]
fn test_reject_after_complete_panics() {
   let promise = Completable::<i32>::new();
   promise.complete(1);
   promise.reject(Cause::msg("too late"));
}

#[test]
#[should_panic(expected = "Reject() was already called on this promise")]
fn test_complete_after_reject_panics() {
   let promise = Completable::<i32>::new();
   promise.reject(Cause::msg("first"));
   promise.complete(1);
}

#[test]
fn test_double_settlement_keeps_outcome() {
   let promise = Completable::<i32>::new();
   promise.complete(1);

   assert_eq!(promise.try_complete(2), Err(SettleError::AlreadyFulfilled));
   assert_eq!(promise.try_reject(Cause::msg("late")), Err(SettleError::AlreadyFulfilled));
   let result = panic::catch_unwind(AssertUnwindSafe(|| promise.complete(3)));
   assert!(result.is_err());
   assert_eq!(promise.get().unwrap(), 1);

   let rejected = Completable::<i32>::new();
   let cause = Cause::msg("first");
   rejected.reject(cause.clone());
   assert_eq!(rejected.try_complete(2), Err(SettleError::AlreadyRejected));
   assert_eq!(SettleError::AlreadyRejected.prior(), Phase::Rejected);
   assert!(rejected.get().unwrap_err().ptr_eq(&cause));
}

#[test]
fn test_multi_thread_settle_race() {
   let promise = Completable::<usize>::new();
   let successes = Arc::new(AtomicUsize::new(0));

   let threads: Vec<_> = (0..10)
      .map(|i| {
         let promise = promise.clone();
         let successes = Arc::clone(&successes);
         thread::spawn(move || {
            if promise.try_complete(i).is_ok() {
               successes.fetch_add(1, Ordering::SeqCst);
            }
            promise.get().unwrap()
         })
      })
      .collect();

   let values: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();
   // Exactly one thread wins and everyone observes its value.
   assert_eq!(successes.load(Ordering::SeqCst), 1);
   assert!(values.iter().all(|v| *v == values[0]));
}

#[test]
fn test_panicking_handler_still_rejects_dependents() {
   let promise = Completable::<i32>::new();
   promise.catch(|_| panic!("handler exploded"));
   let downstream = promise.then(|x| x + 1);

   let result = panic::catch_unwind(AssertUnwindSafe(|| promise.reject(Cause::msg("boom"))));

   assert!(result.is_err());
   assert!(promise.is_rejected());
   assert!(downstream.is_rejected());
   assert_eq!(downstream.get().unwrap_err().to_string(), "boom");
}

#[test]
fn test_panicking_handler_still_rejects_its_own_dependents() {
   let promise = Completable::<i32>::new();
   let handled = promise.catch(|_| panic!("handler exploded"));
   let downstream = handled.then(|x| x + 1);

   let cause = Cause::msg("boom");
   let result = panic::catch_unwind(AssertUnwindSafe(|| promise.reject(cause.clone())));

   assert!(result.is_err());
   assert!(handled.is_rejected());
   assert!(handled.get().unwrap_err().ptr_eq(&cause));
   assert!(downstream.is_rejected());
   assert!(downstream.get().unwrap_err().ptr_eq(&cause));
}

#[test]
fn test_settle_from_inside_callback_of_other_promise() {
   let first = Completable::<i32>::new();
   let second = Completable::<i32>::new();

   let second_clone = second.clone();
   first.then(move |x| second_clone.complete(x * 10));
   let observed = second.then(|x| x + 1);

   first.complete(4);
   assert_eq!(second.get().unwrap(), 40);
   assert_eq!(observed.get().unwrap(), 41);
}

#[test]
fn test_deep_chain() {
   const DEPTH: u64 = 100_000;

   let root = Completable::<u64>::new();
   let mut tail = root.promise();
   for _ in 0..DEPTH {
      tail = tail.then(|x| x + 1);
   }

   root.complete(0);
   assert!(tail.is_resolved());
   assert_eq!(tail.get().unwrap(), DEPTH);
}

#[test]
fn test_deep_rejection_chain() {
   const DEPTH: usize = 100_000;

   let root = Completable::<u64>::new();
   let handled = Arc::new(AtomicUsize::new(0));
   let mut tail = root.promise();
   for _ in 0..DEPTH {
      let handled = Arc::clone(&handled);
      tail = tail.then(|x| x + 1).catch(move |_| {
         handled.fetch_add(1, Ordering::SeqCst);
      });
   }

   let cause = Cause::msg("root failed");
   root.reject(cause.clone());
   assert_eq!(handled.load(Ordering::SeqCst), DEPTH);
   assert!(tail.get().unwrap_err().ptr_eq(&cause));
}

#[test]
fn test_deep_combine_chain() {
   const DEPTH: u64 = 50_000;

   let root = Completable::<u64>::new();
   let mut tail = root.promise();
   for _ in 0..DEPTH {
      tail = tail.combine(|x| {
         let inner = Completable::<u64>::new();
         let result = inner.then(|y| y + 1);
         inner.complete(*x);
         result
      });
   }

   root.complete(0);
   assert_eq!(tail.get().unwrap(), DEPTH);
}

#[test]
fn test_deep_chain_panic_surfaces_after_walk() {
   let root = Completable::<u64>::new();
   let mut tail = root.promise();
   for depth in 0..1_000 {
      if depth == 600 {
         tail.then(|_| -> u64 { panic!("transform exploded") });
      }
      tail = tail.then(|x| x + 1);
   }

   let result = panic::catch_unwind(AssertUnwindSafe(|| root.complete(0)));

   assert!(result.is_err());
   assert_eq!(tail.get().unwrap(), 1_000);

   // The walk is finished, so this thread propagates normally afterwards.
   let next = Completable::<u64>::new();
   let observed = next.then(|x| x * 2);
   next.complete(21);
   assert_eq!(observed.get().unwrap(), 42);
}

#[test]
fn test_drop_deep_unsettled_chain() {
   const DEPTH: usize = 100_000;

   let root = Completable::<u64>::new();
   let mut tail = root.promise();
   for _ in 0..DEPTH {
      tail = tail.then(|x| x + 1);
   }

   drop(tail);
   drop(root);
}

#[test]
fn test_drop_root_keeps_held_tail() {
   const DEPTH: usize = 100_000;

   let root = Completable::<u64>::new();
   let mut tail = root.promise();
   for _ in 0..DEPTH {
      tail = tail.then(|x| x + 1);
   }
   let observed = tail.then(|x| x * 2);

   drop(root);
   assert!(tail.try_get().is_none());
   assert!(observed.try_get().is_none());
}

#[test]
fn test_debug_output() {
   let promise = Completable::<i32>::new();
   assert_eq!(format!("{promise:?}"), "Completable(<pending>)");
   promise.complete(3);
   assert_eq!(format!("{promise:?}"), "Completable(3)");
   assert_eq!(format!("{:?}", promise.promise()), "Deferred(3)");
}
