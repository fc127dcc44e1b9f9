//! Internal settlement state for completable promises.
//!
//! This module provides the low-level state machine behind [`Completable`](crate::Completable).
//! It uses atomic operations for the lock-free read path and futex-based waiting via
//! `parking_lot_core` for threads that need to block.
//!
//! The state is packed into a single `AtomicU8` with the following layout:
//! - Bits 0-1: PHASE - Pending (0), Fulfilled (1) or Rejected (2)
//! - Bit 2: LOCKED - The cell is locked for registration or settlement
//! - Bit 3: WAITING - At least one thread is parked on the cell
//! - Bits 4-7: EPOCH - Generation counter to prevent ABA issues
//!
//! The phase only ever moves out of Pending once. The LOCKED bit guards the dependent
//! list and the transition itself; it is never held while user callbacks run.

use core::mem;
use core::sync::atomic::{AtomicU8, Ordering};

use parking_lot_core::{DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN};

/// Observable phase of a promise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
   /// Not settled yet.
   Pending,
   /// Settled with a value.
   Fulfilled,
   /// Settled with a cause.
   Rejected,
}

impl Phase {
   #[inline(always)]
   const fn from_bits(bits: u8) -> Self {
      match bits & SettleState::PHASE_MASK {
         SettleState::FULFILLED => Self::Fulfilled,
         SettleState::REJECTED => Self::Rejected,
         _ => Self::Pending,
      }
   }

   #[inline(always)]
   const fn bits(self) -> u8 {
      match self {
         Self::Pending => 0,
         Self::Fulfilled => SettleState::FULFILLED,
         Self::Rejected => SettleState::REJECTED,
      }
   }

   /// Returns `true` for `Fulfilled` and `Rejected`.
   #[inline]
   pub const fn is_settled(self) -> bool {
      !matches!(self, Self::Pending)
   }
}

/// Atomic state management for a completable promise.
#[repr(transparent)]
pub(crate) struct SettleState(AtomicU8);

impl SettleState {
   /// Phase value: settled with a value.
   const FULFILLED: u8 = 1;
   /// Phase value: settled with a cause.
   const REJECTED: u8 = 2;
   /// Mask for the phase bits.
   const PHASE_MASK: u8 = 3;
   /// Bit flag: Cell is locked for registration or settlement.
   const LOCKED: u8 = 4;
   /// Bit flag: At least one thread is parked.
   const WAITING: u8 = 8;
   /// Start of epoch bits.
   const EPOCH_1: u8 = 16;
   /// Mask for epoch bits.
   const EPOCH_MASK: u8 = !(Self::PHASE_MASK | Self::LOCKED | Self::WAITING);

   /// Calculates the next epoch value based on the current state.
   #[inline(always)]
   const fn next_epoch(current_state: u8) -> u8 {
      (current_state & Self::EPOCH_MASK).wrapping_add(Self::EPOCH_1) & Self::EPOCH_MASK
   }

   /// Creates a new pending state.
   #[inline]
   pub(crate) const fn new() -> Self {
      Self(AtomicU8::new(0))
   }

   /// Reads the current phase.
   ///
   /// Acquire ordering makes the stored outcome visible once a terminal phase is observed.
   #[inline]
   pub(crate) fn phase(&self) -> Phase {
      Phase::from_bits(self.0.load(Ordering::Acquire))
   }

   /// Wakes every thread parked on this cell.
   #[inline]
   fn notify_all(&self) {
      // SAFETY: The address passed to unpark must match the address used for park.
      // We consistently use the address of the AtomicU8.
      unsafe {
         parking_lot_core::unpark_all(self.0.as_ptr() as usize, DEFAULT_UNPARK_TOKEN);
      }
   }

   /// Parks the calling thread until the state differs from `expected_state`.
   #[inline]
   fn park(&self, expected_state: u8) {
      // SAFETY: See safety comment in `notify_all`.
      unsafe {
         // The validation closure runs under the bucket lock, so a concurrent
         // `notify_all` either happens before it (and we see the new state) or after we sleep.
         let _ = parking_lot_core::park(
            self.0.as_ptr() as usize,
            || self.0.load(Ordering::Acquire) == expected_state,
            || {},
            |_, _| {},
            DEFAULT_PARK_TOKEN,
            None,
         );
      }
   }

   /// Sets the WAITING flag if needed and returns the state to park on.
   ///
   /// Returns `None` if `ready` became true for the freshly observed state, in which
   /// case the caller must not park.
   #[inline]
   fn announce_waiter(&self, ready: impl Fn(u8) -> bool) -> Option<u8> {
      let mut current_state = self.0.load(Ordering::Acquire);
      loop {
         if ready(current_state) {
            return None;
         }
         if current_state & Self::WAITING != 0 {
            return Some(current_state);
         }
         let new_state = current_state | Self::WAITING;
         match self.0.compare_exchange_weak(
            current_state,
            new_state,
            Ordering::Relaxed,
            Ordering::Acquire,
         ) {
            Ok(_) => return Some(new_state),
            Err(observed) => {
               current_state = observed;
               std::hint::spin_loop();
            }
         }
      }
   }

   /// Tries to acquire the registration lock once.
   ///
   /// Returns:
   ///   - `Ok(guard)`: Lock acquired, the phase is Pending.
   ///   - `Err(Ok(phase))`: The cell is already settled with `phase`.
   ///   - `Err(Err(state))`: The lock is held by another thread; `state` was observed.
   #[inline]
   fn lock_step(&self) -> Result<SettleGuard<'_>, Result<Phase, u8>> {
      loop {
         let current_state = self.0.load(Ordering::Acquire);
         let phase = Phase::from_bits(current_state);
         if phase.is_settled() {
            return Err(Ok(phase));
         }
         if current_state & Self::LOCKED != 0 {
            return Err(Err(current_state));
         }
         match self.0.compare_exchange_weak(
            current_state,
            current_state | Self::LOCKED,
            Ordering::Acquire,
            Ordering::Relaxed,
         ) {
            Ok(_) => return Ok(SettleGuard { state: self }),
            Err(_) => std::hint::spin_loop(),
         }
      }
   }

   /// Acquires the registration lock, blocking while another thread holds it.
   ///
   /// Returns the terminal phase instead if the cell is (or becomes) settled.
   /// The lock is only ever held for a handful of instructions, so contention is rare.
   #[inline]
   pub(crate) fn lock(&self) -> Result<SettleGuard<'_>, Phase> {
      loop {
         match self.lock_step() {
            Ok(guard) => return Ok(guard),
            Err(Ok(phase)) => return Err(phase),
            Err(Err(_)) => {
               let ready = |state: u8| state & Self::LOCKED == 0 || Phase::from_bits(state).is_settled();
               if let Some(state) = self.announce_waiter(ready) {
                  self.park(state);
               }
            }
         }
      }
   }

   /// Blocks until the cell reaches a terminal phase and returns it.
   pub(crate) fn wait(&self) -> Phase {
      loop {
         let phase = self.phase();
         if phase.is_settled() {
            return phase;
         }
         if let Some(state) = self.announce_waiter(|state| Phase::from_bits(state).is_settled()) {
            self.park(state);
         }
      }
   }

   /// Waits for a terminal phase without blocking the async runtime where possible.
   ///
   /// Tries yielding first, then falls back to `block_in_place` on the multi-thread runtime.
   /// Any other runtime flavor cannot block in place, so there it keeps yielding.
   #[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
   pub(crate) async fn wait_async(&self) -> Phase {
      #[cfg(feature = "async-tokio-mt")]
      let can_block = tokio::runtime::Handle::try_current()
         .is_ok_and(|handle| handle.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread);

      loop {
         for _ in 0..16 {
            let state = self.0.load(Ordering::Acquire);
            if Phase::from_bits(state).is_settled() {
               return Phase::from_bits(state);
            }
            for _ in 0..32 {
               tokio::task::yield_now().await;
               if self.0.load(Ordering::Relaxed) != state {
                  break;
               }
            }
         }

         #[cfg(feature = "async-tokio-mt")]
         {
            if can_block {
               let phase = self.phase();
               if phase.is_settled() {
                  return phase;
               }
               return tokio::task::block_in_place(|| self.wait());
            }
         }
      }
   }
}

/// RAII guard for the registration lock.
///
/// Dropping the guard releases the lock and leaves the cell Pending.
/// [`settle`](SettleGuard::settle) consumes it and publishes a terminal phase instead.
pub(crate) struct SettleGuard<'a> {
   state: &'a SettleState,
}

impl SettleGuard<'_> {
   /// Publishes `phase`, releases the lock and wakes every parked thread.
   ///
   /// Every write to the promise's outcome must happen before this call.
   #[inline]
   pub(crate) fn settle(self, phase: Phase) {
      debug_assert!(phase.is_settled(), "settle called with a pending phase");
      self.release(phase);
      mem::forget(self);
   }

   #[inline(always)]
   fn release(&self, phase: Phase) {
      let current_state = self.state.0.load(Ordering::Relaxed);
      let new_state = phase.bits() | SettleState::next_epoch(current_state);

      // Release ordering publishes the outcome and dependent list written under the lock.
      let prev_state = self.state.0.swap(new_state, Ordering::Release);

      if prev_state & SettleState::WAITING != 0 {
         self.state.notify_all();
      }
   }
}

impl Drop for SettleGuard<'_> {
   #[inline(always)]
   fn drop(&mut self) {
      self.release(Phase::Pending);
   }
}
