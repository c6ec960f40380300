//! Admission control for overlay links.
//!
//! A node splits its target degree `D` into an inbound and an outbound
//! budget of `D / 2` each. For odd `D` the spare slot goes to inbound with
//! probability [`INBOUND_SPARE_SLOT_PROBABILITY`], otherwise to outbound, so
//! that a population sharing the same `D` carries no systematic bias.
//!
//! On top of that, a lifetime attempt budget of `D * ATTEMPT_MULTIPLIER`
//! bounds how many ConnectPeers requests a node will ever send. It is never
//! refilled.

use rand::Rng;

use crate::budget::Budget;

/// Probability that the spare slot of an odd target degree is inbound.
pub const INBOUND_SPARE_SLOT_PROBABILITY: f64 = 0.4;

/// Lifetime connection attempts per unit of target degree.
pub const ATTEMPT_MULTIPLIER: usize = 100;

/// Which side initiated an overlay link.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LinkDirection {
    /// The remote peer asked us and we accepted.
    Inbound,
    /// We asked the remote peer and it accepted.
    Outbound,
}

/// Per-node inbound / outbound / attempt budgets.
///
/// Budgets are sized once, on the first maintenance cycle; before that all
/// of them are empty and every inbound request is rejected.
#[derive(Clone, Debug, Default)]
pub struct AdmissionController {
    target_degree: usize,
    initialized: bool,
    inbound: Budget,
    outbound: Budget,
    attempts: Budget,
    inbound_accepted: usize,
    outbound_accepted: usize,
}

impl AdmissionController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size the budgets for `target_degree`. Only the first call has any
    /// effect; returns `true` if this call sized them.
    pub fn initialize<R: Rng + ?Sized>(&mut self, target_degree: usize, rng: &mut R) -> bool {
        if self.initialized {
            return false;
        }

        let half = target_degree / 2;
        self.inbound = Budget::new(half);
        self.outbound = Budget::new(half);
        if target_degree % 2 == 1 {
            if rng.gen_bool(INBOUND_SPARE_SLOT_PROBABILITY) {
                self.inbound.release();
            } else {
                self.outbound.release();
            }
        }
        self.attempts = Budget::new(target_degree.saturating_mul(ATTEMPT_MULTIPLIER));
        self.target_degree = target_degree;
        self.initialized = true;

        tracing::debug!(
            target_degree,
            inbound = self.inbound.available(),
            outbound = self.outbound.available(),
            attempts = self.attempts.available(),
            "admission budgets initialized"
        );
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Try to admit an inbound link. On success the inbound slot is consumed.
    pub fn try_admit_inbound(&mut self) -> bool {
        if self.inbound.try_acquire() {
            self.inbound_accepted += 1;
            true
        } else {
            false
        }
    }

    /// Provisionally reserve an outbound slot for one connection attempt.
    pub fn lease_outbound(&mut self) -> bool {
        self.outbound.try_acquire()
    }

    /// Give back an outbound slot reserved by [`lease_outbound`] that did
    /// not turn into a link.
    ///
    /// [`lease_outbound`]: AdmissionController::lease_outbound
    pub fn release_outbound(&mut self) {
        self.outbound.release();
    }

    /// The peer accepted: the leased outbound slot is now an established link.
    pub fn confirm_outbound(&mut self) {
        self.outbound_accepted += 1;
    }

    /// Spend one unit of the lifetime attempt budget.
    pub fn try_spend_attempt(&mut self) -> bool {
        self.attempts.try_acquire()
    }

    /// Give back an attempt unit that did not result in a request.
    pub fn refund_attempt(&mut self) {
        self.attempts.release();
    }

    /// An established link went away: free the slot it occupied.
    pub fn release_link(&mut self, direction: LinkDirection) {
        match direction {
            LinkDirection::Inbound => {
                self.inbound_accepted = self.inbound_accepted.saturating_sub(1);
                self.inbound.release();
            }
            LinkDirection::Outbound => {
                self.outbound_accepted = self.outbound_accepted.saturating_sub(1);
                self.outbound.release();
            }
        }
    }

    pub fn has_attempts(&self) -> bool {
        !self.attempts.is_exhausted()
    }

    pub fn target_degree(&self) -> usize {
        self.target_degree
    }

    pub fn inbound_available(&self) -> usize {
        self.inbound.available()
    }

    pub fn outbound_available(&self) -> usize {
        self.outbound.available()
    }

    pub fn attempts_remaining(&self) -> usize {
        self.attempts.available()
    }

    pub fn inbound_accepted(&self) -> usize {
        self.inbound_accepted
    }

    pub fn outbound_accepted(&self) -> usize {
        self.outbound_accepted
    }
}
