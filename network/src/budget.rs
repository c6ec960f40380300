//! Non-blocking counting budget.
//!
//! A [`Budget`] behaves like a counting semaphore whose acquire never waits:
//! [`Budget::try_acquire`] either takes a permit immediately or reports that
//! none is left. Budgets are owned by a single node and mutated through
//! `&mut self`, so the node's lock domain (its actor task) guards them.

/// A non-negative permit counter with try-acquire / release semantics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Budget {
    available: usize,
}

impl Budget {
    pub fn new(permits: usize) -> Self {
        Self { available: permits }
    }

    /// Take one permit if any is left.
    ///
    /// Returns `true` if a permit was taken. Never blocks and never
    /// underflows.
    pub fn try_acquire(&mut self) -> bool {
        if self.available == 0 {
            return false;
        }
        self.available -= 1;
        true
    }

    /// Return one permit.
    pub fn release(&mut self) {
        self.available += 1;
    }

    /// Permits currently available.
    pub fn available(&self) -> usize {
        self.available
    }

    pub fn is_exhausted(&self) -> bool {
        self.available == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn acquire_until_exhausted() {
        let mut budget = Budget::new(2);
        assert!(budget.try_acquire());
        assert!(budget.try_acquire());
        assert!(!budget.try_acquire());
        assert_eq!(budget.available(), 0);
        assert!(budget.is_exhausted());
    }

    #[test]
    fn release_makes_permit_available_again() {
        let mut budget = Budget::new(1);
        assert!(budget.try_acquire());
        budget.release();
        assert_eq!(budget.available(), 1);
        assert!(budget.try_acquire());
    }

    #[test]
    fn empty_budget_never_goes_negative() {
        let mut budget = Budget::default();
        for _ in 0..10 {
            assert!(!budget.try_acquire());
        }
        assert_eq!(budget.available(), 0);
    }

    proptest! {
        #[test]
        fn permits_are_conserved(initial in 0usize..16, ops in proptest::collection::vec(any::<bool>(), 0..64)) {
            let mut budget = Budget::new(initial);
            let mut held = 0;
            for acquire in ops {
                if acquire {
                    let taken = budget.try_acquire();
                    prop_assert_eq!(taken, held < initial);
                    if taken {
                        held += 1;
                    }
                } else if held > 0 {
                    budget.release();
                    held -= 1;
                }
                prop_assert_eq!(budget.available() + held, initial);
            }
        }
    }
}
