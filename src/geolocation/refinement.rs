//! Monotonic accuracy rule for position refinement
//!
//! A fix replaces the current one only when its accuracy radius is smaller
//! by more than the configured margin. Once the target accuracy is reached
//! the tracker settles and ignores anything that follows.

/// Outcome of offering a fix to the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refinement {
    /// The fix becomes the current location
    Accepted { settled: bool },
    /// Not enough of an improvement
    Rejected,
    /// The tracker already settled
    Ignored,
}

#[derive(Debug, Clone)]
pub struct RefinementTracker {
    margin_meters: f64,
    target_meters: f64,
    best_accuracy: Option<f64>,
    settled: bool,
}

impl RefinementTracker {
    #[must_use]
    pub fn new(margin_meters: f64, target_meters: f64) -> Self {
        Self {
            margin_meters,
            target_meters,
            best_accuracy: None,
            settled: false,
        }
    }

    /// Record the quick fix. It is always accepted.
    pub fn record_initial(&mut self, accuracy: f64) {
        self.best_accuracy = Some(accuracy);
        if accuracy <= self.target_meters {
            self.settled = true;
        }
    }

    pub fn offer(&mut self, accuracy: f64) -> Refinement {
        if self.settled {
            return Refinement::Ignored;
        }
        if !accuracy.is_finite() || accuracy < 0.0 {
            return Refinement::Rejected;
        }

        let improves = match self.best_accuracy {
            None => true,
            // must beat the best by more than the margin; an exact margin gain is rejected
            Some(best) => best - accuracy > self.margin_meters,
        };
        if !improves {
            return Refinement::Rejected;
        }

        self.best_accuracy = Some(accuracy);
        self.settled = accuracy <= self.target_meters;
        Refinement::Accepted {
            settled: self.settled,
        }
    }

    #[must_use]
    pub fn best_accuracy(&self) -> Option<f64> {
        self.best_accuracy
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.settled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> RefinementTracker {
        RefinementTracker::new(5.0, 25.0)
    }

    #[test]
    fn test_small_improvement_is_rejected() {
        let mut tracker = tracker();
        tracker.record_initial(200.0);

        assert_eq!(tracker.offer(196.0), Refinement::Rejected);
        assert_eq!(tracker.best_accuracy(), Some(200.0));

        assert_eq!(tracker.offer(150.0), Refinement::Accepted { settled: false });
        assert_eq!(tracker.best_accuracy(), Some(150.0));
    }

    #[test]
    fn test_margin_is_exclusive() {
        let mut tracker = tracker();
        tracker.record_initial(100.0);
        assert_eq!(tracker.offer(95.0), Refinement::Rejected);
        assert_eq!(tracker.offer(94.9), Refinement::Accepted { settled: false });
    }

    #[test]
    fn test_ten_meter_gain_is_accepted() {
        let mut tracker = tracker();
        tracker.record_initial(200.0);
        assert_eq!(tracker.offer(190.0), Refinement::Accepted { settled: false });
        assert_eq!(tracker.best_accuracy(), Some(190.0));
    }

    #[test]
    fn test_worse_fix_never_replaces() {
        let mut tracker = tracker();
        tracker.record_initial(80.0);
        assert_eq!(tracker.offer(300.0), Refinement::Rejected);
        assert_eq!(tracker.offer(f64::NAN), Refinement::Rejected);
    }

    #[test]
    fn test_first_watch_fix_accepted_without_quick_fix() {
        let mut tracker = tracker();
        assert_eq!(tracker.offer(900.0), Refinement::Accepted { settled: false });
    }

    #[test]
    fn test_settles_at_target_and_ignores_the_rest() {
        let mut tracker = tracker();
        tracker.record_initial(200.0);
        assert_eq!(tracker.offer(25.0), Refinement::Accepted { settled: true });
        assert!(tracker.is_settled());
        assert_eq!(tracker.offer(3.0), Refinement::Ignored);
        assert_eq!(tracker.best_accuracy(), Some(25.0));
    }

    #[test]
    fn test_accurate_quick_fix_settles_immediately() {
        let mut tracker = tracker();
        tracker.record_initial(12.0);
        assert!(tracker.is_settled());
    }
}
