//! Step and wall-clock limits for evaluation work.

use crate::errors::ExpressionError;
use std::time::{Duration, Instant};

const DEADLINE_CHECK_INTERVAL: u64 = 32;

/// Bounds the work a single evaluation call may perform.
///
/// Steps count expression nodes visited for the current string and are reset
/// per string; the deadline spans the whole call.
#[derive(Debug, Clone)]
pub struct Budget {
    max_steps: u64,
    steps: u64,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
}

impl Budget {
    /// Creates a budget; the wall-clock limit starts now.
    #[must_use]
    pub fn new(max_steps: u64, timeout: Option<Duration>) -> Self {
        Self {
            max_steps,
            steps: 0,
            timeout,
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    /// Creates a budget with no limits.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::new(u64::MAX, None)
    }

    /// Records one unit of work.
    pub fn tick(&mut self) -> Result<(), ExpressionError> {
        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(ExpressionError::BudgetExceeded(format!(
                "more than {} evaluation steps",
                self.max_steps
            )));
        }
        if self.steps % DEADLINE_CHECK_INTERVAL == 0 {
            self.check_deadline()?;
        }
        Ok(())
    }

    /// Fails if the wall-clock limit has passed.
    pub fn check_deadline(&self) -> Result<(), ExpressionError> {
        match (self.deadline, self.timeout) {
            (Some(deadline), Some(timeout)) if Instant::now() >= deadline => {
                Err(ExpressionError::BudgetExceeded(format!(
                    "wall-clock limit of {}ms reached",
                    timeout.as_millis()
                )))
            }
            _ => Ok(()),
        }
    }

    /// Starts step counting afresh for the next string.
    pub fn reset_steps(&mut self) {
        self.steps = 0;
    }

    /// Returns the steps used for the current string.
    #[must_use]
    pub fn steps_used(&self) -> u64 {
        self.steps
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self::unlimited()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_limit() {
        let mut budget = Budget::new(3, None);
        assert!(budget.tick().is_ok());
        assert!(budget.tick().is_ok());
        assert!(budget.tick().is_ok());
        assert!(matches!(budget.tick(), Err(ExpressionError::BudgetExceeded(_))));

        budget.reset_steps();
        assert_eq!(budget.steps_used(), 0);
        assert!(budget.tick().is_ok());
    }

    #[test]
    fn test_elapsed_deadline() {
        let budget = Budget::new(u64::MAX, Some(Duration::ZERO));
        assert!(matches!(budget.check_deadline(), Err(ExpressionError::BudgetExceeded(_))));
        assert!(Budget::unlimited().check_deadline().is_ok());
    }
}
