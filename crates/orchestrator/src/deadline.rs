//! Per-utterance deadline arithmetic

use tokio::time::{Duration, Instant};

/// Absolute deadline handed down the pipeline. Each stage takes a slice of
/// whatever remains; a missed slice truncates later work, it never aborts
/// completed side effects.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn from_now(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
        }
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Remaining budget minus a reserve kept back for later stages.
    pub fn remaining_less(&self, reserve: Duration) -> Duration {
        self.remaining().saturating_sub(reserve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_remaining_shrinks() {
        let deadline = Deadline::from_now(Duration::from_millis(100));
        assert!(!deadline.expired());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(deadline.remaining() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_reserve_subtracts() {
        let deadline = Deadline::from_now(Duration::from_secs(2));
        let sliced = deadline.remaining_less(Duration::from_millis(1500));
        assert!(sliced <= Duration::from_millis(500));
    }
}
