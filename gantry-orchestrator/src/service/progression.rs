//! Progression driver
//!
//! Decides when a job's timer fires and how a `Running` job ends. The default
//! [`TimedProgression`] uses fixed delays and a success ratio; a driver fed by
//! provider callbacks or polling can replace it without touching the state
//! machine.

use std::time::Duration;

use gantry_core::domain::job::{Job, JobState, RunOutcome};

use crate::config::LifecycleConfig;

pub trait ProgressionDriver: Send + Sync {
    /// Delay before the timed transition out of `state`, if it has one
    fn delay_for(&self, state: JobState) -> Option<Duration>;

    /// How a job leaving `Running` ends
    fn settle(&self, job: &Job) -> RunOutcome;
}

/// Probability split between `Completed` and `Failed`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutcomePolicy {
    /// Chance in `[0, 1]` that a run succeeds
    pub success_ratio: f64,
}

impl OutcomePolicy {
    pub fn new(success_ratio: f64) -> Self {
        Self {
            success_ratio: success_ratio.clamp(0.0, 1.0),
        }
    }

    /// Map a uniform roll in `[0, 1)` to an outcome
    pub fn decide(&self, roll: f64) -> RunOutcome {
        if roll < self.success_ratio {
            RunOutcome::Succeeded
        } else {
            RunOutcome::Failed
        }
    }
}

/// Fixed-delay progression
#[derive(Debug, Clone)]
pub struct TimedProgression {
    provisioning_delay: Duration,
    running_delay: Duration,
    outcome: OutcomePolicy,
}

impl TimedProgression {
    pub fn new(config: &LifecycleConfig) -> Self {
        Self {
            provisioning_delay: config.provisioning_delay,
            running_delay: config.running_delay,
            outcome: OutcomePolicy::new(config.success_ratio),
        }
    }
}

impl ProgressionDriver for TimedProgression {
    fn delay_for(&self, state: JobState) -> Option<Duration> {
        match state {
            JobState::Provisioning => Some(self.provisioning_delay),
            JobState::Running => Some(self.running_delay),
            _ => None,
        }
    }

    fn settle(&self, _job: &Job) -> RunOutcome {
        self.outcome.decide(rand::random::<f64>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::dto::job::SubmitJob;

    #[test]
    fn test_outcome_policy_split() {
        let policy = OutcomePolicy::new(0.8);
        assert_eq!(policy.decide(0.0), RunOutcome::Succeeded);
        assert_eq!(policy.decide(0.79), RunOutcome::Succeeded);
        assert_eq!(policy.decide(0.8), RunOutcome::Failed);
        assert_eq!(policy.decide(0.99), RunOutcome::Failed);
    }

    #[test]
    fn test_outcome_policy_extremes() {
        assert_eq!(OutcomePolicy::new(1.0).decide(0.999), RunOutcome::Succeeded);
        assert_eq!(OutcomePolicy::new(0.0).decide(0.0), RunOutcome::Failed);
        assert_eq!(OutcomePolicy::new(7.0).success_ratio, 1.0);
    }

    #[test]
    fn test_delays_follow_config() {
        let config = LifecycleConfig {
            provisioning_delay: Duration::from_millis(10),
            running_delay: Duration::from_millis(20),
            ..Default::default()
        };
        let driver = TimedProgression::new(&config);

        assert_eq!(
            driver.delay_for(JobState::Provisioning),
            Some(Duration::from_millis(10))
        );
        assert_eq!(
            driver.delay_for(JobState::Running),
            Some(Duration::from_millis(20))
        );
        assert_eq!(driver.delay_for(JobState::Pending), None);
        assert_eq!(driver.delay_for(JobState::Completed), None);
    }

    #[test]
    fn test_certain_success_always_settles_completed() {
        let config = LifecycleConfig {
            success_ratio: 1.0,
            ..Default::default()
        };
        let driver = TimedProgression::new(&config);
        let job = Job::new(SubmitJob::new("gpt2", "A100"));
        for _ in 0..100 {
            assert_eq!(driver.settle(&job), RunOutcome::Succeeded);
        }
    }
}
