use serde::Serialize;

use super::event::{JobUpdate, Phase};

pub const ERROR_STATUS: &str = "ERROR";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PhaseProgress {
    pub processed: u64,
    pub total: u64,
    pub percent: u8,
    pub done: bool,
}

impl PhaseProgress {
    fn record(&mut self, processed: u64, total: u64) {
        self.processed = processed;
        self.total = total;
        self.percent = percent_of(processed, total);
        // 0 == 0 counts as done: an empty phase finishes immediately.
        self.done = processed == total;
    }
}

pub fn percent_of(processed: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    (processed.min(total) as f64 / total as f64 * 100.0).round() as u8
}

/// Fixed per-phase slots; there is no way to address an unknown phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PhaseBoard {
    pub parsing: PhaseProgress,
    pub importing: PhaseProgress,
    pub completed: PhaseProgress,
}

impl PhaseBoard {
    pub fn get(&self, phase: Phase) -> &PhaseProgress {
        match phase {
            Phase::Parsing => &self.parsing,
            Phase::Importing => &self.importing,
            Phase::Completed => &self.completed,
        }
    }

    fn get_mut(&mut self, phase: Phase) -> &mut PhaseProgress {
        match phase {
            Phase::Parsing => &mut self.parsing,
            Phase::Importing => &mut self.importing,
            Phase::Completed => &mut self.completed,
        }
    }

    fn zero_percentages(&mut self) {
        for phase in Phase::ALL {
            self.get_mut(phase).percent = 0;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Running,
    Completed,
    Failed,
}

/// What applying one update did to the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Updated,
    Completed,
    Failed,
    /// The sentinel arrived; no more updates will follow.
    Ended,
    /// The job was already terminal.
    Ignored,
}

/// Client-side view of one import job, mutated only through [`JobState::apply`].
#[derive(Debug, Clone, Serialize)]
pub struct JobState {
    pub job_id: String,
    pub status_text: String,
    pub phase: Option<Phase>,
    pub phases: PhaseBoard,
    pub message: Option<String>,
    pub error: Option<String>,
    pub outcome: JobOutcome,
    pub restart_offered: bool,
}

impl JobState {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status_text: "pending".to_string(),
            phase: None,
            phases: PhaseBoard::default(),
            message: None,
            error: None,
            outcome: JobOutcome::Running,
            restart_offered: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome != JobOutcome::Running
    }

    pub fn apply(&mut self, update: &JobUpdate) -> Transition {
        if matches!(update, JobUpdate::Ended) {
            return Transition::Ended;
        }
        if self.is_terminal() {
            return Transition::Ignored;
        }

        match update {
            JobUpdate::Progress {
                phase,
                processed,
                total,
                message,
            } => {
                let processed = if *total > 0 && processed > total {
                    tracing::warn!(
                        job_id = %self.job_id,
                        phase = phase.as_str(),
                        processed,
                        total,
                        "processed count exceeds total, clamping"
                    );
                    *total
                } else {
                    *processed
                };

                self.status_text = phase.as_str().to_string();
                self.phase = Some(*phase);
                if message.is_some() {
                    self.message = message.clone();
                }
                let slot = self.phases.get_mut(*phase);
                slot.record(processed, *total);

                if *phase == Phase::Completed && slot.done {
                    self.outcome = JobOutcome::Completed;
                    Transition::Completed
                } else {
                    Transition::Updated
                }
            }
            JobUpdate::Status { status, message } => {
                tracing::debug!(
                    job_id = %self.job_id,
                    status = %status,
                    "status outside known phases"
                );
                self.status_text = status.clone();
                if message.is_some() {
                    self.message = message.clone();
                }
                Transition::Updated
            }
            JobUpdate::Failed { error } => self.fail(error.clone()),
            JobUpdate::Disconnected { reason } => {
                self.fail(format!("progress stream closed unexpectedly: {reason}"))
            }
            JobUpdate::Ended => Transition::Ended,
        }
    }

    fn fail(&mut self, error: String) -> Transition {
        self.status_text = ERROR_STATUS.to_string();
        self.error = Some(error);
        self.phases.zero_percentages();
        self.restart_offered = true;
        self.outcome = JobOutcome::Failed;
        Transition::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(phase: Phase, processed: u64, total: u64) -> JobUpdate {
        JobUpdate::Progress {
            phase,
            processed,
            total,
            message: None,
        }
    }

    #[test]
    fn phases_advance_in_arrival_order() {
        let mut job = JobState::new("7");
        assert_eq!(job.apply(&progress(Phase::Parsing, 0, 0)), Transition::Updated);
        assert_eq!(
            job.apply(&progress(Phase::Parsing, 5000, 10000)),
            Transition::Updated
        );
        assert_eq!(job.phases.parsing.percent, 50);
        assert!(!job.phases.parsing.done);

        job.apply(&progress(Phase::Parsing, 10000, 10000));
        assert!(job.phases.parsing.done);
        assert_eq!(job.phases.parsing.percent, 100);

        job.apply(&progress(Phase::Importing, 0, 1));
        assert_eq!(job.status_text, "importing");
        assert_eq!(job.phase, Some(Phase::Importing));
        assert!(!job.phases.importing.done);

        job.apply(&progress(Phase::Importing, 1, 1));
        assert_eq!(
            job.apply(&progress(Phase::Completed, 10000, 10000)),
            Transition::Completed
        );
        assert_eq!(job.outcome, JobOutcome::Completed);
        assert!(!job.restart_offered);
    }

    #[test]
    fn empty_phase_is_done_immediately() {
        let mut job = JobState::new("1");
        job.apply(&progress(Phase::Importing, 0, 0));
        assert!(job.phases.importing.done);
        assert_eq!(job.phases.importing.percent, 0);
    }

    #[test]
    fn processed_never_exceeds_total() {
        let mut job = JobState::new("1");
        job.apply(&progress(Phase::Parsing, 12, 10));
        assert_eq!(job.phases.parsing.processed, 10);
        assert!(job.phases.parsing.processed <= job.phases.parsing.total);
        assert_eq!(job.phases.parsing.percent, 100);
    }

    #[test]
    fn completed_with_mismatched_counts_is_not_terminal() {
        let mut job = JobState::new("1");
        assert_eq!(
            job.apply(&progress(Phase::Completed, 3, 10)),
            Transition::Updated
        );
        assert!(!job.is_terminal());
    }

    #[test]
    fn error_event_zeroes_progress_and_offers_restart() {
        let mut job = JobState::new("1");
        job.apply(&progress(Phase::Parsing, 10, 10));
        job.apply(&progress(Phase::Importing, 1, 2));

        let transition = job.apply(&JobUpdate::Failed {
            error: "duplicate key".to_string(),
        });
        assert_eq!(transition, Transition::Failed);
        assert_eq!(job.status_text, ERROR_STATUS);
        assert_eq!(job.error.as_deref(), Some("duplicate key"));
        assert!(job.restart_offered);
        for phase in Phase::ALL {
            assert_eq!(job.phases.get(phase).percent, 0);
        }
        // Counts survive so the operator can see how far it got.
        assert_eq!(job.phases.parsing.processed, 10);
    }

    #[test]
    fn disconnect_is_a_subscription_error() {
        let mut job = JobState::new("1");
        job.apply(&JobUpdate::Disconnected {
            reason: "eof".to_string(),
        });
        assert_eq!(job.outcome, JobOutcome::Failed);
        assert!(job.error.as_deref().unwrap().contains("eof"));
    }

    #[test]
    fn terminal_job_ignores_later_updates() {
        let mut job = JobState::new("1");
        job.apply(&progress(Phase::Completed, 4, 4));
        assert_eq!(
            job.apply(&JobUpdate::Failed {
                error: "late".to_string()
            }),
            Transition::Ignored
        );
        assert_eq!(job.outcome, JobOutcome::Completed);
        assert_eq!(job.apply(&JobUpdate::Ended), Transition::Ended);
    }

    #[test]
    fn intermediate_status_only_changes_text() {
        let mut job = JobState::new("1");
        job.apply(&JobUpdate::Status {
            status: "staging".to_string(),
            message: Some("copying rows".to_string()),
        });
        assert_eq!(job.status_text, "staging");
        assert_eq!(job.message.as_deref(), Some("copying rows"));
        assert_eq!(job.phases, PhaseBoard::default());
    }
}
