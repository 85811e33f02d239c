use anyhow::{bail, Result};

use crate::error::ClientError;
use crate::http::ApiClient;
use crate::jobs::{JobMonitor, JobOutcome, JobState, JobUpdate, Phase, Transition};
use crate::ui::{indicator, print_command_status, stacked_percent_bars, CommandStatus, StackedBars};
use crate::utils::counted;

/// Phase bars plus a status line. Without a terminal, one plain line per change.
struct JobProgressUi {
    bars: StackedBars,
    plain: bool,
    last_line: Option<String>,
}

impl JobProgressUi {
    fn new(json: bool) -> Self {
        let labels: Vec<&str> = Phase::ALL.iter().map(|phase| phase.label()).collect();
        let bars = stacked_percent_bars(&labels, !json);
        let plain = !json && !bars.is_visible();
        Self {
            bars,
            plain,
            last_line: None,
        }
    }

    fn render(&mut self, job: &JobState) {
        for (phase, bar) in Phase::ALL.iter().zip(&self.bars.bars) {
            let progress = job.phases.get(*phase);
            bar.set_position(u64::from(progress.percent));
            bar.set_message(format!(
                "{} {}/{} rows",
                step_marker(job, *phase),
                progress.processed,
                progress.total
            ));
        }
        self.bars.status_line.set_message(status_line(job));

        if self.plain {
            let line = plain_line(job);
            if self.last_line.as_deref() != Some(line.as_str()) {
                eprintln!("{line}");
                self.last_line = Some(line);
            }
        }
    }

    fn finish(&self) {
        self.bars.finish();
    }
}

fn step_marker(job: &JobState, phase: Phase) -> String {
    let progress = job.phases.get(phase);
    if progress.done {
        indicator(&CommandStatus::Success)
    } else if job.outcome == JobOutcome::Failed {
        indicator(&CommandStatus::Error)
    } else if job.phase == Some(phase) {
        indicator(&CommandStatus::Pending)
    } else {
        "·".to_string()
    }
}

fn status_line(job: &JobState) -> String {
    match (&job.error, &job.message) {
        (Some(error), _) => format!("status: {} | {error}", job.status_text),
        (None, Some(message)) => format!("status: {} | {message}", job.status_text),
        (None, None) => format!("status: {}", job.status_text),
    }
}

fn plain_line(job: &JobState) -> String {
    let mut line = format!("[{}]", job.status_text);
    if let Some(phase) = job.phase {
        let progress = job.phases.get(phase);
        line.push_str(&format!(
            " {} {}% ({}/{})",
            phase.label(),
            progress.percent,
            progress.processed,
            progress.total
        ));
    }
    if let Some(message) = job.error.as_ref().or(job.message.as_ref()) {
        line.push_str(&format!(" {message}"));
    }
    line
}

pub async fn run(client: ApiClient, job_id: &str, json: bool) -> Result<()> {
    let mut monitor = JobMonitor::new(client);
    let mut subscription = monitor.watch(job_id);
    let mut job = JobState::new(job_id);
    let mut ui = JobProgressUi::new(json);
    ui.render(&job);

    let mut lost_stream = None;
    let interrupted = loop {
        let update = tokio::select! {
            update = subscription.next() => update,
            _ = tokio::signal::ctrl_c() => break true,
        };
        let Some(update) = update else {
            break false;
        };
        let transition = job.apply(&update);
        if let (Transition::Failed, JobUpdate::Disconnected { reason }) = (transition, &update) {
            lost_stream = Some(reason.clone());
        }
        match transition {
            Transition::Updated => ui.render(&job),
            Transition::Completed | Transition::Failed => {
                ui.render(&job);
                break false;
            }
            Transition::Ended => break false,
            Transition::Ignored => {}
        }
    };
    tracing::debug!(job_id = subscription.job_id(), interrupted, "stopped following job");
    subscription.close();
    monitor.close();
    ui.finish();

    if json {
        println!("{}", serde_json::to_string(&job)?);
    }

    match job.outcome {
        JobOutcome::Completed => {
            if !json {
                print_command_status(
                    CommandStatus::Success,
                    &format!(
                        "Import {job_id} completed ({})",
                        counted(job.phases.completed.total, "row")
                    ),
                );
            }
            Ok(())
        }
        JobOutcome::Failed => {
            let error = job.error.as_deref().unwrap_or("import failed");
            print_command_status(
                CommandStatus::Error,
                &format!("Import {job_id} failed: {error}"),
            );
            if job.restart_offered {
                eprintln!("Fix the file and start over with `acme import upload <FILE.csv>`.");
            }
            match lost_stream {
                Some(reason) => Err(ClientError::Subscription(reason).into()),
                None => bail!("import job {job_id} failed"),
            }
        }
        JobOutcome::Running => {
            let message = if interrupted {
                format!("Stopped watching job {job_id}; the import keeps running on the server")
            } else {
                format!("Progress stream for job {job_id} ended before the import finished")
            };
            print_command_status(CommandStatus::Warning, &message);
            eprintln!("Run `acme import watch {job_id}` to check again.");
            Ok(())
        }
    }
}
