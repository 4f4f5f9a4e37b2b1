//! Worker side of a portrait job.
//!
//! Each job runs on its own OS thread so the event loop never performs the
//! accumulation. The worker reports through the manager's event channel:
//! "run" progress at the first cell, "work" progress whenever the ticker
//! has set the progress flag, then "done", the result and finally the
//! outcome. A cancelled job reports only its outcome.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use crate::control::JobControl;
use crate::error::SolveError;
use crate::geom::Model;
use crate::manager::Event;
use crate::problem::{Monitor, Problem};
use crate::protocol::{ClientId, JobId, ProgressStatus, ResultMessage};
use crate::result::Portrait;
use crate::settings::JobSettings;


/// Message from a worker to the event loop.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerUpdate {
    Progress { status: ProgressStatus, percent: f64 },
    Result(Box<ResultMessage>),
    Finished(JobOutcome),
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed,
    Stopped,
    Failed(String),
}

/// Progress of `cell` out of `total` as a percentage.
pub fn percent(cell: usize, total: usize) -> f64 {
    if total <= 1 {
        100.0
    } else {
        cell as f64 / (total - 1) as f64 * 100.0
    }
}

/// Sends worker updates tagged with their client and job.
#[derive(Debug, Clone)]
struct Reporter {
    client: ClientId,
    job: JobId,
    events: UnboundedSender<Event>,
}

impl Reporter {
    fn send(&self, update: WorkerUpdate) {
        let event = Event::Worker {
            client: self.client,
            job: self.job,
            update,
        };
        if self.events.send(event).is_err() {
            debug!(job = self.job, "event loop gone, dropping worker update");
        }
    }

    fn progress(&self, status: ProgressStatus, percent: f64) {
        self.send(WorkerUpdate::Progress { status, percent });
    }
}

/// Monitor wired to a job's control flags.
struct JobMonitor<'a> {
    control: &'a JobControl,
    reporter: &'a Reporter,
    settings: &'a JobSettings,
}

impl Monitor for JobMonitor<'_> {
    fn checkpoint(&self, cell: usize, total: usize) -> Result<(), SolveError> {
        while self.control.is_paused() {
            if self.control.is_cancelled() {
                return Err(SolveError::Stopped);
            }
            thread::sleep(self.settings.pause_poll());
        }
        if self.control.is_cancelled() {
            return Err(SolveError::Stopped);
        }

        if cell == 0 {
            self.reporter.progress(ProgressStatus::Run, 0.0);
        } else if self.control.take_progress() {
            self.reporter.progress(ProgressStatus::Work, percent(cell, total));
        }
        Ok(())
    }

    fn is_cancelled(&self) -> bool {
        self.control.is_cancelled()
    }
}

/// Starts the worker thread of job `job` for `client`.
pub fn spawn(
    client: ClientId,
    job: JobId,
    model: Model,
    control: Arc<JobControl>,
    settings: JobSettings,
    events: UnboundedSender<Event>,
) -> std::io::Result<JoinHandle<()>> {
    let reporter = Reporter {
        client,
        job,
        events,
    };
    thread::Builder::new()
        .name(format!("job-{job}"))
        .spawn(move || {
            let outcome = contain(job, || execute(model, &control, &settings, &reporter));
            control.finish();
            info!(job, ?outcome, "job finished");
            reporter.send(WorkerUpdate::Finished(outcome));
        })
}

/// Runs a job body and maps its result to an outcome. A panic in the body
/// becomes a failure so the job still reports how it ended.
fn contain<F>(job: JobId, body: F) -> JobOutcome
where
    F: FnOnce() -> Result<(), SolveError>,
{
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => JobOutcome::Completed,
        Ok(Err(SolveError::Stopped)) => JobOutcome::Stopped,
        Ok(Err(e)) => {
            warn!(job, error = %e, "job failed");
            JobOutcome::Failed(e.to_string())
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(job, %message, "job panicked");
            JobOutcome::Failed(format!("internal error: {message}"))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn execute(
    model: Model,
    control: &JobControl,
    settings: &JobSettings,
    reporter: &Reporter,
) -> Result<(), SolveError> {
    let problem = Problem::new(model, settings.max_grid_cells)?;
    info!(
        job = reporter.job,
        cells = problem.grid.total(),
        facets = problem.num_facets(),
        band = %problem.model.wave.band,
        "job started"
    );

    let monitor = JobMonitor {
        control,
        reporter,
        settings,
    };
    let image = problem.solve(&monitor)?;
    if control.is_cancelled() {
        return Err(SolveError::Stopped);
    }

    let portrait = Portrait::extract(&image.view(), &problem.model, settings.crop_margin);
    reporter.progress(ProgressStatus::Done, 100.0);
    reporter.send(WorkerUpdate::Result(Box::new(portrait.into_message(reporter.job))));
    Ok(())
}
