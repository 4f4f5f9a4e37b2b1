//! Per-client job lifecycle.
//!
//! [`JobManager`] is the single owner of the client and job registries. It
//! runs on one task and reacts to [`Event`]s: connections, client lines and
//! worker updates. Workers never touch the registries; they only send
//! events.
//!
//! - At most one active job per client. A new request with a different
//!   content hash cancels the active one, which moves to the retiring table
//!   until its worker reports its outcome.
//! - A request identical to the active one is answered and ignored.
//! - Progress and results are forwarded only for the active job; a retiring
//!   job contributes only its final status.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tracing::{debug, info, warn};

use crate::builder::ModelBuilder;
use crate::control::JobControl;
use crate::job::{self, JobOutcome, WorkerUpdate};
use crate::logging::{log_line, Direction};
use crate::protocol::{
    ClientId, ClientMessage, CommandMessage, JobId, ServerCommand, ServerMessage, SimulationRequest,
};
use crate::settings::JobSettings;
use crate::wave::Band;

/// Input of the event loop.
#[derive(Debug)]
pub enum Event {
    Connected {
        client: ClientId,
        peer: String,
        outbox: UnboundedSender<ServerMessage>,
    },
    Message {
        client: ClientId,
        line: String,
    },
    Disconnected {
        client: ClientId,
    },
    Worker {
        client: ClientId,
        job: JobId,
        update: WorkerUpdate,
    },
}

#[derive(Debug)]
struct ClientEntry {
    peer: String,
    outbox: UnboundedSender<ServerMessage>,
    connected_at: DateTime<Local>,
}

#[derive(Debug)]
struct ActiveJob {
    id: JobId,
    hash: u64,
    control: Arc<JobControl>,
    started_at: DateTime<Local>,
    triangles: usize,
    band: Band,
    percent: f64,
}

#[derive(Debug)]
struct RetiringJob {
    client: ClientId,
}

pub struct JobManager {
    settings: JobSettings,
    clients: HashMap<ClientId, ClientEntry>,
    jobs: HashMap<ClientId, ActiveJob>,
    retiring: HashMap<JobId, RetiringJob>,
    /// Workers get a strong clone; the manager itself must not keep its
    /// own channel open.
    events: WeakUnboundedSender<Event>,
    next_job: JobId,
}

impl JobManager {
    /// `events` is the sending half of the channel the manager is run on;
    /// workers report through it.
    pub fn new(settings: JobSettings, events: &UnboundedSender<Event>) -> Self {
        Self {
            settings,
            clients: HashMap::new(),
            jobs: HashMap::new(),
            retiring: HashMap::new(),
            events: events.downgrade(),
            next_job: 1,
        }
    }

    /// Processes events until every sender is gone. Running workers hold a
    /// sender, so this also waits for their outcomes.
    pub async fn run(mut self, mut events: UnboundedReceiver<Event>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        debug!("event loop stopped");
    }

    /// No job is running or winding down.
    pub fn is_idle(&self) -> bool {
        self.jobs.is_empty() && self.retiring.is_empty()
    }

    pub fn active_job(&self, client: ClientId) -> Option<JobId> {
        self.jobs.get(&client).map(|job| job.id)
    }

    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Connected {
                client,
                peer,
                outbox,
            } => {
                info!(client, %peer, "client connected");
                self.clients.insert(
                    client,
                    ClientEntry {
                        peer,
                        outbox,
                        connected_at: Local::now(),
                    },
                );
            }
            Event::Message { client, line } => self.handle_line(client, &line),
            Event::Disconnected { client } => {
                info!(client, "client disconnected");
                self.retire(client);
                self.clients.remove(&client);
            }
            Event::Worker {
                client,
                job,
                update,
            } => self.handle_worker(client, job, update),
        }
    }

    fn send(&self, client: ClientId, message: ServerMessage) {
        let Some(entry) = self.clients.get(&client) else {
            return;
        };
        if entry.outbox.send(message).is_err() {
            debug!(client, "outbox closed");
        }
    }

    fn answer(&self, client: ClientId, msg: impl Into<String>) {
        self.send(client, ServerMessage::answer(msg));
    }

    fn handle_line(&mut self, client: ClientId, line: &str) {
        log_line(client, Direction::Rx, line);
        match ClientMessage::parse(line) {
            Ok(ClientMessage::Command(command)) => self.handle_command(client, &command),
            Ok(ClientMessage::Simulation(request)) => self.handle_request(client, &request),
            Err(e) => self.answer(client, format!("invalid message: {e}")),
        }
    }

    fn handle_command(&mut self, client: ClientId, command: &CommandMessage) {
        let command = match command.server_command() {
            Ok(command) => command,
            Err(e) => {
                self.answer(client, e);
                return;
            }
        };

        match command {
            ServerCommand::Status => {
                let msg = match self.jobs.get(&client) {
                    Some(job) => format!(
                        "job {} {} at {:.1}%, {} triangles, band {}, started {}",
                        job.id,
                        if job.control.is_paused() { "paused" } else { "running" },
                        job.percent,
                        job.triangles,
                        job.band,
                        job.started_at.format("%Y-%m-%d %H:%M:%S"),
                    ),
                    None => "no active job".to_string(),
                };
                self.answer(client, msg);
            }
            ServerCommand::WhoConnect => {
                let mut ids: Vec<_> = self.clients.keys().copied().collect();
                ids.sort_unstable();
                let lines: Vec<String> = ids
                    .iter()
                    .filter_map(|id| self.clients.get(id).map(|entry| (id, entry)))
                    .map(|(id, entry)| {
                        format!(
                            "client {} {} since {}{}",
                            id,
                            entry.peer,
                            entry.connected_at.format("%Y-%m-%d %H:%M:%S"),
                            if self.jobs.contains_key(id) { " (busy)" } else { "" },
                        )
                    })
                    .collect();
                self.answer(client, lines.join("\n"));
            }
            ServerCommand::Pause => match self.jobs.get(&client) {
                Some(job) => {
                    job.control.pause();
                    self.answer(client, format!("job {} paused", job.id));
                }
                None => self.answer(client, "no active job"),
            },
            ServerCommand::Continue => match self.jobs.get(&client) {
                Some(job) => {
                    job.control.resume();
                    self.answer(client, format!("job {} continued", job.id));
                }
                None => self.answer(client, "no active job"),
            },
            ServerCommand::Stop => match self.retire(client) {
                Some(id) => self.answer(client, format!("job {id} stopping")),
                None => self.answer(client, "no active job"),
            },
        }
    }

    fn handle_request(&mut self, client: ClientId, request: &SimulationRequest) {
        let built = ModelBuilder::from_request(request).and_then(|builder| {
            let model = builder.build()?;
            Ok((builder.content_hash(), model))
        });
        let (hash, model) = match built {
            Ok(built) => built,
            Err(e) => {
                debug!(client, error = %e, "request rejected");
                self.answer(client, format!("invalid request: {e}"));
                return;
            }
        };

        if let Some(job) = self.jobs.get(&client) {
            if job.hash == hash {
                self.answer(client, format!("job {} already running", job.id));
                return;
            }
        }
        if let Some(previous) = self.retire(client) {
            debug!(client, previous, "superseded by new request");
        }
        let Some(events) = self.events.upgrade() else {
            self.answer(client, "server is shutting down");
            return;
        };

        let id = self.next_job;
        self.next_job += 1;
        let control = Arc::new(JobControl::new());
        let triangles = model.num_visible();
        let band = model.wave.band;

        if let Err(e) = job::spawn(
            client,
            id,
            model,
            control.clone(),
            self.settings.clone(),
            events,
        ) {
            warn!(client, job = id, error = %e, "could not start worker");
            self.answer(client, format!("job {id} failed: {e}"));
            return;
        }
        self.spawn_ticker(control.clone());

        self.jobs.insert(
            client,
            ActiveJob {
                id,
                hash,
                control,
                started_at: Local::now(),
                triangles,
                band,
                percent: 0.0,
            },
        );
        self.answer(client, format!("job {id} started"));
    }

    /// Sets the job's progress flag once per interval until it finishes.
    fn spawn_ticker(&self, control: Arc<JobControl>) {
        let period = self.settings.progress_interval();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // the first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                if control.is_finished() || control.is_cancelled() {
                    break;
                }
                control.request_progress();
            }
        });
    }

    /// Cancels the client's active job and moves it to the retiring table.
    fn retire(&mut self, client: ClientId) -> Option<JobId> {
        let job = self.jobs.remove(&client)?;
        job.control.cancel();
        self.retiring.insert(job.id, RetiringJob { client });
        Some(job.id)
    }

    fn handle_worker(&mut self, client: ClientId, job: JobId, update: WorkerUpdate) {
        let active = self.jobs.get(&client).is_some_and(|active| active.id == job);

        if !active {
            if let WorkerUpdate::Finished(outcome) = update {
                if let Some(retired) = self.retiring.remove(&job) {
                    self.answer(retired.client, outcome_text(job, &outcome));
                }
            }
            return;
        }

        match update {
            WorkerUpdate::Progress { status, percent } => {
                if let Some(active) = self.jobs.get_mut(&client) {
                    active.percent = percent;
                }
                self.send(
                    client,
                    ServerMessage::ProgressBar {
                        id: job,
                        status,
                        content: percent,
                    },
                );
            }
            WorkerUpdate::Result(result) => self.send(client, ServerMessage::Result(result)),
            WorkerUpdate::Finished(outcome) => {
                self.jobs.remove(&client);
                self.answer(client, outcome_text(job, &outcome));
            }
        }
    }
}

fn outcome_text(job: JobId, outcome: &JobOutcome) -> String {
    match outcome {
        JobOutcome::Completed => format!("job {job} completed"),
        JobOutcome::Stopped => format!("job {job} stopped"),
        JobOutcome::Failed(e) => format!("job {job} failed: {e}"),
    }
}
