use super::fitness::FitnessEvaluator;
use crate::engines::generation::genome::Genome;
use crate::error::{GapxError, Result};
use crate::types::{EvaluationStatus, Fingerprint, FitnessResult};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Attempts per task: the first run plus one retry.
const MAX_ATTEMPTS: u8 = 2;

/// How long the collector waits for events when no deadline is pending.
const IDLE_POLL: Duration = Duration::from_millis(250);

/// Run-level stop signal shared by the controller, the orchestrator and any
/// external caller.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    TimedOut,
    WorkerPanicked,
}

/// A timeout or worker crash observed while evaluating one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub index: usize,
    pub fingerprint: Fingerprint,
    pub kind: IncidentKind,
    pub attempt: u8,
    /// Whether the task was resubmitted after this incident
    pub retried: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationStats {
    pub submitted: usize,
    pub oracle_calls: u64,
    pub cache_hits: u64,
    pub retries: usize,
    pub timeouts: usize,
    pub worker_failures: usize,
    pub skipped: usize,
}

/// Results of one generation, index-aligned with the submitted candidates
#[derive(Debug, Clone)]
pub struct GenerationEvaluation {
    pub batch: u64,
    pub results: Vec<FitnessResult>,
    pub stats: EvaluationStats,
    pub incidents: Vec<Incident>,
    pub cancelled: bool,
}

struct Job {
    batch: u64,
    task: usize,
    attempt: u8,
    genome: Genome,
}

enum Outcome {
    Completed(FitnessResult),
    Panicked(String),
    Skipped,
}

enum Event {
    Started {
        batch: u64,
        task: usize,
        attempt: u8,
        worker: usize,
    },
    Finished {
        batch: u64,
        task: usize,
        attempt: u8,
        outcome: Outcome,
    },
}

struct Worker {
    retired: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

/// Collector-side state of one candidate
struct Slot {
    attempt: u8,
    deadline: Option<Instant>,
    worker: Option<usize>,
    result: Option<FitnessResult>,
}

/// Fans one generation of evaluations out over a worker pool and returns the
/// results in submission order. The per-task deadline starts when a worker
/// picks the task up; a timed-out or panicked task is retried once, then
/// floored. Stuck workers are retired and replaced.
pub struct EvaluationOrchestrator {
    evaluator: Arc<FitnessEvaluator>,
    timeout: Duration,
    cancel: CancellationToken,
    jobs: Option<Sender<Job>>,
    queue: Arc<Mutex<Receiver<Job>>>,
    events_tx: Sender<Event>,
    events: Receiver<Event>,
    workers: Vec<Worker>,
    next_batch: u64,
}

impl EvaluationOrchestrator {
    pub fn new(
        evaluator: Arc<FitnessEvaluator>,
        workers: usize,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let (jobs, queue) = channel();
        let (events_tx, events) = channel();
        let mut orchestrator = Self {
            evaluator,
            timeout,
            cancel,
            jobs: Some(jobs),
            queue: Arc::new(Mutex::new(queue)),
            events_tx,
            events,
            workers: Vec::new(),
            next_batch: 0,
        };
        for _ in 0..workers.max(1) {
            orchestrator.spawn_worker()?;
        }
        log::debug!("Started {} evaluation workers", orchestrator.workers.len());
        Ok(orchestrator)
    }

    pub fn evaluator(&self) -> &Arc<FitnessEvaluator> {
        &self.evaluator
    }

    /// Number of workers currently taking jobs
    pub fn active_workers(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| !w.retired.load(Ordering::SeqCst))
            .count()
    }

    fn spawn_worker(&mut self) -> Result<()> {
        let id = self.workers.len();
        let retired = Arc::new(AtomicBool::new(false));
        let queue = Arc::clone(&self.queue);
        let events = self.events_tx.clone();
        let evaluator = Arc::clone(&self.evaluator);
        let cancel = self.cancel.clone();
        let flag = Arc::clone(&retired);

        let handle = thread::Builder::new()
            .name(format!("gapx-eval-{}", id))
            .spawn(move || worker_loop(id, queue, events, evaluator, cancel, flag))
            .map_err(|e| GapxError::WorkerPool(format!("Failed to spawn worker {}: {}", id, e)))?;

        self.workers.push(Worker {
            retired,
            handle: Some(handle),
        });
        Ok(())
    }

    fn retire_and_replace(&mut self, worker: usize) -> Result<()> {
        if let Some(w) = self.workers.get_mut(worker) {
            if w.retired.swap(true, Ordering::SeqCst) {
                return Ok(());
            }
            // a stuck worker is never joined; it exits once its job returns
            w.handle.take();
        }
        log::warn!("Retiring stuck evaluation worker {}", worker);
        self.spawn_worker()
    }

    fn submit(&self, job: Job) -> Result<()> {
        let jobs = self
            .jobs
            .as_ref()
            .ok_or_else(|| GapxError::WorkerPool("Job queue already closed".to_string()))?;
        jobs.send(job)
            .map_err(|_| GapxError::WorkerPool("All evaluation workers have exited".to_string()))
    }

    /// Evaluate every candidate. The returned results match `candidates`
    /// index for index, whatever order the workers finish in.
    pub fn evaluate_generation(&mut self, candidates: &[Genome]) -> Result<GenerationEvaluation> {
        let batch = self.next_batch;
        self.next_batch += 1;
        let calls_before = self.evaluator.oracle_calls();
        let hits_before = self.evaluator.cache_hits();

        let mut stats = EvaluationStats {
            submitted: candidates.len(),
            ..Default::default()
        };
        let mut incidents = Vec::new();
        let mut slots: Vec<Slot> = candidates
            .iter()
            .map(|_| Slot {
                attempt: 1,
                deadline: None,
                worker: None,
                result: None,
            })
            .collect();

        for (task, genome) in candidates.iter().enumerate() {
            self.submit(Job {
                batch,
                task,
                attempt: 1,
                genome: genome.clone(),
            })?;
        }

        let mut remaining = candidates.len();
        while remaining > 0 {
            let now = Instant::now();
            let wait = slots
                .iter()
                .filter(|s| s.result.is_none())
                .filter_map(|s| s.deadline)
                .min()
                .map(|d| d.saturating_duration_since(now))
                .unwrap_or(IDLE_POLL);

            match self.events.recv_timeout(wait) {
                Ok(Event::Started {
                    batch: b,
                    task,
                    attempt,
                    worker,
                }) => {
                    if b != batch {
                        continue;
                    }
                    let slot = &mut slots[task];
                    if slot.attempt == attempt && slot.result.is_none() {
                        slot.deadline = Some(Instant::now() + self.timeout);
                        slot.worker = Some(worker);
                    }
                }
                Ok(Event::Finished {
                    batch: b,
                    task,
                    attempt,
                    outcome,
                }) => {
                    if b != batch || slots[task].attempt != attempt || slots[task].result.is_some() {
                        log::debug!("Dropping stale result for task {} attempt {}", task, attempt);
                        continue;
                    }
                    let genome = &candidates[task];
                    match outcome {
                        Outcome::Completed(result) => {
                            slots[task].result = Some(result);
                            remaining -= 1;
                        }
                        Outcome::Skipped => {
                            stats.skipped += 1;
                            slots[task].result =
                                Some(FitnessResult::floor(genome.fingerprint(), EvaluationStatus::Skipped));
                            remaining -= 1;
                        }
                        Outcome::Panicked(message) => {
                            stats.worker_failures += 1;
                            let retried = self.retry_or_floor(
                                batch,
                                task,
                                genome,
                                &mut slots[task],
                                EvaluationStatus::WorkerFailed,
                            )?;
                            if retried {
                                stats.retries += 1;
                            } else {
                                remaining -= 1;
                            }
                            log::warn!(
                                "Evaluation of candidate {} ({}) panicked on attempt {}: {}",
                                task,
                                genome.fingerprint().short(),
                                attempt,
                                message
                            );
                            incidents.push(Incident {
                                index: task,
                                fingerprint: genome.fingerprint(),
                                kind: IncidentKind::WorkerPanicked,
                                attempt,
                                retried,
                                detail: message,
                            });
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    let now = Instant::now();
                    let expired: Vec<usize> = slots
                        .iter()
                        .enumerate()
                        .filter(|(_, s)| s.result.is_none() && s.deadline.map_or(false, |d| d <= now))
                        .map(|(i, _)| i)
                        .collect();
                    for task in expired {
                        let genome = &candidates[task];
                        let attempt = slots[task].attempt;
                        stats.timeouts += 1;
                        if let Some(worker) = slots[task].worker.take() {
                            self.retire_and_replace(worker)?;
                        }
                        let retried = self.retry_or_floor(
                            batch,
                            task,
                            genome,
                            &mut slots[task],
                            EvaluationStatus::TimedOut,
                        )?;
                        if retried {
                            stats.retries += 1;
                        } else {
                            remaining -= 1;
                        }
                        log::warn!(
                            "Evaluation of candidate {} ({}) timed out after {:?} on attempt {}{}",
                            task,
                            genome.fingerprint().short(),
                            self.timeout,
                            attempt,
                            if retried { ", retrying" } else { "" }
                        );
                        incidents.push(Incident {
                            index: task,
                            fingerprint: genome.fingerprint(),
                            kind: IncidentKind::TimedOut,
                            attempt,
                            retried,
                            detail: format!("no result within {} ms", self.timeout.as_millis()),
                        });
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(GapxError::WorkerPool("Event channel disconnected".to_string()));
                }
            }
        }

        stats.oracle_calls = self.evaluator.oracle_calls() - calls_before;
        stats.cache_hits = self.evaluator.cache_hits() - hits_before;

        let results: Vec<FitnessResult> = slots
            .into_iter()
            .zip(candidates)
            .map(|(slot, genome)| {
                slot.result
                    .unwrap_or_else(|| FitnessResult::floor(genome.fingerprint(), EvaluationStatus::Skipped))
            })
            .collect();

        Ok(GenerationEvaluation {
            batch,
            results,
            stats,
            incidents,
            cancelled: self.cancel.is_cancelled(),
        })
    }

    /// Resubmit a failed first attempt, or settle the floor once the retry
    /// is spent (or the run is being cancelled). Returns whether a retry was
    /// queued.
    fn retry_or_floor(
        &self,
        batch: u64,
        task: usize,
        genome: &Genome,
        slot: &mut Slot,
        status: EvaluationStatus,
    ) -> Result<bool> {
        slot.deadline = None;
        slot.worker = None;
        if slot.attempt < MAX_ATTEMPTS && !self.cancel.is_cancelled() {
            slot.attempt += 1;
            self.submit(Job {
                batch,
                task,
                attempt: slot.attempt,
                genome: genome.clone(),
            })?;
            return Ok(true);
        }
        slot.result = Some(self.evaluator.settle_floor(genome, status));
        Ok(false)
    }
}

impl Drop for EvaluationOrchestrator {
    fn drop(&mut self) {
        // closing the queue lets idle workers fall out of their loop
        self.jobs.take();
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                if handle.join().is_err() {
                    log::error!("Evaluation worker exited abnormally");
                }
            }
        }
    }
}

fn worker_loop(
    id: usize,
    queue: Arc<Mutex<Receiver<Job>>>,
    events: Sender<Event>,
    evaluator: Arc<FitnessEvaluator>,
    cancel: CancellationToken,
    retired: Arc<AtomicBool>,
) {
    loop {
        let job = {
            let queue = queue.lock().unwrap_or_else(PoisonError::into_inner);
            queue.recv()
        };
        let Ok(job) = job else {
            break;
        };

        let outcome = if cancel.is_cancelled() {
            Outcome::Skipped
        } else {
            let started = Event::Started {
                batch: job.batch,
                task: job.task,
                attempt: job.attempt,
                worker: id,
            };
            if events.send(started).is_err() {
                break;
            }
            match panic::catch_unwind(AssertUnwindSafe(|| evaluator.score(&job.genome))) {
                Ok(result) => Outcome::Completed(result),
                Err(payload) => Outcome::Panicked(panic_message(payload.as_ref())),
            }
        };

        let finished = Event::Finished {
            batch: job.batch,
            task: job.task,
            attempt: job.attempt,
            outcome,
        };
        if events.send(finished).is_err() || retired.load(Ordering::SeqCst) {
            break;
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
