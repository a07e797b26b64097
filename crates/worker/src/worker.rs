// crates/worker/src/worker.rs
//! Job processing: fetch, classify, apply effects, retry or report.

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, instrument, warn};

use crate::config::{WorkerConfig, WriteMode};
use voluspa_classifier::{classify, Effect};
use voluspa_common::{
    Attempt, Job, JobResult, MemberStore, Message, Outcome, ProfileFetcher, ScrapeError,
    ScrapeResult, Timing,
};
use voluspa_storage::ErrorLog;

/// FIFO of pending attempts. Retries join at the back.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<Attempt>,
}

impl JobQueue {
    pub fn enqueue(&self, attempt: Attempt) -> ScrapeResult<()> {
        self.tx
            .send(attempt)
            .map_err(|_| ScrapeError::Logic("job queue dispatcher has stopped".to_string()))
    }
}

/// Processes attempts with a fixed concurrency window and reports every
/// outbound message on one channel.
pub struct Worker {
    fetcher: Arc<dyn ProfileFetcher>,
    store: Option<Arc<dyn MemberStore>>,
    error_log: ErrorLog,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        fetcher: Arc<dyn ProfileFetcher>,
        store: Option<Arc<dyn MemberStore>>,
        error_log: ErrorLog,
        config: WorkerConfig,
    ) -> Self {
        Self {
            fetcher,
            store,
            error_log,
            config,
        }
    }

    /// Spawn the dispatcher. Attempts pushed into the returned queue are
    /// processed at most `concurrency` at a time.
    pub fn start(self, outbound: mpsc::UnboundedSender<Message>) -> JobQueue {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = JobQueue { tx };
        let permits = Arc::new(Semaphore::new(self.config.concurrency));
        info!(
            fetcher = self.fetcher.name(),
            concurrency = self.config.concurrency,
            max_retries = self.config.max_retries,
            store_results = self.config.store_results,
            write_mode = %self.config.write_mode,
            "worker started"
        );
        tokio::spawn(dispatch(Arc::new(self), rx, queue.clone(), outbound, permits));
        queue
    }

    fn stores(&self) -> Option<&Arc<dyn MemberStore>> {
        self.store.as_ref().filter(|_| self.config.store_results)
    }

    #[instrument(skip(self, queue, outbound), fields(member = %attempt.job, retries = attempt.retries))]
    async fn process_job(
        &self,
        attempt: Attempt,
        queue: &JobQueue,
        outbound: &mpsc::UnboundedSender<Message>,
    ) {
        let started_at = Utc::now();
        let fetch_start = Instant::now();
        let fetched = self.fetcher.fetch_profile(&attempt.job).await;
        let fetch_elapsed = fetch_start.elapsed();

        let raw = match fetched {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "profile fetch failed");
                if let Err(log_err) = self.error_log.record(&attempt.job, &e.to_string()).await {
                    warn!(error = %log_err, "failed to write error log entry");
                }
                if attempt.retries < self.config.max_retries {
                    self.requeue(attempt, queue, outbound);
                } else {
                    emit(outbound, Message::Results(JobResult::new(Outcome::UnknownError, attempt)));
                }
                return;
            }
        };

        let compute_start = Instant::now();
        let classification = classify(&attempt.job, &raw, Utc::now());
        let timing = Timing::new(started_at, fetch_elapsed, compute_start.elapsed());

        for message in classification.stat_messages(&attempt.job) {
            emit(outbound, message);
        }
        for effect in classification.effects.iter().cloned() {
            self.apply(attempt.job, effect).await;
        }

        if classification.is_retryable() && attempt.retries < self.config.max_retries {
            debug!(outcome = %classification.outcome.kind(), "retrying");
            self.requeue(attempt, queue, outbound);
        } else {
            // Unknown payloads were already logged by their LogPayload effect.
            let logged = classification
                .effects
                .iter()
                .any(|effect| matches!(effect, Effect::LogPayload(_)));
            if classification.is_retryable() && !logged {
                warn!(outcome = %classification.outcome.kind(), "retries exhausted");
                if let Err(log_err) = self.error_log.record(&attempt.job, &raw).await {
                    warn!(error = %log_err, "failed to write error log entry");
                }
            }
            emit(
                outbound,
                Message::Results(JobResult::new(classification.outcome, attempt).with_timing(timing)),
            );
        }
    }

    fn requeue(&self, attempt: Attempt, queue: &JobQueue, outbound: &mpsc::UnboundedSender<Message>) {
        if let Err(e) = queue.enqueue(attempt.retry()) {
            warn!(error = %e, "retry dropped, reporting terminal failure");
            emit(outbound, Message::Results(JobResult::new(Outcome::UnknownError, attempt)));
        }
    }

    /// Run one effect in the configured write mode. Store effects are
    /// skipped when result storage is disabled.
    async fn apply(&self, job: Job, effect: Effect) {
        let store = match &effect {
            Effect::LogPayload(_) => None,
            _ => match self.stores() {
                Some(store) => Some(store.clone()),
                None => return,
            },
        };
        let error_log = self.error_log.clone();
        let write = async move {
            if let Err(e) = apply_effect(store.as_deref(), &error_log, &job, &effect).await {
                warn!(member = %job, error = %e, "effect failed");
            }
        };
        match self.config.write_mode {
            WriteMode::FireAndForget => {
                tokio::spawn(write);
            }
            WriteMode::Acknowledged => write.await,
        }
    }
}

async fn apply_effect(
    store: Option<&dyn MemberStore>,
    error_log: &ErrorLog,
    job: &Job,
    effect: &Effect,
) -> ScrapeResult<()> {
    match (effect, store) {
        (Effect::LogPayload(raw), _) => error_log.record(job, raw).await.map(|_| ()),
        (Effect::ExcludeMember, Some(store)) => store.mark_private(job).await,
        (Effect::DeleteMember, Some(store)) => store.delete_member(job).await,
        (Effect::UpsertMember(update), Some(store)) => store.upsert_member(update).await,
        (_, None) => Ok(()),
    }
}

fn emit(outbound: &mpsc::UnboundedSender<Message>, message: Message) {
    if outbound.send(message).is_err() {
        debug!("outbound channel closed, message dropped");
    }
}

async fn dispatch(
    worker: Arc<Worker>,
    mut rx: mpsc::UnboundedReceiver<Attempt>,
    queue: JobQueue,
    outbound: mpsc::UnboundedSender<Message>,
    permits: Arc<Semaphore>,
) {
    while let Some(attempt) = rx.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let worker = worker.clone();
        let queue = queue.clone();
        let outbound = outbound.clone();
        tokio::spawn(async move {
            let _permit = permit;
            worker.process_job(attempt, &queue, &outbound).await;
        });
    }
}
