//! Job progress tracking.
//!
//! Two asynchronous sources update the tracked job and must converge: a
//! periodic pull of the list endpoint and push events on the job's bus
//! channel. Both are funneled through a single reducer. Push events are
//! trusted for `progress`, `progress_message`, and `current_step`; pull
//! responses are trusted for state transitions and `error_message`. The
//! state transition graph is monotone: updates that would regress a
//! state, or move a job out of a terminal state, are ignored.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use docflow_host::{PushBus, SubscriptionId};
use docflow_job_models::{ExtractionState, Job, ListJobsRequest, ProgressPayload, QueueState};
use tokio::sync::mpsc;

use crate::api::{ApiError, ExtractionApi};

/// Name of the bus event carrying progress updates.
pub const UPDATE_PROGRESS_EVENT: &str = "update_progress";

/// Interval of the pull fallback.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Page size of the pull request.
pub const POLL_PAGE_SIZE: i64 = 20;

/// The client-side view of a tracked job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobSnapshot {
    /// Database id, used to locate the job in list responses.
    pub job_id: i64,
    /// Stable identifier, also the bus channel key.
    pub uuid: String,
    /// Queue lifecycle state.
    pub queue_state: QueueState,
    /// Extraction lifecycle state (primary).
    pub extraction_state: ExtractionState,
    /// Progress percentage as last reported.
    pub progress: u32,
    /// Human-readable progress message.
    pub progress_message: String,
    /// Identifier of the step currently running.
    pub current_step: String,
    /// Error description for failed jobs.
    pub error_message: String,
    /// Opaque navigation descriptor, parsed lazily on click.
    pub result_action_json: Option<String>,
    /// Document type code the job was submitted with.
    pub document_type: String,
    /// URL of the merged source PDF, when the server kept one.
    pub merged_pdf_url: Option<String>,
}

impl JobSnapshot {
    /// A fresh snapshot for a just-submitted job.
    #[must_use]
    pub fn new(job_id: i64, document_type: &str) -> Self {
        Self {
            job_id,
            document_type: document_type.to_owned(),
            ..Self::default()
        }
    }

    /// Progress clamped to `[0, 100]` for display.
    #[must_use]
    pub fn display_progress(&self) -> u32 {
        self.progress.min(docflow_job_models::MAX_PROGRESS)
    }

    /// A short label for dashboard rows.
    #[must_use]
    pub fn state_label(&self) -> String {
        if self.queue_state == QueueState::Cancelled {
            return QueueState::Cancelled.to_string();
        }
        self.extraction_state.to_string()
    }

    /// `true` once either lifecycle reached a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.extraction_state.is_terminal() || self.queue_state.is_terminal()
    }
}

/// One update from either source, tagged by origin.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    /// A bus `update_progress` payload.
    Push(ProgressPayload),
    /// The job row from a list-endpoint response.
    Pull(Job),
}

/// Applies one event to the snapshot. Pure; both the poll loop and the
/// bus callback go through here so the trust and monotonicity rules
/// cannot diverge.
#[must_use]
pub fn reduce(prev: &JobSnapshot, event: &TrackerEvent) -> JobSnapshot {
    let mut next = prev.clone();

    // Updates arriving after a terminal state carry nothing the client
    // still cares about.
    if prev.is_terminal() {
        return next;
    }

    match event {
        TrackerEvent::Push(payload) => {
            next.progress = payload.progress;
            if !payload.message.is_empty() {
                next.progress_message = payload.message.clone();
            }
            if !payload.step.is_empty() {
                next.current_step = payload.step.clone();
            }
        }
        TrackerEvent::Pull(job) => {
            next.uuid.clone_from(&job.uuid);
            next.queue_state = prev.queue_state.merge(job.queue_state);
            next.extraction_state = prev.extraction_state.merge(job.extraction_state);
            next.error_message.clone_from(&job.error_message);
            next.result_action_json.clone_from(&job.result_action_json);
            if job.merged_pdf_url.is_some() {
                next.merged_pdf_url.clone_from(&job.merged_pdf_url);
            }
            if !job.document_type.is_empty() {
                next.document_type.clone_from(&job.document_type);
            }
            // Progress and step text belong to the push path; a pull only
            // contributes them when it is ahead of what push reported.
            if job.progress > prev.progress {
                next.progress = job.progress;
                if !job.progress_message.is_empty() {
                    next.progress_message.clone_from(&job.progress_message);
                }
                if !job.current_step.is_empty() {
                    next.current_step.clone_from(&job.current_step);
                }
            }
        }
    }

    next
}

/// Per-UUID bus subscription registry: at most one subscription per job
/// channel, and exact unsubscription of the callback that was registered.
pub struct ProgressSubscriptions {
    bus: Arc<dyn PushBus>,
    active: Mutex<BTreeMap<String, SubscriptionId>>,
}

impl ProgressSubscriptions {
    /// Creates an empty registry on a bus.
    #[must_use]
    pub fn new(bus: Arc<dyn PushBus>) -> Self {
        Self {
            bus,
            active: Mutex::new(BTreeMap::new()),
        }
    }

    /// Opens the job's channel and registers a callback that forwards
    /// parsed [`ProgressPayload`]s into `events`. A second call for the
    /// same UUID is a no-op.
    pub fn ensure_subscribed(&self, uuid: &str, events: mpsc::UnboundedSender<TrackerEvent>) {
        let Ok(mut active) = self.active.lock() else {
            return;
        };
        if active.contains_key(uuid) {
            return;
        }

        self.bus.add_channel(uuid);
        let id = self.bus.subscribe(
            UPDATE_PROGRESS_EVENT,
            Arc::new(move |payload| {
                match serde_json::from_value::<ProgressPayload>(payload.clone()) {
                    Ok(parsed) => {
                        // Receiver gone means the tracker already shut down.
                        events.send(TrackerEvent::Push(parsed)).ok();
                    }
                    Err(e) => log::warn!("discarding malformed progress payload: {e}"),
                }
            }),
        );
        active.insert(uuid.to_owned(), id);
        log::debug!("subscribed to progress channel {uuid}");
    }

    /// Unsubscribes the job's callback and closes its channel.
    pub fn release(&self, uuid: &str) {
        let Ok(mut active) = self.active.lock() else {
            return;
        };
        if let Some(id) = active.remove(uuid) {
            self.bus.unsubscribe(UPDATE_PROGRESS_EVENT, id);
            self.bus.delete_channel(uuid);
            log::debug!("released progress channel {uuid}");
        }
    }

    /// Releases every tracked channel. Called on unmount.
    pub fn release_all(&self) {
        let uuids: Vec<String> = self
            .active
            .lock()
            .map_or_else(|_| Vec::new(), |active| active.keys().cloned().collect());
        for uuid in uuids {
            self.release(&uuid);
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.active.lock().map_or(0, |active| active.len())
    }

    /// `true` when no subscription is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drives one job from TRACKING to a terminal state.
///
/// Owns the snapshot, the poll timer, and the job's bus subscription.
/// The poll path runs immediately on entry and then every
/// [`POLL_INTERVAL`]; the push path is attached on the first pull that
/// shows the job processing (the UUID is only known from the pull).
pub struct JobTracker {
    api: Arc<dyn ExtractionApi>,
    subscriptions: ProgressSubscriptions,
    snapshot: JobSnapshot,
    events_tx: mpsc::UnboundedSender<TrackerEvent>,
    events_rx: mpsc::UnboundedReceiver<TrackerEvent>,
    shutdown_rx: mpsc::UnboundedReceiver<()>,
}

/// Handle used by the owning component to stop a running tracker.
#[derive(Debug, Clone)]
pub struct TrackerShutdown(mpsc::UnboundedSender<()>);

impl TrackerShutdown {
    /// Requests the tracker to stop. Idempotent.
    pub fn shutdown(&self) {
        self.0.send(()).ok();
    }
}

impl JobTracker {
    /// Creates a tracker for a submitted job.
    #[must_use]
    pub fn new(
        api: Arc<dyn ExtractionApi>,
        bus: Arc<dyn PushBus>,
        snapshot: JobSnapshot,
    ) -> (Self, TrackerShutdown) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
        (
            Self {
                api,
                subscriptions: ProgressSubscriptions::new(bus),
                snapshot,
                events_tx,
                events_rx,
                shutdown_rx,
            },
            TrackerShutdown(shutdown_tx),
        )
    }

    /// The current snapshot.
    #[must_use]
    pub const fn snapshot(&self) -> &JobSnapshot {
        &self.snapshot
    }

    /// Applies one event through the reducer and maintains the bus
    /// subscription: attach once the job is observed processing, release
    /// on terminal.
    pub fn apply(&mut self, event: &TrackerEvent) {
        self.snapshot = reduce(&self.snapshot, event);

        if self.snapshot.is_terminal() {
            if !self.snapshot.uuid.is_empty() {
                self.subscriptions.release(&self.snapshot.uuid);
            }
            return;
        }

        let processing = self.snapshot.extraction_state == ExtractionState::Processing
            || self.snapshot.queue_state == QueueState::Started;
        if processing && !self.snapshot.uuid.is_empty() {
            self.subscriptions
                .ensure_subscribed(&self.snapshot.uuid, self.events_tx.clone());
        }
    }

    /// Pulls the list endpoint once and applies the tracked job's row.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure; the caller logs and
    /// retries on the next tick.
    pub async fn poll_once(&mut self) -> Result<(), ApiError> {
        let page = self
            .api
            .list_jobs(&ListJobsRequest {
                offset: 0,
                limit: POLL_PAGE_SIZE,
            })
            .await?;

        if let Some(job) = page.jobs.into_iter().find(|j| j.id == self.snapshot.job_id) {
            self.apply(&TrackerEvent::Pull(job));
        } else {
            log::debug!(
                "job {} not in the first {POLL_PAGE_SIZE} list entries",
                self.snapshot.job_id
            );
        }

        Ok(())
    }

    /// Runs until the job reaches a terminal state or shutdown is
    /// requested, then releases all bus resources and returns the final
    /// snapshot.
    pub async fn run(mut self) -> JobSnapshot {
        // Immediate pull on entry; polling failures are logged and
        // retried on the next tick.
        if let Err(e) = self.poll_once().await {
            log::error!("initial job poll failed: {e}");
        }

        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        // The immediate pull above consumed the leading tick.
        ticker.tick().await;

        while !self.snapshot.is_terminal() {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        log::error!("job poll failed: {e}");
                    }
                }
                event = self.events_rx.recv() => {
                    if let Some(event) = event {
                        self.apply(&event);
                    }
                }
                _ = self.shutdown_rx.recv() => {
                    log::debug!("tracker for job {} shut down", self.snapshot.job_id);
                    break;
                }
            }
        }

        self.subscriptions.release_all();
        self.snapshot
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use docflow_host::MemoryBus;
    use docflow_job_models::{
        ExtractPagesRequest, ExtractPagesResponse, FetchJobsPage, PdfToImagesRequest,
        PdfToImagesResponse,
    };

    use super::*;

    fn processing_job(id: i64, progress: u32) -> Job {
        Job {
            id,
            uuid: format!("uuid-{id}"),
            queue_state: QueueState::Started,
            extraction_state: ExtractionState::Processing,
            progress,
            ..Job::default()
        }
    }

    fn push(progress: u32, step: &str) -> TrackerEvent {
        TrackerEvent::Push(ProgressPayload {
            progress,
            message: String::new(),
            step: step.to_owned(),
        })
    }

    #[test]
    fn push_and_pull_converge() {
        // Pull at t=0, push at t=1, stale pull at t=2.
        let mut snapshot = JobSnapshot::new(7, "01");
        let mut t0 = processing_job(7, 10);
        t0.progress_message = "Queued".to_owned();
        snapshot = reduce(&snapshot, &TrackerEvent::Pull(t0));
        assert_eq!(snapshot.progress, 10);

        snapshot = reduce(&snapshot, &push(35, "ai_batch_processing"));
        assert_eq!(snapshot.progress, 35);
        assert_eq!(snapshot.current_step, "ai_batch_processing");

        snapshot = reduce(&snapshot, &TrackerEvent::Pull(processing_job(7, 20)));
        assert_eq!(snapshot.progress, 35);
        assert_eq!(snapshot.current_step, "ai_batch_processing");
        assert_eq!(snapshot.extraction_state, ExtractionState::Processing);
    }

    #[test]
    fn pull_owns_state_transitions_and_errors() {
        let mut snapshot = JobSnapshot::new(7, "01");
        let mut failed = processing_job(7, 50);
        failed.extraction_state = ExtractionState::Error;
        failed.error_message = "model refused".to_owned();

        snapshot = reduce(&snapshot, &TrackerEvent::Pull(failed));
        assert_eq!(snapshot.extraction_state, ExtractionState::Error);
        assert_eq!(snapshot.error_message, "model refused");
    }

    #[test]
    fn terminal_state_absorbs_later_updates() {
        let mut snapshot = JobSnapshot::new(7, "01");
        let mut done = processing_job(7, 100);
        done.extraction_state = ExtractionState::Done;
        snapshot = reduce(&snapshot, &TrackerEvent::Pull(done));

        let regressed = reduce(&snapshot, &TrackerEvent::Pull(processing_job(7, 60)));
        assert_eq!(regressed.extraction_state, ExtractionState::Done);

        let pushed = reduce(&snapshot, &push(10, "late"));
        assert_eq!(pushed.progress, snapshot.progress);
        assert_eq!(pushed.current_step, snapshot.current_step);
    }

    #[test]
    fn display_progress_is_clamped() {
        let mut snapshot = JobSnapshot::new(7, "01");
        snapshot.progress = 140;
        assert_eq!(snapshot.display_progress(), 100);
    }

    #[test]
    fn subscriptions_are_at_most_one_per_uuid() {
        let bus = Arc::new(MemoryBus::new());
        let subs = ProgressSubscriptions::new(Arc::clone(&bus) as Arc<dyn PushBus>);
        let (tx, _rx) = mpsc::unbounded_channel();

        subs.ensure_subscribed("uuid-7", tx.clone());
        subs.ensure_subscribed("uuid-7", tx);
        assert_eq!(subs.len(), 1);
        assert_eq!(bus.subscription_count(), 1);
        assert_eq!(bus.open_channels(), 1);

        subs.release("uuid-7");
        assert_eq!(bus.subscription_count(), 0);
        assert_eq!(bus.open_channels(), 0);
        assert!(subs.is_empty());
    }

    /// Scripted list endpoint: returns the queued pages in order, then
    /// repeats the last one.
    struct ScriptedApi {
        pages: std::sync::Mutex<Vec<FetchJobsPage>>,
    }

    impl ScriptedApi {
        fn new(jobs: Vec<Vec<Job>>) -> Self {
            Self {
                pages: std::sync::Mutex::new(
                    jobs.into_iter()
                        .map(|jobs| FetchJobsPage {
                            jobs,
                            has_more: false,
                        })
                        .collect(),
                ),
            }
        }
    }

    #[async_trait]
    impl ExtractionApi for ScriptedApi {
        async fn pdf_to_images(
            &self,
            _request: &PdfToImagesRequest,
        ) -> Result<PdfToImagesResponse, ApiError> {
            unimplemented!("not used in tracker tests")
        }

        async fn extract_pages(
            &self,
            _request: &ExtractPagesRequest,
        ) -> Result<ExtractPagesResponse, ApiError> {
            unimplemented!("not used in tracker tests")
        }

        async fn list_jobs(&self, _request: &ListJobsRequest) -> Result<FetchJobsPage, ApiError> {
            let mut pages = self.pages.lock().unwrap();
            Ok(if pages.len() > 1 {
                pages.remove(0)
            } else {
                pages.first().cloned().unwrap_or_default()
            })
        }
    }

    #[tokio::test]
    async fn tracker_subscribes_while_processing_and_releases_on_done() {
        let mut done = processing_job(7, 100);
        done.extraction_state = ExtractionState::Done;
        done.result_action_json = Some(r#"{"type":"open","id":42}"#.to_owned());

        let api = Arc::new(ScriptedApi::new(vec![
            vec![processing_job(7, 10)],
            vec![done],
        ]));
        let bus = Arc::new(MemoryBus::new());

        let (mut tracker, _shutdown) = JobTracker::new(
            Arc::clone(&api) as Arc<dyn ExtractionApi>,
            Arc::clone(&bus) as Arc<dyn PushBus>,
            JobSnapshot::new(7, "01"),
        );

        tracker.poll_once().await.unwrap();
        assert_eq!(bus.open_channels(), 1);
        assert_eq!(tracker.snapshot().progress, 10);

        tracker.poll_once().await.unwrap();
        assert!(tracker.snapshot().is_terminal());
        assert_eq!(
            tracker.snapshot().result_action_json.as_deref(),
            Some(r#"{"type":"open","id":42}"#)
        );
        // Channel released exactly when the terminal state is observed.
        assert_eq!(bus.open_channels(), 0);
        assert_eq!(bus.subscription_count(), 0);
    }

    #[tokio::test]
    async fn run_finishes_on_terminal_and_cleans_up() {
        let mut done = processing_job(9, 100);
        done.extraction_state = ExtractionState::Done;

        let api = Arc::new(ScriptedApi::new(vec![vec![done]]));
        let bus = Arc::new(MemoryBus::new());
        let (tracker, _shutdown) = JobTracker::new(
            Arc::clone(&api) as Arc<dyn ExtractionApi>,
            Arc::clone(&bus) as Arc<dyn PushBus>,
            JobSnapshot::new(9, "02"),
        );

        let snapshot = tracker.run().await;
        assert_eq!(snapshot.extraction_state, ExtractionState::Done);
        assert_eq!(bus.open_channels(), 0);
        assert_eq!(bus.subscription_count(), 0);
    }

    #[tokio::test]
    async fn shutdown_stops_a_processing_tracker() {
        let api = Arc::new(ScriptedApi::new(vec![vec![processing_job(11, 10)]]));
        let bus = Arc::new(MemoryBus::new());
        let (tracker, shutdown) = JobTracker::new(
            Arc::clone(&api) as Arc<dyn ExtractionApi>,
            Arc::clone(&bus) as Arc<dyn PushBus>,
            JobSnapshot::new(11, "01"),
        );

        shutdown.shutdown();
        let snapshot = tracker.run().await;
        assert!(!snapshot.is_terminal());
        // Unmount leaves no open channel and no registered callback.
        assert_eq!(bus.open_channels(), 0);
        assert_eq!(bus.subscription_count(), 0);
    }

    #[tokio::test]
    async fn push_through_bus_reaches_the_tracker() {
        let api = Arc::new(ScriptedApi::new(vec![vec![processing_job(7, 10)]]));
        let bus = Arc::new(MemoryBus::new());
        let (mut tracker, _shutdown) = JobTracker::new(
            Arc::clone(&api) as Arc<dyn ExtractionApi>,
            Arc::clone(&bus) as Arc<dyn PushBus>,
            JobSnapshot::new(7, "01"),
        );

        tracker.poll_once().await.unwrap();
        bus.publish(
            "uuid-7",
            UPDATE_PROGRESS_EVENT,
            &serde_json::json!({"progress": 35, "message": "Batch 2", "step": "ai_batch_processing"}),
        );

        // The callback forwarded the payload into the tracker's event
        // channel; drain it synchronously.
        let event = tracker.events_rx.try_recv().unwrap();
        tracker.apply(&event);
        assert_eq!(tracker.snapshot().progress, 35);
        assert_eq!(tracker.snapshot().current_step, "ai_batch_processing");
    }
}
