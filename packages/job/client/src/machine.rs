//! The extraction job client state machine.
//!
//! Drives a single document through upload validation, page-thumbnail
//! selection, job submission, progress tracking, and terminal hand-off:
//!
//! ```text
//! INIT -> LOADING_PAGES -> READY_TO_EXTRACT -> SUBMITTING -> TRACKING
//!                                                 |             |
//!                                                 v             v
//!                                          READY_TO_EXTRACT  {DONE, ERROR, CANCELLED}
//! ```
//!
//! Local validation failures warn and navigate back to the dashboard;
//! transport failures revert to the prior stable state. The machine
//! never throws out of an event handler: every failure ends in a
//! notification plus a state assignment.

use std::collections::BTreeSet;
use std::sync::Arc;

use docflow_host::{
    ActionDispatcher, DialogService, Notification, Notifier, ObjectUrlStore, PushBus,
};
use docflow_job_models::{
    ExtractPagesRequest, ExtractPagesResponse, ExtractionState, Page, PdfToImagesRequest,
    QueueState, ResponseStatus,
};
use strum_macros::{AsRefStr, Display};

use crate::api::ExtractionApi;
use crate::dispatch;
use crate::file::{FileHandle, FileSelection};
use crate::tracker::{JobSnapshot, JobTracker, TrackerShutdown};

/// States of the job client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ClientState {
    /// Waiting for a file selection.
    Init,
    /// Converting the upload to page thumbnails.
    LoadingPages,
    /// Pages shown; the user is picking which to extract.
    ReadyToExtract,
    /// The extraction job is being submitted.
    Submitting,
    /// The job is running server-side.
    Tracking,
    /// The job finished and the result was handed off.
    Done,
    /// The job failed.
    Error,
    /// The job was cancelled.
    Cancelled,
}

/// The host services the machine drives.
pub struct HostServices {
    /// Notification channel.
    pub notifier: Arc<dyn Notifier>,
    /// Navigation/action dispatcher.
    pub dispatcher: Arc<dyn ActionDispatcher>,
    /// Dialog service.
    pub dialogs: Arc<dyn DialogService>,
    /// Object-URL store holding the upload.
    pub urls: Arc<dyn ObjectUrlStore>,
    /// Push bus carrying progress events.
    pub bus: Arc<dyn PushBus>,
}

/// The client-side state machine for one document.
pub struct JobClient {
    api: Arc<dyn ExtractionApi>,
    services: HostServices,
    state: ClientState,
    file: Option<FileHandle>,
    pages: Vec<Page>,
    selected: BTreeSet<i64>,
    snapshot: Option<JobSnapshot>,
}

impl JobClient {
    /// Creates a machine in `INIT`.
    #[must_use]
    pub fn new(api: Arc<dyn ExtractionApi>, services: HostServices) -> Self {
        Self {
            api,
            services,
            state: ClientState::Init,
            file: None,
            pages: Vec::new(),
            selected: BTreeSet::new(),
            snapshot: None,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ClientState {
        self.state
    }

    /// The loaded page thumbnails.
    #[must_use]
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Selected attachment ids, ascending.
    #[must_use]
    pub fn selected_ids(&self) -> Vec<i64> {
        self.selected.iter().copied().collect()
    }

    /// The tracked job's latest snapshot, once submission succeeded.
    #[must_use]
    pub const fn snapshot(&self) -> Option<&JobSnapshot> {
        self.snapshot.as_ref()
    }

    /// Entry point: validates the selection, reads the file, and loads
    /// the page thumbnails. Ends in `READY_TO_EXTRACT`, or back on the
    /// dashboard after a warning.
    pub async fn start(&mut self, selection: Option<FileSelection>) {
        let Some(selection) = selection else {
            self.services
                .notifier
                .notify(Notification::warning("No file was selected."));
            self.go_to_dashboard();
            return;
        };

        let mut file = FileHandle::new(selection);
        let encoded = match file.read(self.services.urls.as_ref()) {
            Ok(encoded) => encoded.to_owned(),
            Err(e) => {
                self.services
                    .notifier
                    .notify(Notification::warning(&e.to_string()));
                file.release(self.services.urls.as_ref());
                self.go_to_dashboard();
                return;
            }
        };
        self.file = Some(file);
        self.state = ClientState::LoadingPages;
        log::debug!("job client: loading pages");

        let response = self
            .api
            .pdf_to_images(&PdfToImagesRequest { pdf_file: encoded })
            .await;

        match response {
            Ok(response) if response.status == ResponseStatus::Success => {
                self.pages = response.pages.unwrap_or_default();
                // Every page starts selected.
                self.selected = self.pages.iter().map(|p| p.attachment_id).collect();
                self.state = ClientState::ReadyToExtract;
                log::debug!("job client: {} pages ready", self.pages.len());
            }
            Ok(response) => {
                let message = response
                    .message
                    .unwrap_or_else(|| "The PDF could not be converted.".to_owned());
                self.services.notifier.notify(Notification::danger(&message));
                self.teardown_file();
                self.go_to_dashboard();
            }
            Err(e) => {
                log::error!("pdf_to_images failed: {e}");
                self.services
                    .notifier
                    .notify(Notification::danger("The PDF could not be converted."));
                self.teardown_file();
                self.go_to_dashboard();
            }
        }
    }

    /// Toggles one page's selection while in `READY_TO_EXTRACT`.
    pub fn toggle_page(&mut self, attachment_id: i64) {
        if self.state != ClientState::ReadyToExtract {
            return;
        }
        if !self.selected.remove(&attachment_id) {
            self.selected.insert(attachment_id);
        }
    }

    /// `true` when the page is selected.
    #[must_use]
    pub fn is_selected(&self, attachment_id: i64) -> bool {
        self.selected.contains(&attachment_id)
    }

    /// Thumbnail URL for the preview modal (opened by double-click).
    /// Read-only: the preview never owns or revokes anything.
    #[must_use]
    pub fn preview_url(&self, attachment_id: i64) -> Option<&str> {
        self.pages
            .iter()
            .find(|p| p.attachment_id == attachment_id)
            .map(|p| p.url.as_str())
    }

    /// Submits the extraction job over the selected pages. Ends in
    /// `TRACKING` on success; an empty selection or a rejected
    /// submission stays in `READY_TO_EXTRACT`.
    pub async fn submit(&mut self) -> bool {
        if self.state != ClientState::ReadyToExtract {
            return false;
        }
        if self.selected.is_empty() {
            self.services.notifier.notify(Notification::warning(
                "Select at least one page to extract.",
            ));
            return false;
        }
        let Some(file) = self.file.as_ref() else {
            self.services
                .notifier
                .notify(Notification::warning("No file was selected."));
            return false;
        };

        self.state = ClientState::Submitting;
        let request = ExtractPagesRequest {
            attachment_ids: self.selected_ids(),
            document_type: file.document_type().to_owned(),
            filename: file.file_name().to_owned(),
        };

        match self.api.extract_pages(&request).await {
            Ok(ExtractPagesResponse::Success { job_id }) => {
                self.snapshot = Some(JobSnapshot::new(job_id, &request.document_type));
                self.state = ClientState::Tracking;
                log::debug!("job client: tracking job {job_id}");
                true
            }
            Ok(ExtractPagesResponse::Error { message }) => {
                self.services.notifier.notify(Notification::danger(&message));
                self.state = ClientState::ReadyToExtract;
                false
            }
            Err(e) => {
                log::error!("extract_pages failed: {e}");
                self.services.notifier.notify(Notification::danger(
                    "The extraction job could not be submitted.",
                ));
                self.state = ClientState::ReadyToExtract;
                false
            }
        }
    }

    /// Builds the tracker for the submitted job. The component spawns
    /// [`JobTracker::run`] and hands the final snapshot to
    /// [`JobClient::finish`]; the shutdown handle belongs to unmount.
    #[must_use]
    pub fn tracker(&self) -> Option<(JobTracker, TrackerShutdown)> {
        let snapshot = self.snapshot.clone()?;
        Some(JobTracker::new(
            Arc::clone(&self.api),
            Arc::clone(&self.services.bus),
            snapshot,
        ))
    }

    /// Convenience for hosts without their own task management: submits
    /// nothing, just runs the tracker to completion and applies the
    /// terminal hand-off.
    pub async fn track(&mut self) -> ClientState {
        let Some((tracker, _shutdown)) = self.tracker() else {
            return self.state;
        };
        let snapshot = tracker.run().await;
        self.finish(&snapshot);
        self.state
    }

    /// Applies the terminal outcome: open the result, surface the error,
    /// or note the cancellation. Always releases the file handle.
    pub fn finish(&mut self, snapshot: &JobSnapshot) {
        self.snapshot = Some(snapshot.clone());
        self.teardown_file();

        if snapshot.extraction_state == ExtractionState::Done {
            dispatch::open_result(
                snapshot,
                self.services.dispatcher.as_ref(),
                self.services.notifier.as_ref(),
            );
            self.state = ClientState::Done;
        } else if snapshot.extraction_state == ExtractionState::Error
            || snapshot.queue_state == QueueState::Failed
        {
            let message = if snapshot.error_message.is_empty() {
                "The extraction failed.".to_owned()
            } else {
                snapshot.error_message.clone()
            };
            self.services.notifier.notify(Notification::danger(&message));
            dispatch::open_error_dialog(snapshot, self.services.dialogs.as_ref());
            self.state = ClientState::Error;
        } else if snapshot.queue_state == QueueState::Cancelled {
            self.services
                .notifier
                .notify(Notification::warning("The extraction was cancelled."));
            self.state = ClientState::Cancelled;
        } else {
            // Shutdown before a terminal state: resources are released,
            // the state is left as-is for the host to dispose of.
            log::debug!("job client torn down before a terminal state");
        }
    }

    /// Unmount: releases the object URL if it is still held. Tracker
    /// teardown (poll timer, bus channel) is owned by the shutdown
    /// handle returned from [`JobClient::tracker`].
    pub fn teardown(&mut self) {
        self.teardown_file();
    }

    fn teardown_file(&mut self) {
        if let Some(file) = self.file.as_mut() {
            file.release(self.services.urls.as_ref());
        }
    }

    fn go_to_dashboard(&mut self) {
        self.state = ClientState::Init;
        self.services
            .dispatcher
            .do_action(dispatch::dashboard_action());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use docflow_host::{
        FileBlob, MemoryBus, MemoryObjectUrlStore, NotificationLevel,
    };
    use docflow_job_models::{
        FetchJobsPage, Job, ListJobsRequest, PdfToImagesResponse,
    };
    use serde_json::Value;

    use super::*;
    use crate::api::ApiError;
    use crate::file::PDF_MIME;

    #[derive(Default)]
    struct RecordingNotifier {
        notifications: Mutex<Vec<Notification>>,
    }

    impl RecordingNotifier {
        fn levels(&self) -> Vec<NotificationLevel> {
            self.notifications
                .lock()
                .unwrap()
                .iter()
                .map(|n| n.level)
                .collect()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notification: Notification) {
            self.notifications.lock().unwrap().push(notification);
        }
    }

    #[derive(Default)]
    struct RecordingDispatcher {
        actions: Mutex<Vec<Value>>,
    }

    impl ActionDispatcher for RecordingDispatcher {
        fn do_action(&self, action: Value) {
            self.actions.lock().unwrap().push(action);
        }
    }

    #[derive(Default)]
    struct RecordingDialogs {
        opened: Mutex<Vec<(String, i64)>>,
    }

    impl DialogService for RecordingDialogs {
        fn open_record_dialog(&self, model: &str, res_id: i64) {
            self.opened.lock().unwrap().push((model.to_owned(), res_id));
        }
    }

    /// Scripted backend capturing every request.
    #[derive(Default)]
    struct FakeApi {
        pages: Vec<Page>,
        fail_conversion: bool,
        submit_error: Option<String>,
        extract_requests: Mutex<Vec<ExtractPagesRequest>>,
        jobs: Mutex<Vec<Job>>,
    }

    #[async_trait]
    impl ExtractionApi for FakeApi {
        async fn pdf_to_images(
            &self,
            _request: &PdfToImagesRequest,
        ) -> Result<PdfToImagesResponse, ApiError> {
            if self.fail_conversion {
                return Ok(PdfToImagesResponse {
                    status: ResponseStatus::Error,
                    pages: None,
                    message: Some("conversion exploded".to_owned()),
                });
            }
            Ok(PdfToImagesResponse {
                status: ResponseStatus::Success,
                pages: Some(self.pages.clone()),
                message: None,
            })
        }

        async fn extract_pages(
            &self,
            request: &ExtractPagesRequest,
        ) -> Result<ExtractPagesResponse, ApiError> {
            self.extract_requests.lock().unwrap().push(request.clone());
            Ok(match &self.submit_error {
                Some(message) => ExtractPagesResponse::Error {
                    message: message.clone(),
                },
                None => ExtractPagesResponse::Success { job_id: 42 },
            })
        }

        async fn list_jobs(&self, _request: &ListJobsRequest) -> Result<FetchJobsPage, ApiError> {
            Ok(FetchJobsPage {
                jobs: self.jobs.lock().unwrap().clone(),
                has_more: false,
            })
        }
    }

    struct Harness {
        api: Arc<FakeApi>,
        notifier: Arc<RecordingNotifier>,
        dispatcher: Arc<RecordingDispatcher>,
        dialogs: Arc<RecordingDialogs>,
        urls: Arc<MemoryObjectUrlStore>,
        bus: Arc<MemoryBus>,
    }

    impl Harness {
        fn new(api: FakeApi) -> Self {
            Self {
                api: Arc::new(api),
                notifier: Arc::new(RecordingNotifier::default()),
                dispatcher: Arc::new(RecordingDispatcher::default()),
                dialogs: Arc::new(RecordingDialogs::default()),
                urls: Arc::new(MemoryObjectUrlStore::new()),
                bus: Arc::new(MemoryBus::new()),
            }
        }

        fn client(&self) -> JobClient {
            JobClient::new(
                Arc::clone(&self.api) as Arc<dyn ExtractionApi>,
                HostServices {
                    notifier: Arc::clone(&self.notifier) as Arc<dyn Notifier>,
                    dispatcher: Arc::clone(&self.dispatcher) as Arc<dyn ActionDispatcher>,
                    dialogs: Arc::clone(&self.dialogs) as Arc<dyn DialogService>,
                    urls: Arc::clone(&self.urls) as Arc<dyn ObjectUrlStore>,
                    bus: Arc::clone(&self.bus) as Arc<dyn PushBus>,
                },
            )
        }

        fn selection(&self) -> FileSelection {
            let mut bytes = b"%PDF-1.7\n".to_vec();
            bytes.extend_from_slice(&[0_u8; 32]);
            let url = self.urls.create(FileBlob {
                bytes,
                mime: PDF_MIME.to_owned(),
            });
            FileSelection {
                file_url: url,
                file_name: "upload.pdf".to_owned(),
                document_type: "01".to_owned(),
            }
        }
    }

    fn page(attachment_id: i64, page_num: i64) -> Page {
        Page {
            attachment_id,
            url: format!("/thumb/{attachment_id}"),
            page_num,
        }
    }

    #[tokio::test]
    async fn upload_happy_path_submits_selected_pages() {
        let harness = Harness::new(FakeApi {
            pages: vec![page(1, 1), page(2, 2)],
            ..FakeApi::default()
        });
        let mut client = harness.client();

        client.start(Some(harness.selection())).await;
        assert_eq!(client.state(), ClientState::ReadyToExtract);
        assert_eq!(client.selected_ids(), vec![1, 2]);
        // The object URL was consumed by the base64 read.
        assert_eq!(harness.urls.live_urls(), 0);

        client.toggle_page(2);
        assert!(client.submit().await);
        assert_eq!(client.state(), ClientState::Tracking);

        let requests = harness.api.extract_requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].attachment_ids, vec![1]);
        assert_eq!(requests[0].document_type, "01");
        assert_eq!(requests[0].filename, "upload.pdf");
    }

    #[tokio::test]
    async fn missing_selection_warns_and_navigates_home() {
        let harness = Harness::new(FakeApi::default());
        let mut client = harness.client();

        client.start(None).await;
        assert_eq!(client.state(), ClientState::Init);
        assert_eq!(harness.notifier.levels(), vec![NotificationLevel::Warning]);
        let actions = harness.dispatcher.actions.lock().unwrap();
        assert_eq!(actions[0]["tag"], dispatch::DASHBOARD_ACTION_TAG);
    }

    #[tokio::test]
    async fn invalid_file_warns_and_releases_url() {
        let harness = Harness::new(FakeApi::default());
        let url = harness.urls.create(FileBlob {
            bytes: b"GIF89a".to_vec(),
            mime: "image/gif".to_owned(),
        });
        let mut client = harness.client();

        client
            .start(Some(FileSelection {
                file_url: url,
                file_name: "pic.gif".to_owned(),
                document_type: "01".to_owned(),
            }))
            .await;

        assert_eq!(client.state(), ClientState::Init);
        assert_eq!(harness.notifier.levels(), vec![NotificationLevel::Warning]);
        assert_eq!(harness.urls.live_urls(), 0);
    }

    #[tokio::test]
    async fn conversion_error_notifies_and_navigates_home() {
        let harness = Harness::new(FakeApi {
            fail_conversion: true,
            ..FakeApi::default()
        });
        let mut client = harness.client();

        client.start(Some(harness.selection())).await;
        assert_eq!(client.state(), ClientState::Init);
        assert_eq!(harness.notifier.levels(), vec![NotificationLevel::Danger]);
    }

    #[tokio::test]
    async fn empty_selection_refuses_submission() {
        let harness = Harness::new(FakeApi {
            pages: vec![page(1, 1)],
            ..FakeApi::default()
        });
        let mut client = harness.client();
        client.start(Some(harness.selection())).await;

        client.toggle_page(1);
        assert!(!client.submit().await);
        assert_eq!(client.state(), ClientState::ReadyToExtract);
        assert_eq!(harness.notifier.levels(), vec![NotificationLevel::Warning]);
        assert!(harness.api.extract_requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_submission_returns_to_ready() {
        let harness = Harness::new(FakeApi {
            pages: vec![page(1, 1)],
            submit_error: Some("no credits".to_owned()),
            ..FakeApi::default()
        });
        let mut client = harness.client();
        client.start(Some(harness.selection())).await;

        assert!(!client.submit().await);
        assert_eq!(client.state(), ClientState::ReadyToExtract);
        assert_eq!(harness.notifier.levels(), vec![NotificationLevel::Danger]);
    }

    #[tokio::test]
    async fn done_job_dispatches_result_action_once() {
        let harness = Harness::new(FakeApi {
            pages: vec![page(1, 1)],
            ..FakeApi::default()
        });
        {
            let mut jobs = harness.api.jobs.lock().unwrap();
            jobs.push(Job {
                id: 42,
                uuid: "uuid-42".to_owned(),
                extraction_state: ExtractionState::Done,
                result_action_json: Some(r#"{"type":"open","id":42}"#.to_owned()),
                ..Job::default()
            });
        }
        let mut client = harness.client();
        client.start(Some(harness.selection())).await;
        assert!(client.submit().await);

        let state = client.track().await;
        assert_eq!(state, ClientState::Done);

        let actions = harness.dispatcher.actions.lock().unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0]["type"], "open");
        // P4: nothing left open after the terminal hand-off.
        assert_eq!(harness.bus.open_channels(), 0);
        assert_eq!(harness.bus.subscription_count(), 0);
    }

    #[tokio::test]
    async fn failed_job_notifies_and_opens_dialog() {
        let harness = Harness::new(FakeApi {
            pages: vec![page(1, 1)],
            ..FakeApi::default()
        });
        {
            let mut jobs = harness.api.jobs.lock().unwrap();
            jobs.push(Job {
                id: 42,
                uuid: "uuid-42".to_owned(),
                extraction_state: ExtractionState::Error,
                error_message: "model refused".to_owned(),
                ..Job::default()
            });
        }
        let mut client = harness.client();
        client.start(Some(harness.selection())).await;
        assert!(client.submit().await);

        let state = client.track().await;
        assert_eq!(state, ClientState::Error);
        let notifications = harness.notifier.notifications.lock().unwrap();
        assert!(
            notifications
                .iter()
                .any(|n| n.level == NotificationLevel::Danger && n.message == "model refused")
        );
        assert_eq!(
            harness.dialogs.opened.lock().unwrap().as_slice(),
            &[(dispatch::JOB_MODEL.to_owned(), 42)]
        );
    }

    #[tokio::test]
    async fn cancelled_job_warns() {
        let harness = Harness::new(FakeApi {
            pages: vec![page(1, 1)],
            ..FakeApi::default()
        });
        {
            let mut jobs = harness.api.jobs.lock().unwrap();
            jobs.push(Job {
                id: 42,
                uuid: "uuid-42".to_owned(),
                queue_state: QueueState::Cancelled,
                ..Job::default()
            });
        }
        let mut client = harness.client();
        client.start(Some(harness.selection())).await;
        assert!(client.submit().await);

        let state = client.track().await;
        assert_eq!(state, ClientState::Cancelled);
        assert!(
            harness
                .notifier
                .levels()
                .contains(&NotificationLevel::Warning)
        );
    }

    #[tokio::test]
    async fn preview_uses_page_url_not_base64() {
        let harness = Harness::new(FakeApi {
            pages: vec![page(1, 1), page(2, 2)],
            ..FakeApi::default()
        });
        let mut client = harness.client();
        client.start(Some(harness.selection())).await;

        assert_eq!(client.preview_url(2), Some("/thumb/2"));
        assert_eq!(client.preview_url(9), None);
    }

    #[tokio::test]
    async fn teardown_is_safe_after_read() {
        let harness = Harness::new(FakeApi {
            pages: vec![page(1, 1)],
            ..FakeApi::default()
        });
        let mut client = harness.client();
        client.start(Some(harness.selection())).await;

        // The URL was already revoked by the read; teardown must not
        // revoke again (single-shot revoke is asserted by the store).
        client.teardown();
        assert_eq!(harness.urls.live_urls(), 0);
    }
}
