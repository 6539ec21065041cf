//! Terminal-outcome and click dispatch.
//!
//! Thin adapter between job outcomes and the host's navigation services.
//! The `result_action_json` payload is opaque to the client: it is parsed
//! lazily at dispatch time, never at reception, so a malformed payload
//! surfaces as a notification instead of corrupting tracker state.

use docflow_host::{ActionDispatcher, DialogService, Notification, Notifier};
use docflow_job_models::ExtractionState;
use serde_json::{Value, json};

use crate::tracker::JobSnapshot;

/// Model of the server-side job record, for the error detail dialog.
pub const JOB_MODEL: &str = "docflow.extraction.job";

/// Client-action tag of the extraction dashboard.
pub const DASHBOARD_ACTION_TAG: &str = "docflow.extraction_dashboard";

/// Client-action tag of the page selector.
pub const PAGE_SELECTOR_ACTION_TAG: &str = "docflow.page_selector";

/// Navigation descriptor that opens the extraction dashboard.
#[must_use]
pub fn dashboard_action() -> Value {
    json!({
        "type": "client_action",
        "tag": DASHBOARD_ACTION_TAG,
    })
}

/// Navigation descriptor that reopens the page selector in progress-only
/// mode for a job that is still processing.
#[must_use]
pub fn reopen_selector_action(snapshot: &JobSnapshot) -> Value {
    json!({
        "type": "client_action",
        "tag": PAGE_SELECTOR_ACTION_TAG,
        "params": {
            "job_id": snapshot.job_id,
            "document_type": snapshot.document_type,
            "merged_pdf_url": snapshot.merged_pdf_url,
            "retry_from_step": snapshot.current_step,
            "progress": snapshot.display_progress(),
        },
    })
}

/// Parses the job's result action and dispatches it. Returns `false`
/// (after a danger notification) when the payload is missing or
/// malformed; the caller stays on the current view.
pub fn open_result(
    snapshot: &JobSnapshot,
    dispatcher: &dyn ActionDispatcher,
    notifier: &dyn Notifier,
) -> bool {
    let Some(raw) = snapshot.result_action_json.as_deref() else {
        notifier.notify(Notification::danger(
            "The extraction finished but returned no result to open.",
        ));
        return false;
    };

    match serde_json::from_str::<Value>(raw) {
        Ok(action) => {
            dispatcher.do_action(action);
            true
        }
        Err(e) => {
            log::error!("malformed result action for job {}: {e}", snapshot.job_id);
            notifier.notify(Notification::danger(
                "The extraction result could not be opened.",
            ));
            false
        }
    }
}

/// Opens the job's record in a new dialog so the user can requeue, mark
/// done, or cancel.
pub fn open_error_dialog(snapshot: &JobSnapshot, dialogs: &dyn DialogService) {
    dialogs.open_record_dialog(JOB_MODEL, snapshot.job_id);
}

/// Dashboard row click: route by the job's current state.
pub fn handle_job_click(
    snapshot: &JobSnapshot,
    dispatcher: &dyn ActionDispatcher,
    dialogs: &dyn DialogService,
    notifier: &dyn Notifier,
) {
    match snapshot.extraction_state {
        ExtractionState::Done => {
            open_result(snapshot, dispatcher, notifier);
        }
        ExtractionState::Error => open_error_dialog(snapshot, dialogs),
        ExtractionState::Pending | ExtractionState::Processing => {
            dispatcher.do_action(reopen_selector_action(snapshot));
        }
    }
}
