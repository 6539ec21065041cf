//! Backend endpoint client.
//!
//! The backend exposes three JSON-in/JSON-out one-shot endpoints: convert
//! a PDF to page thumbnails, submit an extraction job, and list the
//! caller's jobs (paginated). [`ExtractionApi`] is the seam the rest of
//! the client depends on; [`HttpExtractionApi`] is the `reqwest`-backed
//! implementation.

use async_trait::async_trait;
use docflow_job_models::{
    ExtractPagesRequest, ExtractPagesResponse, FetchJobsPage, Job, ListJobsRequest,
    PdfToImagesRequest, PdfToImagesResponse,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Relative path of the thumbnail endpoint.
const PDF_TO_IMAGES_PATH: &str = "pdf_to_images";

/// Relative path of the submission endpoint.
const EXTRACT_PAGES_PATH: &str = "extract_pages";

/// Relative path of the job list endpoint.
const LIST_JOBS_PATH: &str = "get_my_extraction_jobs";

/// Errors that can occur while talking to the backend.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The server answered with a non-success status code.
    #[error("server returned status {status} for {path}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Endpoint path that failed.
        path: String,
    },
}

/// The three backend endpoints the extraction client calls.
#[async_trait]
pub trait ExtractionApi: Send + Sync {
    /// Converts a base64-encoded PDF into page thumbnails.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails at the transport level.
    /// Server-side conversion failures come back as a response with
    /// `status == "error"`.
    async fn pdf_to_images(
        &self,
        request: &PdfToImagesRequest,
    ) -> Result<PdfToImagesResponse, ApiError>;

    /// Submits an extraction job over the selected pages.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails at the transport level.
    async fn extract_pages(
        &self,
        request: &ExtractPagesRequest,
    ) -> Result<ExtractPagesResponse, ApiError>;

    /// Lists the caller's extraction jobs, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails at the transport level.
    async fn list_jobs(&self, request: &ListJobsRequest) -> Result<FetchJobsPage, ApiError>;
}

/// `reqwest`-backed [`ExtractionApi`].
#[derive(Debug, Clone)]
pub struct HttpExtractionApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpExtractionApi {
    /// Creates a client against the given base URL (e.g.
    /// `https://erp.example.com/docflow`).
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Creates a client reusing an existing `reqwest::Client`.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    /// POSTs a JSON body and parses a JSON response.
    async fn post<Req: Serialize + Sync, Resp: DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, ApiError> {
        let url = format!("{}/{path}", self.base_url);
        let response = self.client.post(&url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                path: path.to_owned(),
            });
        }

        Ok(response.json::<Resp>().await?)
    }
}

#[async_trait]
impl ExtractionApi for HttpExtractionApi {
    async fn pdf_to_images(
        &self,
        request: &PdfToImagesRequest,
    ) -> Result<PdfToImagesResponse, ApiError> {
        self.post(PDF_TO_IMAGES_PATH, request).await
    }

    async fn extract_pages(
        &self,
        request: &ExtractPagesRequest,
    ) -> Result<ExtractPagesResponse, ApiError> {
        self.post(EXTRACT_PAGES_PATH, request).await
    }

    async fn list_jobs(&self, request: &ListJobsRequest) -> Result<FetchJobsPage, ApiError> {
        self.post(LIST_JOBS_PATH, request).await
    }
}

/// Walks the list endpoint until `has_more` is `false` and returns every
/// job. Dashboards use this for the full history view.
///
/// # Errors
///
/// Returns [`ApiError`] if any page fetch fails.
pub async fn list_all_jobs(
    api: &dyn ExtractionApi,
    page_size: i64,
) -> Result<Vec<Job>, ApiError> {
    let mut jobs = Vec::new();
    let mut offset = 0;

    loop {
        let page = api
            .list_jobs(&ListJobsRequest {
                offset,
                limit: page_size,
            })
            .await?;
        let fetched = i64::try_from(page.jobs.len()).unwrap_or(0);
        jobs.extend(page.jobs);
        if !page.has_more || fetched == 0 {
            break;
        }
        offset += fetched;
    }

    Ok(jobs)
}
