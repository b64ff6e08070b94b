//! Fleet backend client: sign, raw upload, confirm, complete.

use async_trait::async_trait;
use reqwest::{
    Client, RequestBuilder, StatusCode,
    header::{AUTHORIZATION, HeaderValue},
    multipart::{Form, Part},
};
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::{
    error::{ApiError, classify_status},
    types::{ConfirmReq, ConfirmResp, SignReq, SignResp, UploadGrant, ensure_supported_image},
};
use crate::{
    capture,
    inspection::{
        CompletedInspection, CompletionRequest, InspectionId, PendingPhoto, PhotoRecordId,
    },
};

/// The four calls of the capture pipeline.
///
/// Constructed once at startup and handed to the worker, so tests can swap in
/// a recording implementation.
#[async_trait]
pub trait InspectionApi: Send + Sync {
    /// Request a fresh pre-signed upload target for `content_type`.
    async fn sign(&self, content_type: &str) -> Result<UploadGrant, ApiError>;

    /// Transfer the photo bytes straight to object storage.
    async fn upload(&self, grant: &UploadGrant, photo: &PendingPhoto) -> Result<(), ApiError>;

    /// Attach an uploaded object to an inspection.
    async fn confirm(&self, req: &ConfirmReq) -> Result<PhotoRecordId, ApiError>;

    /// Close the inspection with its final status and readings.
    async fn complete(
        &self,
        inspection_id: &InspectionId,
        req: &CompletionRequest,
    ) -> Result<CompletedInspection, ApiError>;
}

/// reqwest-backed implementation talking to the fleet REST API.
pub struct HttpInspectionApi {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpInspectionApi {
    /// Build a client for `base_url`. A missing token is reported per call.
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http = Client::builder()
            .user_agent(concat!("inspection_tui/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// `Authorization: Token <value>`, or fail before touching the network.
    fn auth_header(&self) -> Result<HeaderValue, ApiError> {
        let token = self.token.as_deref().ok_or(ApiError::MissingToken)?;
        HeaderValue::from_str(&format!("Token {}", token.trim()))
            .map_err(|_| ApiError::MissingToken)
    }

    /// POST a JSON body to the backend and decode the JSON reply.
    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, ApiError>
    where
        B: serde::Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let auth = self.auth_header()?;
        let req = self.http.post(self.url(path)).header(AUTHORIZATION, auth).json(body);
        let resp = send(req).await?;
        resp.json::<R>()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))
    }
}

#[async_trait]
impl InspectionApi for HttpInspectionApi {
    async fn sign(&self, content_type: &str) -> Result<UploadGrant, ApiError> {
        ensure_supported_image(content_type)?;
        let resp: SignResp = self
            .post_json("uploads/sign", &SignReq { content_type })
            .await?;
        let grant = UploadGrant::try_from(resp)?;
        tracing::info!(key = %grant.object_key, "upload grant issued");
        Ok(grant)
    }

    async fn upload(&self, grant: &UploadGrant, photo: &PendingPhoto) -> Result<(), ApiError> {
        let bytes = tokio::fs::read(&photo.path).await?;
        let size = bytes.len();
        // A later capture may have overwritten the file since it was checkpointed.
        if capture::digest(&bytes) != photo.digest {
            tracing::warn!(path = %photo.path.display(), "photo digest mismatch");
            return Err(ApiError::PhotoChanged(photo.path.clone()));
        }

        // The signed fields go first; storage rejects a policy after the file.
        let mut form = Form::new();
        for (name, value) in &grant.form_fields {
            form = form.text(name.clone(), value.clone());
        }
        let file_part = Part::bytes(bytes)
            .file_name(photo.file_name())
            .mime_str(&photo.mime_type)
            .map_err(|e| ApiError::UnsupportedContentType(e.to_string()))?;
        form = form.part("file", file_part);

        // Direct to object storage: the grant is the credential, no API token.
        let req = self.http.post(&grant.target_url).multipart(form);
        send(req).await?;
        tracing::info!(key = %grant.object_key, size, "raw upload finished");
        Ok(())
    }

    async fn confirm(&self, req: &ConfirmReq) -> Result<PhotoRecordId, ApiError> {
        let resp: ConfirmResp = self
            .post_json("uploads/confirm", req)
            .await
            .map_err(|e| match e {
                ApiError::Rejected { status, .. } if status == StatusCode::NOT_FOUND => {
                    ApiError::UnknownInspection(req.inspection_id.to_string())
                }
                other => other,
            })?;
        tracing::info!(key = %req.file_key, record = %resp.id, "upload confirmed");
        Ok(resp.id)
    }

    async fn complete(
        &self,
        inspection_id: &InspectionId,
        req: &CompletionRequest,
    ) -> Result<CompletedInspection, ApiError> {
        let path = format!(
            "inspections/inspections/{}/complete/",
            urlencoding::encode(inspection_id.as_str())
        );
        let auth = self.auth_header()?;
        let resp = send(
            self.http
                .post(self.url(&path))
                .header(AUTHORIZATION, auth)
                .json(req),
        )
        .await
        .map_err(|e| match e {
            ApiError::Rejected { status, .. } if status == StatusCode::NOT_FOUND => {
                ApiError::UnknownInspection(inspection_id.to_string())
            }
            other => other,
        })?;
        // Any 2xx closes the inspection; the body is informational only.
        let done = match resp.bytes().await {
            Ok(body) => decode_completion(&body),
            Err(e) => {
                tracing::warn!(inspection = %inspection_id, "completion body unreadable: {e}");
                CompletedInspection::default()
            }
        };
        tracing::info!(inspection = %inspection_id, status = %req.status, "inspection completed");
        Ok(done)
    }
}

/// Best-effort decode of a completion reply; empty or unexpected bodies yield defaults.
fn decode_completion(body: &[u8]) -> CompletedInspection {
    if body.iter().all(u8::is_ascii_whitespace) {
        return CompletedInspection::default();
    }
    serde_json::from_slice(body).unwrap_or_else(|e| {
        tracing::warn!("unexpected completion body: {e}");
        CompletedInspection::default()
    })
}

/// Send a request and convert non-2xx responses into a structured error.
async fn send(req: RequestBuilder) -> Result<reqwest::Response, ApiError> {
    let resp = req.send().await?;
    ensure_success(resp).await
}

/// Convert non-2xx responses into a structured error.
async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_else(|_| "".into());
    tracing::warn!("HTTP status {status}: {body}");
    Err(classify_status(status, body))
}
