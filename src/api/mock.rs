//! Recording `InspectionApi` used by tests.

use async_trait::async_trait;
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};
use tokio::sync::Notify;

use super::{
    client::InspectionApi,
    error::ApiError,
    types::{ConfirmReq, UploadGrant},
};
use crate::inspection::{
    BackendId, CompletedInspection, CompletionRequest, InspectionId, PendingPhoto, PhotoRecordId,
};

/// One observed call, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Sign(String),
    Upload { key: String, role: &'static str },
    Confirm(ConfirmReq),
    Complete(InspectionId, CompletionRequest),
}

/// Scripted responses plus a call log.
#[derive(Default)]
pub struct MockApi {
    sign_keys: Mutex<VecDeque<String>>,
    record_ids: Mutex<VecDeque<i64>>,
    upload_errors: Mutex<VecDeque<ApiError>>,
    confirm_errors: Mutex<VecDeque<ApiError>>,
    calls: Mutex<Vec<Call>>,
    hold_confirm: bool,
    /// Signalled when a held confirm call has started.
    pub confirm_entered: Arc<Notify>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys handed out by successive `sign` calls.
    pub fn with_sign_keys<I: IntoIterator<Item = &'static str>>(self, keys: I) -> Self {
        *self.sign_keys.lock().unwrap() = keys.into_iter().map(String::from).collect();
        self
    }

    /// Record ids handed out by successive `confirm` calls.
    pub fn with_record_ids<I: IntoIterator<Item = i64>>(self, ids: I) -> Self {
        *self.record_ids.lock().unwrap() = ids.into_iter().collect();
        self
    }

    /// Make the next upload fail.
    pub fn fail_next_upload(self, err: ApiError) -> Self {
        self.upload_errors.lock().unwrap().push_back(err);
        self
    }

    /// Make the next confirm fail.
    pub fn fail_next_confirm(self, err: ApiError) -> Self {
        self.confirm_errors.lock().unwrap().push_back(err);
        self
    }

    /// Confirm never resolves; only cancellation gets the caller out.
    pub fn holding_confirm(mut self) -> Self {
        self.hold_confirm = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn completions(&self) -> Vec<CompletionRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Complete(_, req) => Some(req),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl InspectionApi for MockApi {
    async fn sign(&self, content_type: &str) -> Result<UploadGrant, ApiError> {
        self.record(Call::Sign(content_type.to_string()));
        let key = self
            .sign_keys
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ApiError::Transient("no scripted sign response".into()))?;
        Ok(UploadGrant {
            target_url: "https://bucket.example.com/".into(),
            form_fields: [("key".to_string(), key.clone())].into_iter().collect(),
            object_key: key,
        })
    }

    async fn upload(&self, grant: &UploadGrant, photo: &PendingPhoto) -> Result<(), ApiError> {
        self.record(Call::Upload {
            key: grant.object_key.clone(),
            role: photo.role.part(),
        });
        match self.upload_errors.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn confirm(&self, req: &ConfirmReq) -> Result<PhotoRecordId, ApiError> {
        self.record(Call::Confirm(req.clone()));
        if self.hold_confirm {
            self.confirm_entered.notify_one();
            std::future::pending::<()>().await;
        }
        if let Some(err) = self.confirm_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        let id = self.record_ids.lock().unwrap().pop_front().unwrap_or(1);
        Ok(PhotoRecordId(id))
    }

    async fn complete(
        &self,
        inspection_id: &InspectionId,
        req: &CompletionRequest,
    ) -> Result<CompletedInspection, ApiError> {
        self.record(Call::Complete(inspection_id.clone(), req.clone()));
        Ok(CompletedInspection {
            id: Some(BackendId::Text(inspection_id.to_string())),
            status: Some(req.status.to_string()),
        })
    }
}
