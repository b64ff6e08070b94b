//! One photo through sign → raw upload → confirm.

use std::fmt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    api::{client::InspectionApi, error::ApiError, types::ConfirmReq},
    inspection::{InspectionId, PendingPhoto, PhotoRecordId},
};

/// Network stage of a photo upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadStage {
    Signing,
    Uploading,
    Confirming,
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadStage::Signing => f.write_str("signing"),
            UploadStage::Uploading => f.write_str("uploading"),
            UploadStage::Confirming => f.write_str("confirming"),
        }
    }
}

/// A photo the backend now knows about.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfirmedUpload {
    /// Local handle of the photo that was uploaded.
    pub handle: Uuid,
    /// Object key, passed on unchanged to completion.
    pub object_key: String,
    /// Record created by confirm.
    pub record_id: PhotoRecordId,
}

/// Why a photo did not make it through the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage} failed: {source}")]
    Api {
        stage: UploadStage,
        #[source]
        source: ApiError,
    },

    #[error("cancelled while {stage}")]
    Cancelled { stage: UploadStage },
}

impl PipelineError {
    /// Retrying re-runs the whole sequence with a fresh grant.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Api { source, .. } => source.is_retryable(),
            PipelineError::Cancelled { .. } => false,
        }
    }
}

/// Run `fut` unless `cancel` fires first.
async fn guarded<T>(
    cancel: &CancellationToken,
    stage: UploadStage,
    fut: impl Future<Output = Result<T, ApiError>>,
) -> Result<T, PipelineError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled { stage }),
        r = fut => r.map_err(|source| PipelineError::Api { stage, source }),
    }
}

/// Push one captured photo through the signed-upload handshake.
///
/// Every call requests a new grant; grants are never reused across attempts.
pub async fn upload_photo(
    api: &dyn InspectionApi,
    inspection_id: &InspectionId,
    photo: &PendingPhoto,
    cancel: &CancellationToken,
    mut on_stage: impl FnMut(UploadStage),
) -> Result<ConfirmedUpload, PipelineError> {
    let role = photo.role.part();

    on_stage(UploadStage::Signing);
    tracing::info!(role, inspection = %inspection_id, "requesting upload grant");
    let grant = guarded(cancel, UploadStage::Signing, api.sign(&photo.mime_type)).await?;

    on_stage(UploadStage::Uploading);
    tracing::info!(role, key = %grant.object_key, "uploading photo");
    guarded(cancel, UploadStage::Uploading, api.upload(&grant, photo)).await?;

    on_stage(UploadStage::Confirming);
    let req = ConfirmReq::for_photo(inspection_id, &grant.object_key, photo);
    let record_id = match guarded(cancel, UploadStage::Confirming, api.confirm(&req)).await {
        Ok(id) => id,
        Err(e) => {
            // The bytes are in storage but no inspection references them.
            tracing::warn!(role, key = %grant.object_key, "uploaded object left unconfirmed: {e}");
            return Err(e);
        }
    };

    Ok(ConfirmedUpload {
        handle: photo.handle,
        object_key: grant.object_key,
        record_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::mock::{Call, MockApi},
        inspection::{InspectionStatus, PhotoRole, ReadingKind},
        wizard::{WizardState, WizardStep, tests::photo},
    };
    use std::sync::Arc;

    fn inspection() -> InspectionId {
        InspectionId::parse("501").unwrap()
    }

    #[tokio::test]
    async fn test_sequence_is_sign_upload_confirm() {
        let api = MockApi::new().with_sign_keys(["abc123"]).with_record_ids([1]);
        let p = photo(PhotoRole::FuelGauge);
        let mut stages = vec![];

        let done = upload_photo(&api, &inspection(), &p, &CancellationToken::new(), |s| {
            stages.push(s)
        })
        .await
        .unwrap();

        assert_eq!(done.object_key, "abc123");
        assert_eq!(done.record_id, PhotoRecordId(1));
        assert_eq!(done.handle, p.handle);
        assert_eq!(
            stages,
            vec![
                UploadStage::Signing,
                UploadStage::Uploading,
                UploadStage::Confirming
            ]
        );
        let calls = api.calls();
        assert_eq!(calls[0], Call::Sign("image/jpeg".into()));
        assert_eq!(
            calls[1],
            Call::Upload {
                key: "abc123".into(),
                role: "FUEL_GAUGE"
            }
        );
        let Call::Confirm(req) = &calls[2] else {
            panic!("expected confirm, got {:?}", calls[2]);
        };
        assert_eq!(req.file_key, "abc123");
        assert_eq!(req.part, "FUEL_GAUGE");
        assert_eq!(req.inspection_id, inspection());
    }

    #[tokio::test]
    async fn test_upload_failure_skips_confirm() {
        let api = MockApi::new()
            .with_sign_keys(["abc123"])
            .fail_next_upload(ApiError::Transient("connection reset".into()));
        let err = upload_photo(
            &api,
            &inspection(),
            &photo(PhotoRole::FuelGauge),
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Api {
                stage: UploadStage::Uploading,
                ..
            }
        ));
        assert!(err.is_retryable());
        assert!(!api.calls().iter().any(|c| matches!(c, Call::Confirm(_))));
    }

    #[tokio::test]
    async fn test_unknown_inspection_is_not_retryable() {
        let api = MockApi::new()
            .with_sign_keys(["abc123"])
            .fail_next_confirm(ApiError::UnknownInspection("501".into()));
        let err = upload_photo(
            &api,
            &inspection(),
            &photo(PhotoRole::Odometer),
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_each_attempt_gets_a_fresh_grant() {
        let api = MockApi::new()
            .with_sign_keys(["first-key", "second-key"])
            .with_record_ids([10, 11]);
        let mut w = WizardState::new(inspection());
        let p = photo(PhotoRole::FuelGauge);
        w.attach_photo(p.clone()).unwrap();

        for _ in 0..2 {
            let done = upload_photo(&api, &inspection(), &p, &CancellationToken::new(), |_| {})
                .await
                .unwrap();
            w.mark_confirmed(PhotoRole::FuelGauge, done.handle, done.object_key, done.record_id)
                .unwrap();
        }

        let signs = api
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Sign(_)))
            .count();
        assert_eq!(signs, 2);
        // The second grant replaces the first in the wizard.
        assert_eq!(
            w.photo(PhotoRole::FuelGauge).unwrap().confirmed_key(),
            Some("second-key")
        );
    }

    #[tokio::test]
    async fn test_confirmed_key_reaches_completion_unchanged() {
        let api = MockApi::new()
            .with_sign_keys(["uploads/2025/ABC 123+x.jpg", "odo"])
            .with_record_ids([1, 2]);
        let mut w = WizardState::new(inspection());

        for (kind, value) in [(ReadingKind::FuelLevel, 30.0), (ReadingKind::Odometer, 12.0)] {
            w.set_reading(kind, value).unwrap();
            let p = photo(kind.photo_role());
            w.attach_photo(p.clone()).unwrap();
            let done = upload_photo(&api, &inspection(), &p, &CancellationToken::new(), |_| {})
                .await
                .unwrap();
            w.mark_confirmed(kind.photo_role(), done.handle, done.object_key, done.record_id)
                .unwrap();
            w.advance().unwrap();
        }
        w.select_status(InspectionStatus::Fail).unwrap();
        let req = w.completion_request().unwrap();
        api.complete(&inspection(), &req).await.unwrap();

        let sent = serde_json::to_value(&api.completions()[0]).unwrap();
        assert_eq!(sent["fuel_level_photo"], "uploads/2025/ABC 123+x.jpg");
        assert_eq!(sent["odometer_photo"], "odo");
    }

    #[tokio::test]
    async fn test_full_inspection_scenario() {
        let api = MockApi::new()
            .with_sign_keys(["abc123", "def456"])
            .with_record_ids([1, 2]);
        let id = inspection();
        let mut w = WizardState::new(id.clone());

        // Fuel step.
        w.enter_reading(ReadingKind::FuelLevel, "75").unwrap();
        let fuel = photo(PhotoRole::FuelGauge);
        w.attach_photo(fuel.clone()).unwrap();
        let done = upload_photo(&api, &id, &fuel, &CancellationToken::new(), |_| {})
            .await
            .unwrap();
        assert_eq!(done.record_id, PhotoRecordId(1));
        w.mark_confirmed(PhotoRole::FuelGauge, done.handle, done.object_key, done.record_id)
            .unwrap();
        assert_eq!(w.advance(), Ok(WizardStep::Odometer));

        // Odometer step.
        w.enter_reading(ReadingKind::Odometer, "45231").unwrap();
        let odo = photo(PhotoRole::Odometer);
        w.attach_photo(odo.clone()).unwrap();
        let done = upload_photo(&api, &id, &odo, &CancellationToken::new(), |_| {})
            .await
            .unwrap();
        assert_eq!(done.record_id, PhotoRecordId(2));
        w.mark_confirmed(PhotoRole::Odometer, done.handle, done.object_key, done.record_id)
            .unwrap();
        assert_eq!(w.advance(), Ok(WizardStep::Review));

        // Review and submit.
        w.select_status(InspectionStatus::Pass).unwrap();
        let req = w.completion_request().unwrap();
        api.complete(&id, &req).await.unwrap();
        w.mark_submitted().unwrap();

        let sent = serde_json::to_value(&api.completions()[0]).unwrap();
        assert_eq!(
            sent,
            serde_json::json!({
                "status": "PASS",
                "fuel_level": 75.0,
                "odometer_km": 45231.0,
                "fuel_level_photo": "abc123",
                "odometer_photo": "def456"
            })
        );
        assert_eq!(w.step(), WizardStep::Submitted);
    }

    #[tokio::test]
    async fn test_cancel_before_confirm_resolves() {
        let api = Arc::new(
            MockApi::new()
                .with_sign_keys(["abc123"])
                .holding_confirm(),
        );
        let id = inspection();
        let mut w = Some(WizardState::new(id.clone()));
        let fuel = photo(PhotoRole::FuelGauge);
        if let Some(w) = w.as_mut() {
            w.set_reading(ReadingKind::FuelLevel, 50.0).unwrap();
            w.attach_photo(fuel.clone()).unwrap();
        }

        let cancel = CancellationToken::new();
        let task = {
            let api = api.clone();
            let cancel = cancel.clone();
            let id = id.clone();
            tokio::spawn(async move {
                upload_photo(api.as_ref(), &id, &fuel, &cancel, |_| {}).await
            })
        };

        // The user leaves while confirm is still in flight.
        api.confirm_entered.notified().await;
        cancel.cancel();
        w = None;

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Cancelled {
                stage: UploadStage::Confirming
            }
        ));
        assert!(w.is_none());
        assert!(api.completions().is_empty());
    }
}
