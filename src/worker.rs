//! Background worker handling camera and backend calls.

use anyhow::Result;
use std::{path::PathBuf, sync::Arc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    api::{
        client::{HttpInspectionApi, InspectionApi},
        token_store::FileTokenStore,
    },
    capture::{CameraCommand, CaptureError, CaptureOutcome},
    config::Config,
    inspection::{CompletedInspection, CompletionRequest, InspectionId, PendingPhoto, PhotoRole},
    pipeline::{self, ConfirmedUpload, PipelineError, UploadStage},
};

/// Commands sent from the UI to the worker.
pub enum WorkerCmd {
    /// Swap in a client and camera built from updated settings.
    SaveSettings {
        api: Arc<dyn InspectionApi>,
        camera: CameraCommand,
        capture_dir: PathBuf,
    },
    /// Run the configured camera program for `role`.
    CaptureCamera { session_id: Uuid, role: PhotoRole },
    /// Sign, upload, and confirm one photo.
    UploadPhoto {
        session_id: Uuid,
        inspection_id: InspectionId,
        photo: PendingPhoto,
        cancel: CancellationToken,
    },
    /// Submit the final status and readings.
    Complete {
        session_id: Uuid,
        inspection_id: InspectionId,
        request: CompletionRequest,
        cancel: CancellationToken,
    },
}

/// Events emitted by the worker for UI updates.
#[derive(Clone, Debug)]
pub enum WorkerEvent {
    /// Camera produced a photo.
    PhotoCaptured { session_id: Uuid, photo: PendingPhoto },
    /// Camera program was closed without a picture.
    CaptureCancelled { session_id: Uuid, role: PhotoRole },
    /// Camera failed; `fallback` asks the UI to open the file picker.
    CaptureFailed {
        session_id: Uuid,
        role: PhotoRole,
        error: String,
        fallback: bool,
    },
    /// Upload progress.
    Stage {
        session_id: Uuid,
        role: PhotoRole,
        stage: UploadStage,
    },
    /// Photo is uploaded and attached to the inspection.
    PhotoConfirmed {
        session_id: Uuid,
        role: PhotoRole,
        upload: ConfirmedUpload,
    },
    /// Upload did not finish; the photo stays in memory for a retry.
    UploadFailed {
        session_id: Uuid,
        role: PhotoRole,
        error: String,
        retryable: bool,
    },
    /// Upload abandoned along with its session.
    UploadCancelled { session_id: Uuid, role: PhotoRole },
    /// Inspection closed on the backend.
    Completed {
        session_id: Uuid,
        inspection: CompletedInspection,
    },
    /// Completion failed; nothing was rolled back.
    CompletionFailed {
        session_id: Uuid,
        error: String,
        retryable: bool,
    },
    /// Informational log message.
    Log(String),
}

/// Build the backend client from settings and the stored token.
pub async fn connect(cfg: &Config) -> Result<Arc<dyn InspectionApi>> {
    let store = FileTokenStore::new(&cfg.auth.token_file);
    let token = store.get(&cfg.api.base_url).await?;
    if token.is_none() {
        tracing::warn!("no API token stored for {}", cfg.api.base_url);
    }
    let api = HttpInspectionApi::new(&cfg.api.base_url, token, cfg.api.timeout())?;
    Ok(Arc::new(api))
}

/// Main worker loop: handle commands sequentially.
pub async fn run(
    mut rx: mpsc::Receiver<WorkerCmd>,
    tx: mpsc::Sender<WorkerEvent>,
    mut api: Arc<dyn InspectionApi>,
    mut camera: CameraCommand,
    mut capture_dir: PathBuf,
) {
    tracing::info!("worker started");

    // One command at a time: photos are never uploaded concurrently.
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WorkerCmd::SaveSettings {
                api: new_api,
                camera: new_camera,
                capture_dir: new_dir,
            } => {
                tracing::info!("settings updated");
                api = new_api;
                camera = new_camera;
                capture_dir = new_dir;
                let _ = tx.send(WorkerEvent::Log("settings updated".into())).await;
            }

            WorkerCmd::CaptureCamera { session_id, role } => {
                let ev = capture_with_camera(&camera, &capture_dir, session_id, role).await;
                let _ = tx.send(ev).await;
            }

            WorkerCmd::UploadPhoto {
                session_id,
                inspection_id,
                photo,
                cancel,
            } => {
                let role = photo.role;
                tracing::info!("upload start: {} for {}", role.part(), inspection_id);

                // Stage updates go out without blocking the pipeline.
                let stage_tx = tx.clone();
                let r = pipeline::upload_photo(api.as_ref(), &inspection_id, &photo, &cancel, |stage| {
                    let _ = stage_tx.try_send(WorkerEvent::Stage {
                        session_id,
                        role,
                        stage,
                    });
                })
                .await;

                let ev = match r {
                    Ok(upload) => {
                        tracing::info!("upload done: {} -> {}", role.part(), upload.object_key);
                        WorkerEvent::PhotoConfirmed {
                            session_id,
                            role,
                            upload,
                        }
                    }
                    Err(PipelineError::Cancelled { stage }) => {
                        tracing::warn!("upload cancelled while {stage}: {}", role.part());
                        WorkerEvent::UploadCancelled { session_id, role }
                    }
                    Err(e) => {
                        tracing::error!("upload failed: {}: {e}", role.part());
                        WorkerEvent::UploadFailed {
                            session_id,
                            role,
                            retryable: e.is_retryable(),
                            error: e.to_string(),
                        }
                    }
                };
                let _ = tx.send(ev).await;
            }

            WorkerCmd::Complete {
                session_id,
                inspection_id,
                request,
                cancel,
            } => {
                tracing::info!("complete start: {inspection_id}");
                let r = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::warn!("completion abandoned: {inspection_id}");
                        continue;
                    }
                    r = api.complete(&inspection_id, &request) => r,
                };
                let ev = match r {
                    Ok(inspection) => {
                        tracing::info!("complete done: {inspection_id}");
                        WorkerEvent::Completed {
                            session_id,
                            inspection,
                        }
                    }
                    Err(e) => {
                        tracing::error!("complete failed: {inspection_id}: {e}");
                        WorkerEvent::CompletionFailed {
                            session_id,
                            retryable: e.is_retryable(),
                            error: e.to_string(),
                        }
                    }
                };
                let _ = tx.send(ev).await;
            }
        }
    }
    tracing::info!("worker stopped");
}

/// Run the camera program and translate the outcome into a UI event.
async fn capture_with_camera(
    camera: &CameraCommand,
    capture_dir: &std::path::Path,
    session_id: Uuid,
    role: PhotoRole,
) -> WorkerEvent {
    // Without a writable directory the camera has nowhere to put the image.
    if let Err(e) = tokio::fs::create_dir_all(capture_dir).await {
        tracing::error!("capture dir unavailable: {}: {e}", capture_dir.display());
        return WorkerEvent::CaptureFailed {
            session_id,
            role,
            error: format!("capture directory {} unavailable: {e}", capture_dir.display()),
            fallback: true,
        };
    }
    match camera.capture(role, capture_dir).await {
        Ok(CaptureOutcome::Captured(photo)) => WorkerEvent::PhotoCaptured { session_id, photo },
        Ok(CaptureOutcome::Cancelled) => WorkerEvent::CaptureCancelled { session_id, role },
        Err(e) => {
            tracing::warn!("camera capture failed: {e}");
            WorkerEvent::CaptureFailed {
                session_id,
                role,
                fallback: matches!(e, CaptureError::CameraUnavailable(_)),
                error: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{api::mock::MockApi, wizard::tests::photo};

    fn spawn_worker(
        api: Arc<MockApi>,
    ) -> (mpsc::Sender<WorkerCmd>, mpsc::Receiver<WorkerEvent>) {
        let (tx_cmd, rx_cmd) = mpsc::channel(8);
        let (tx_ev, rx_ev) = mpsc::channel(32);
        tokio::spawn(run(
            rx_cmd,
            tx_ev,
            api,
            CameraCommand::default(),
            std::env::temp_dir(),
        ));
        (tx_cmd, rx_ev)
    }

    #[tokio::test]
    async fn test_upload_reports_stages_then_confirmation() {
        let api = Arc::new(MockApi::new().with_sign_keys(["abc123"]).with_record_ids([1]));
        let (tx, mut rx) = spawn_worker(api.clone());
        let session_id = Uuid::new_v4();
        let p = photo(PhotoRole::FuelGauge);

        tx.send(WorkerCmd::UploadPhoto {
            session_id,
            inspection_id: InspectionId::parse("3").unwrap(),
            photo: p.clone(),
            cancel: CancellationToken::new(),
        })
        .await
        .unwrap();

        let mut stages = vec![];
        loop {
            match rx.recv().await.unwrap() {
                WorkerEvent::Stage { stage, .. } => stages.push(stage),
                WorkerEvent::PhotoConfirmed {
                    session_id: sid,
                    role,
                    upload,
                } => {
                    assert_eq!(sid, session_id);
                    assert_eq!(role, PhotoRole::FuelGauge);
                    assert_eq!(upload.object_key, "abc123");
                    assert_eq!(upload.handle, p.handle);
                    break;
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert_eq!(stages.len(), 3);
    }

    #[tokio::test]
    async fn test_abandoned_session_never_completes() {
        let api = Arc::new(MockApi::new().with_sign_keys(["abc123"]).holding_confirm());
        let (tx, mut rx) = spawn_worker(api.clone());
        let session_id = Uuid::new_v4();
        let cancel = CancellationToken::new();

        tx.send(WorkerCmd::UploadPhoto {
            session_id,
            inspection_id: InspectionId::parse("3").unwrap(),
            photo: photo(PhotoRole::FuelGauge),
            cancel: cancel.clone(),
        })
        .await
        .unwrap();

        api.confirm_entered.notified().await;
        cancel.cancel();

        loop {
            match rx.recv().await.unwrap() {
                WorkerEvent::Stage { .. } => continue,
                WorkerEvent::UploadCancelled { session_id: sid, .. } => {
                    assert_eq!(sid, session_id);
                    break;
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }

        // A completion queued for the abandoned session is dropped as well.
        tx.send(WorkerCmd::Complete {
            session_id,
            inspection_id: InspectionId::parse("3").unwrap(),
            request: CompletionRequest {
                status: crate::inspection::InspectionStatus::Pass,
                fuel_level: 1.0,
                odometer_km: 1.0,
                fuel_level_photo: None,
                odometer_photo: None,
            },
            cancel: cancel.clone(),
        })
        .await
        .unwrap();
        drop(tx);
        assert!(rx.recv().await.is_none());
        assert!(api.completions().is_empty());
    }

    #[tokio::test]
    async fn test_missing_camera_asks_for_file_picker() {
        let api = Arc::new(MockApi::new());
        let (tx, mut rx) = spawn_worker(api);
        let session_id = Uuid::new_v4();
        tx.send(WorkerCmd::CaptureCamera {
            session_id,
            role: PhotoRole::Odometer,
        })
        .await
        .unwrap();

        match rx.recv().await.unwrap() {
            WorkerEvent::CaptureFailed { fallback, role, .. } => {
                assert!(fallback);
                assert_eq!(role, PhotoRole::Odometer);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unusable_capture_dir_falls_back_without_running_camera() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        let marker = tmp.path().join("camera-ran");
        let camera = CameraCommand {
            program: "sh".into(),
            args: vec!["-c".into(), format!("touch '{}'", marker.display())],
        };
        let session_id = Uuid::new_v4();

        let dir = blocker.join("sub");
        let ev = capture_with_camera(&camera, &dir, session_id, PhotoRole::FuelGauge).await;
        match ev {
            WorkerEvent::CaptureFailed {
                session_id: sid,
                fallback,
                error,
                ..
            } => {
                assert_eq!(sid, session_id);
                assert!(fallback);
                assert!(error.contains("capture directory"), "{error}");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(!marker.exists());
    }
}
