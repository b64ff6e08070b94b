//! キー入力ハンドラー関数。

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::path::Path;

use crate::{
    api::token_store::FileTokenStore,
    capture::{self, CaptureOutcome},
    checkpoint,
    events::Screen,
    inspection::{InspectionId, InspectionStatus, PhotoRole, PhotoStatus},
    input::{InputBoxState, InputCallbackId},
    shortcuts,
    wizard::WizardState,
    worker::{self, WorkerCmd},
};

use super::{App, Busy, Session};

/// キー入力を1件処理し、終了すべきならtrueを返す。
pub async fn handle_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    // 入力ボックスが開いていれば最優先で処理する。
    if app.input_box.is_some() {
        return handle_input_box_key(app, k).await;
    }

    match app.ui.screen {
        Screen::Start => handle_start_key(app, k).await,
        Screen::Inspection => handle_inspection_key(app, k).await,
        Screen::Settings => handle_settings_key(app, k).await,
        Screen::Done => handle_done_key(app, k),
    }
}

/// Ctrl+Cかどうかを判定する。
pub fn is_ctrl_c(k: &KeyEvent) -> bool {
    k.modifiers.contains(KeyModifiers::CONTROL) && k.code == KeyCode::Char('c')
}

/// 開始画面のキー処理。
async fn handle_start_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    let sc = &app.shortcuts.start;

    if shortcuts::matches_shortcut(&k, &sc.quit) {
        return Ok(true);
    } else if shortcuts::matches_shortcut(&k, &sc.settings) {
        open_settings(app);
    } else if !app.cfg.has_backend() {
        app.ui.error = Some("Backend not configured (press t)".into());
    } else if shortcuts::matches_shortcut(&k, &sc.new_inspection) {
        app.input_box = Some(InputBoxState::new(
            "Inspection ID:",
            "",
            InputCallbackId::InspectionId,
        ));
    } else if shortcuts::matches_shortcut(&k, &sc.resume) {
        match app.resumable.take() {
            Some(w) => {
                tracing::info!("resuming inspection {}", w.inspection_id());
                begin_session(app, w);
            }
            None => app.ui.status = "Nothing to resume".into(),
        }
    }

    Ok(false)
}

/// 点検ウィザード画面のキー処理。
async fn handle_inspection_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    let Some(session) = app.session.as_mut() else {
        app.ui.screen = Screen::Start;
        return Ok(false);
    };
    let sc = &app.shortcuts.inspection;

    // 中断は処理中でも受け付ける。
    if shortcuts::matches_shortcut(&k, &sc.abandon) {
        abandon_session(app);
        return Ok(false);
    }
    if let Some(busy) = session.busy {
        app.ui.status = format!("Busy: {}", busy_label(busy));
        return Ok(false);
    }

    let step = session.wizard.step();
    let role = step.photo_role();
    app.ui.error = None;

    if shortcuts::matches_shortcut(&k, &sc.reading) {
        if let Some(kind) = step.reading_kind() {
            let current = session
                .wizard
                .reading(kind)
                .map(|r| r.value.to_string())
                .unwrap_or_default();
            app.input_box = Some(InputBoxState::new(
                format!("{}:", kind.label()),
                current,
                InputCallbackId::Reading(kind),
            ));
        }
    } else if shortcuts::matches_shortcut(&k, &sc.camera) {
        if let Some(role) = role {
            if app.cfg.camera.is_configured() {
                session.busy = Some(Busy::Capturing(role));
                let session_id = session.id();
                app.ui.status = format!("Capturing {}...", role.label());
                app.worker_tx
                    .send(WorkerCmd::CaptureCamera { session_id, role })
                    .await?;
            } else {
                open_photo_path(app, role);
            }
        }
    } else if shortcuts::matches_shortcut(&k, &sc.file) {
        if let Some(role) = role {
            open_photo_path(app, role);
        }
    } else if shortcuts::matches_shortcut(&k, &sc.upload) {
        if let Some(role) = role {
            match session.wizard.photo(role).map(|s| &s.status) {
                Some(PhotoStatus::Captured) => start_upload(app, role).await?,
                Some(PhotoStatus::Confirmed { .. }) => {
                    app.ui.status = format!("{} already uploaded", role.label())
                }
                None => app.ui.error = Some(format!("No {} photo yet", role.label())),
            }
        }
    } else if shortcuts::matches_shortcut(&k, &sc.discard) {
        if let Some(role) = role {
            match session.wizard.discard_photo(role) {
                Ok(Some(_)) => {
                    app.ui.status = format!("{} photo discarded", role.label());
                    app.persist();
                }
                Ok(None) => {}
                Err(e) => app.ui.error = Some(e.to_string()),
            }
        }
    } else if shortcuts::matches_shortcut(&k, &sc.next) {
        match session.wizard.advance() {
            Ok(next) => {
                app.ui.status = format!("Step {}: {}", next.number(), next.title());
                app.persist();
            }
            Err(e) => app.ui.error = Some(e.to_string()),
        }
    } else if shortcuts::matches_shortcut(&k, &sc.back) {
        match session.wizard.back() {
            Ok(prev) => {
                app.ui.status = format!("Step {}: {}", prev.number(), prev.title());
                app.persist();
            }
            Err(e) => app.ui.error = Some(e.to_string()),
        }
    } else if shortcuts::matches_shortcut(&k, &sc.pass) {
        select_status(app, InspectionStatus::Pass);
    } else if shortcuts::matches_shortcut(&k, &sc.fail) {
        select_status(app, InspectionStatus::Fail);
    } else if shortcuts::matches_shortcut(&k, &sc.submit) {
        submit(app).await?;
    }

    Ok(false)
}

/// 設定画面のキー処理。
async fn handle_settings_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    let sc = &app.shortcuts.settings;

    if shortcuts::matches_shortcut(&k, &sc.cancel) {
        // 変更を破棄して戻る。
        app.base_url = app.cfg.api.base_url.clone();
        app.token = None;
        app.ui.screen = Screen::Start;
    } else if shortcuts::matches_shortcut(&k, &sc.save) {
        save_settings(app).await?;
    } else if shortcuts::matches_shortcut(&k, &sc.base_url) {
        app.input_box = Some(InputBoxState::new(
            "API base URL:",
            app.base_url.clone(),
            InputCallbackId::ApiBaseUrl,
        ));
    } else if shortcuts::matches_shortcut(&k, &sc.token) {
        app.input_box = Some(
            InputBoxState::new(
                "API token (empty to remove):",
                app.token.clone().unwrap_or_default(),
                InputCallbackId::ApiToken,
            )
            .masked(),
        );
    }

    Ok(false)
}

/// 完了画面のキー処理。
fn handle_done_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    let sc = &app.shortcuts.done;
    if shortcuts::matches_shortcut(&k, &sc.quit) {
        return Ok(true);
    } else if shortcuts::matches_shortcut(&k, &sc.back) {
        app.ui.screen = Screen::Start;
        app.ui.status = "Ready".into();
    }
    Ok(false)
}

/// 入力ボックスのキー処理。
async fn handle_input_box_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    let Some(input_state) = &mut app.input_box else {
        return Ok(false);
    };
    let sc = &app.shortcuts.input_box;

    if shortcuts::matches_shortcut(&k, &sc.confirm) {
        // 閉じる前に値とコールバック種別を取り出す。
        let value = input_state.value.clone();
        let callback_id = input_state.callback_id.clone();
        app.input_box = None;
        apply_input_callback(app, callback_id, value).await?;
    } else if shortcuts::matches_shortcut(&k, &sc.cancel) {
        app.input_box = None;
    } else if shortcuts::matches_shortcut(&k, &sc.backspace) {
        input_state.backspace();
    } else if shortcuts::matches_shortcut(&k, &sc.delete) {
        input_state.delete();
    } else if shortcuts::matches_shortcut(&k, &sc.left) {
        input_state.move_left();
    } else if shortcuts::matches_shortcut(&k, &sc.right) {
        input_state.move_right();
    } else if shortcuts::matches_shortcut(&k, &sc.home) {
        input_state.move_home();
    } else if shortcuts::matches_shortcut(&k, &sc.end) {
        input_state.move_end();
    } else if shortcuts::matches_shortcut(&k, &sc.clear_line) {
        input_state.clear_line();
    } else if let KeyCode::Char(c) = k.code
        && !k.modifiers.contains(KeyModifiers::CONTROL)
    {
        input_state.insert_char(c);
    }

    Ok(false)
}

/// 入力ボックスのコールバックを適用する。
async fn apply_input_callback(
    app: &mut App,
    callback_id: InputCallbackId,
    value: String,
) -> Result<()> {
    match callback_id {
        InputCallbackId::InspectionId => match InspectionId::parse(&value) {
            Some(id) => {
                tracing::info!("starting inspection {id}");
                begin_session(app, WizardState::new(id));
            }
            None => app.ui.error = Some("Inspection ID is required".into()),
        },
        InputCallbackId::Reading(kind) => {
            let Some(s) = app.session.as_mut() else {
                return Ok(());
            };
            match s.wizard.enter_reading(kind, &value) {
                Ok(()) => {
                    app.ui.status = format!("{} recorded", kind.label());
                    app.persist();
                }
                Err(e) => app.ui.error = Some(e.to_string()),
            }
        }
        InputCallbackId::PhotoPath(role) => attach_from_file(app, role, &value).await?,
        InputCallbackId::ApiBaseUrl => app.base_url = value.trim().to_string(),
        InputCallbackId::ApiToken => app.token = Some(value.trim().to_string()),
    }
    Ok(())
}

/// 新しいセッションを始めて点検画面へ移る。
fn begin_session(app: &mut App, wizard: WizardState) {
    // 前の再開候補は新しいチェックポイントで上書きされる。
    app.resumable = None;
    let step = wizard.step();
    app.session = Some(Session::new(wizard));
    app.persist();
    app.ui.screen = Screen::Inspection;
    app.ui.error = None;
    app.ui.status = format!("Step {}: {}", step.number(), step.title());
}

/// セッションを破棄する。実行中の処理は結果を反映しない。
fn abandon_session(app: &mut App) {
    if let Some(s) = app.session.take() {
        s.cancel.cancel();
        tracing::info!("inspection {} abandoned", s.wizard.inspection_id());
    }
    if let Err(e) = checkpoint::clear(&app.cfg.checkpoint.path) {
        tracing::error!("checkpoint clear failed: {e:#}");
    }
    app.ui.screen = Screen::Start;
    app.ui.error = None;
    app.ui.status = "Inspection abandoned".into();
}

/// ファイルパス入力を開く。
pub(super) fn open_photo_path(app: &mut App, role: PhotoRole) {
    app.input_box = Some(InputBoxState::new(
        format!("{} photo file (JPEG/PNG):", role.label()),
        "",
        InputCallbackId::PhotoPath(role),
    ));
}

/// 選択したファイルを写真として取り込み、アップロードを始める。
async fn attach_from_file(app: &mut App, role: PhotoRole, raw: &str) -> Result<()> {
    let Some(s) = app.session.as_mut() else {
        return Ok(());
    };
    let path = raw.trim();
    match capture::load_photo(role, Path::new(path)) {
        Ok(CaptureOutcome::Captured(photo)) => match s.wizard.attach_photo(photo) {
            Ok(_) => {
                app.persist();
                start_upload(app, role).await?;
            }
            Err(e) => app.ui.error = Some(e.to_string()),
        },
        Ok(CaptureOutcome::Cancelled) => app.ui.status = "No file selected".into(),
        Err(e) => {
            tracing::warn!("photo file rejected: {e}");
            app.ui.error = Some(e.to_string());
            // パスの打ち間違いなどはそのまま選び直せるようにする。
            if e.is_recoverable() {
                open_photo_path(app, role);
            }
        }
    }
    Ok(())
}

/// 保持中の写真をワーカーへ渡してアップロードする。
pub(super) async fn start_upload(app: &mut App, role: PhotoRole) -> Result<()> {
    let Some(s) = app.session.as_mut() else {
        return Ok(());
    };
    let Some(slot) = s.wizard.photo(role) else {
        return Ok(());
    };
    let cmd = WorkerCmd::UploadPhoto {
        session_id: s.id(),
        inspection_id: s.wizard.inspection_id().clone(),
        photo: slot.photo.clone(),
        cancel: s.cancel.clone(),
    };
    s.busy = Some(Busy::Uploading(role, None));
    app.ui.error = None;
    app.ui.status = format!("Uploading {}...", role.label());
    app.worker_tx.send(cmd).await?;
    Ok(())
}

fn select_status(app: &mut App, status: InspectionStatus) {
    let Some(s) = app.session.as_mut() else {
        return;
    };
    match s.wizard.select_status(status) {
        Ok(()) => {
            app.ui.status = format!("Result: {status}");
            app.persist();
        }
        Err(e) => app.ui.error = Some(e.to_string()),
    }
}

/// 確認画面の内容で点検を完了する。
async fn submit(app: &mut App) -> Result<()> {
    let Some(s) = app.session.as_mut() else {
        return Ok(());
    };
    let request = match s.wizard.completion_request() {
        Ok(r) => r,
        Err(e) => {
            app.ui.error = Some(e.to_string());
            return Ok(());
        }
    };
    let cmd = WorkerCmd::Complete {
        session_id: s.id(),
        inspection_id: s.wizard.inspection_id().clone(),
        request,
        cancel: s.cancel.clone(),
    };
    s.busy = Some(Busy::Submitting);
    app.ui.status = "Submitting...".into();
    app.worker_tx.send(cmd).await?;
    Ok(())
}

/// 設定画面を開き、編集バッファを現在値で埋める。
fn open_settings(app: &mut App) {
    app.base_url = app.cfg.api.base_url.clone();
    app.token = None;
    app.ui.error = None;
    app.ui.screen = Screen::Settings;
    app.ui.status = "Settings".into();
}

/// 設定を保存し、新しいクライアントをワーカーへ渡す。
async fn save_settings(app: &mut App) -> Result<()> {
    if app.base_url.is_empty() {
        app.ui.error = Some("Base URL is required".into());
        return Ok(());
    }
    app.cfg.api.base_url = app.base_url.clone();
    app.cfg.save(&app.cfg_path)?;

    let store = FileTokenStore::new(&app.cfg.auth.token_file);
    match app.token.take() {
        Some(t) if t.is_empty() => store.remove(&app.cfg.api.base_url).await?,
        Some(t) => store.set(&app.cfg.api.base_url, &t).await?,
        None => {}
    }

    let api = match worker::connect(&app.cfg).await {
        Ok(api) => api,
        Err(e) => {
            app.ui.error = Some(format!("Client not rebuilt: {e}"));
            return Ok(());
        }
    };
    app.worker_tx
        .send(WorkerCmd::SaveSettings {
            api,
            camera: app.cfg.camera.clone(),
            capture_dir: app.cfg.checkpoint.capture_dir.clone(),
        })
        .await?;
    app.ui.error = None;
    app.ui.screen = Screen::Start;
    app.ui.status = "Saved settings".into();
    Ok(())
}

pub(super) fn busy_label(busy: Busy) -> String {
    match busy {
        Busy::Capturing(role) => format!("capturing {}", role.label()),
        Busy::Uploading(role, Some(stage)) => format!("{} {stage}", role.label()),
        Busy::Uploading(role, None) => format!("{} upload queued", role.label()),
        Busy::Submitting => "submitting".into(),
    }
}
