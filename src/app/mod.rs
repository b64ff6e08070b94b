//! TUIのイベントループ、入力処理、状態管理。

mod handlers;
mod render;

use anyhow::Result;
use crossterm::event::{self, Event};
use std::{path::PathBuf, time::Duration};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    checkpoint,
    config::Config,
    events::{Screen, UiState},
    inspection::{CompletedInspection, InspectionId, PhotoRole},
    input::InputBoxState,
    pipeline::UploadStage,
    shortcuts::Shortcuts,
    ui::Tui,
    wizard::WizardState,
    worker::{self, WorkerCmd, WorkerEvent},
};

use handlers::{handle_key, is_ctrl_c};
use render::draw;

/// ワーカー処理中の操作。処理中は他の操作を受け付けない。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Busy {
    Capturing(PhotoRole),
    Uploading(PhotoRole, Option<UploadStage>),
    Submitting,
}

/// 進行中の点検セッション。
pub struct Session {
    /// ウィザード状態（チェックポイントの保存対象）。
    pub wizard: WizardState,
    /// 中断時にワーカー側の処理を止めるトークン。
    pub cancel: CancellationToken,
    /// 実行中の操作。
    pub busy: Option<Busy>,
}

impl Session {
    pub fn new(wizard: WizardState) -> Self {
        Self {
            wizard,
            cancel: CancellationToken::new(),
            busy: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.wizard.session_id
    }
}

/// 入力処理と描画で共有するアプリ状態。
pub struct App {
    /// 永続化された設定ファイルのパス。
    pub cfg_path: PathBuf,
    /// メモリ上の現在設定。
    pub cfg: Config,
    /// 画面やステータスなどUI固有の状態。
    pub ui: UiState,
    /// Workerへのコマンド送信チャネル。
    pub worker_tx: mpsc::Sender<WorkerCmd>,
    /// Workerからのイベント受信チャネル。
    pub worker_rx: mpsc::Receiver<WorkerEvent>,

    /// 進行中の点検（無ければNone）。
    pub session: Option<Session>,
    /// 起動時に見つかった再開可能なチェックポイント。
    pub resumable: Option<WizardState>,
    /// 直近に提出した点検（完了画面用）。
    pub completed: Option<(InspectionId, CompletedInspection)>,

    /// 設定画面で編集するベースURL。
    pub base_url: String,
    /// 設定画面で入力したトークン（未入力ならNone、空文字は削除）。
    pub token: Option<String>,

    /// 入力ボックスの状態（入力中はSome）。
    pub input_box: Option<InputBoxState>,

    /// ショートカットキー設定。
    pub shortcuts: Shortcuts,
}

impl App {
    pub fn new(
        cfg_path: PathBuf,
        cfg: Config,
        shortcuts: Shortcuts,
        worker_tx: mpsc::Sender<WorkerCmd>,
        worker_rx: mpsc::Receiver<WorkerEvent>,
        resumable: Option<WizardState>,
    ) -> Self {
        // バックエンド未設定なら設定画面から始める。
        let screen = if cfg.has_backend() {
            Screen::Start
        } else {
            Screen::Settings
        };
        Self {
            cfg_path,
            base_url: cfg.api.base_url.clone(),
            cfg,
            ui: UiState::new(screen),
            worker_tx,
            worker_rx,
            session: None,
            resumable,
            completed: None,
            token: None,
            input_box: None,
            shortcuts,
        }
    }

    /// 進行中セッションのウィザード状態をチェックポイントへ書く。
    pub fn persist(&mut self) {
        let Some(s) = &self.session else {
            return;
        };
        if let Err(e) = checkpoint::save(&self.cfg.checkpoint.path, &s.wizard) {
            tracing::error!("checkpoint save failed: {e:#}");
            self.ui.error = Some(format!("Checkpoint not saved: {e}"));
        }
    }

    /// イベントが現在のセッション宛てならそのセッションを返す。
    fn session_for(&mut self, session_id: Uuid) -> Option<&mut Session> {
        match self.session.as_mut() {
            Some(s) if s.id() == session_id => Some(s),
            _ => {
                tracing::debug!(%session_id, "dropping event for a closed session");
                None
            }
        }
    }
}

/// ユーザーが終了するまでメインTUIループを回す。
pub async fn run_app(terminal: &mut Tui) -> Result<()> {
    // 設定ファイルを読み込む（初回はデフォルトを生成）。
    let cfg_path = PathBuf::from("config.toml");
    let cfg = Config::load_or_default(&cfg_path)?;

    // ショートカット設定を読み込む（無ければデフォルト）。
    let shortcuts = Shortcuts::load_or_default("shortcut.toml")?;

    // 前回の途中状態があれば再開候補にする。
    let resumable = checkpoint::load(&cfg.checkpoint.path)?;

    let api = worker::connect(&cfg).await?;
    let (tx_cmd, rx_cmd) = mpsc::channel::<WorkerCmd>(64);
    let (tx_ev, rx_ev) = mpsc::channel::<WorkerEvent>(256);
    tokio::spawn(worker::run(
        rx_cmd,
        tx_ev,
        api,
        cfg.camera.clone(),
        cfg.checkpoint.capture_dir.clone(),
    ));

    let mut app = App::new(cfg_path, cfg, shortcuts, tx_cmd, rx_ev, resumable);
    if let Some(w) = &app.resumable {
        app.ui.status = format!(
            "Unfinished inspection {} at {} (press r to resume)",
            w.inspection_id(),
            w.step().title()
        );
    } else if app.ui.screen == Screen::Settings {
        app.ui.status = "Backend not configured".into();
    }

    loop {
        terminal.draw(|f| draw(f, &app))?;

        // 入力処理の前にWorkerイベントを消化する。
        while let Ok(ev) = app.worker_rx.try_recv() {
            handle_worker_event(&mut app, ev).await?;
        }

        if event::poll(Duration::from_millis(50))?
            && let Event::Key(k) = event::read()?
        {
            if is_ctrl_c(&k) {
                break;
            }
            if handle_key(&mut app, k).await? {
                break;
            }
        }
    }

    // 実行中の処理は捨てる。チェックポイントは次回起動で再開できる。
    if let Some(s) = &app.session {
        s.cancel.cancel();
    }
    Ok(())
}

/// WorkerイベントをUI状態へ反映する。
pub(crate) async fn handle_worker_event(app: &mut App, ev: WorkerEvent) -> Result<()> {
    match ev {
        WorkerEvent::Log(s) => app.ui.push_log(s),

        WorkerEvent::PhotoCaptured { session_id, photo } => {
            let Some(s) = app.session_for(session_id) else {
                return Ok(());
            };
            s.busy = None;
            let role = photo.role;
            match s.wizard.attach_photo(photo) {
                Ok(_) => {
                    app.ui.push_log(format!("{} captured", role.label()));
                    app.persist();
                    // 撮影後はそのままアップロードする。
                    handlers::start_upload(app, role).await?;
                }
                Err(e) => app.ui.error = Some(e.to_string()),
            }
        }

        WorkerEvent::CaptureCancelled { session_id, role } => {
            let Some(s) = app.session_for(session_id) else {
                return Ok(());
            };
            s.busy = None;
            app.ui.status = format!("{} capture cancelled", role.label());
        }

        WorkerEvent::CaptureFailed {
            session_id,
            role,
            error,
            fallback,
        } => {
            let Some(s) = app.session_for(session_id) else {
                return Ok(());
            };
            s.busy = None;
            app.ui.push_log(format!("camera: {error}"));
            if fallback {
                // カメラが使えなければファイル選択に切り替える。
                app.ui.status = "Camera unavailable, choose a file instead".into();
                handlers::open_photo_path(app, role);
            } else {
                app.ui.error = Some(error);
            }
        }

        WorkerEvent::Stage {
            session_id,
            role,
            stage,
        } => {
            let Some(s) = app.session_for(session_id) else {
                return Ok(());
            };
            s.busy = Some(Busy::Uploading(role, Some(stage)));
            app.ui.status = format!("{}: {stage}...", role.label());
        }

        WorkerEvent::PhotoConfirmed {
            session_id,
            role,
            upload,
        } => {
            let Some(s) = app.session_for(session_id) else {
                return Ok(());
            };
            s.busy = None;
            match s.wizard.mark_confirmed(
                role,
                upload.handle,
                upload.object_key.clone(),
                upload.record_id,
            ) {
                Ok(()) => {
                    app.ui.error = None;
                    app.ui.status = format!("{} uploaded", role.label());
                    app.ui.push_log(format!("{} -> {}", role.part(), upload.object_key));
                    app.persist();
                }
                Err(e) => {
                    // 撮り直し後に古いアップロードが届いた。
                    tracing::warn!("ignoring confirmation for {}: {e}", role.part());
                }
            }
        }

        WorkerEvent::UploadFailed {
            session_id,
            role,
            error,
            retryable,
        } => {
            let Some(s) = app.session_for(session_id) else {
                return Ok(());
            };
            s.busy = None;
            app.ui.push_log(format!("{} upload failed: {error}", role.label()));
            app.ui.error = Some(if retryable {
                format!("Upload failed: {error} (press u to retry)")
            } else {
                format!("Upload failed: {error}")
            });
        }

        WorkerEvent::UploadCancelled { session_id, role } => {
            if let Some(s) = app.session_for(session_id) {
                s.busy = None;
                app.ui.status = format!("{} upload cancelled", role.label());
            }
        }

        WorkerEvent::Completed {
            session_id,
            inspection,
        } => {
            let Some(s) = app.session_for(session_id) else {
                return Ok(());
            };
            s.busy = None;
            if let Err(e) = s.wizard.mark_submitted() {
                tracing::error!("completion arrived outside review: {e}");
            }
            let id = s.wizard.inspection_id().clone();
            app.session = None;
            if let Err(e) = checkpoint::clear(&app.cfg.checkpoint.path) {
                tracing::error!("checkpoint clear failed: {e:#}");
            }
            app.ui.push_log(format!("inspection {id} submitted"));
            app.ui.status = format!("Inspection {id} submitted");
            app.ui.error = None;
            app.completed = Some((id, inspection));
            app.ui.screen = Screen::Done;
        }

        WorkerEvent::CompletionFailed {
            session_id,
            error,
            retryable,
        } => {
            let Some(s) = app.session_for(session_id) else {
                return Ok(());
            };
            s.busy = None;
            app.ui.push_log(format!("submit failed: {error}"));
            app.ui.error = Some(if retryable {
                format!("Submit failed: {error} (press s to retry)")
            } else {
                format!("Submit failed: {error}")
            });
        }
    }
    Ok(())
}
