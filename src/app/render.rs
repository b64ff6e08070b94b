//! TUI描画関連の関数。

use ratatui::{
    Frame,
    prelude::*,
    widgets::{Block, Borders, Gauge, Paragraph, Wrap},
};

use crate::{
    events::Screen,
    inspection::{PhotoRole, PhotoStatus, ReadingKind},
    input, layout,
    shortcuts::Shortcuts,
    wizard::{TOTAL_STEPS, WizardState, WizardStep},
};

use super::{App, handlers::busy_label};

/// 画面全体のレイアウトを描画する。
pub fn draw(f: &mut Frame, app: &App) {
    let main_layout = layout::create_main_layout(f.area());
    let body_layout = layout::create_body_layout(main_layout.body);

    draw_header(f, app, main_layout.header);

    let (title, text) = match app.ui.screen {
        Screen::Start => ("START", build_start_text(app)),
        Screen::Inspection => match &app.session {
            Some(s) => (s.wizard.step().title(), build_step_text(&s.wizard)),
            None => ("INSPECTION", "No inspection in progress".to_string()),
        },
        Screen::Settings => ("SETTINGS", build_settings_text(app)),
        Screen::Done => ("DONE", build_done_text(app)),
    };
    let step_panel = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: false });
    f.render_widget(step_panel, body_layout.step_panel);

    // ログは新しいものを下に、パネルに収まる分だけ出す。
    let visible = body_layout.log_panel.height.saturating_sub(2) as usize;
    let skip = app.ui.log.len().saturating_sub(visible);
    let log_panel = Paragraph::new(app.ui.log[skip..].join("\n"))
        .block(Block::default().borders(Borders::ALL).title("LOG"))
        .wrap(Wrap { trim: true });
    f.render_widget(log_panel, body_layout.log_panel);

    let help_bar = Paragraph::new(get_help_text(app))
        .block(Block::default().borders(Borders::ALL).title("HELP"))
        .wrap(Wrap { trim: true });
    f.render_widget(help_bar, main_layout.help_bar);

    f.render_widget(build_status_bar(app), main_layout.status_bar);

    // 入力ボックスが開いていれば重ねて描画する。
    if let Some(input_state) = &app.input_box {
        input::render_input_box(f, input_state);
    }
}

/// ヘッダ：点検中は進捗ゲージ、それ以外はタイトル。
fn draw_header(f: &mut Frame, app: &App, area: Rect) {
    let Some(s) = app.session.as_ref().filter(|_| app.ui.screen == Screen::Inspection) else {
        let title = Paragraph::new("Vehicle inspection capture")
            .block(Block::default().borders(Borders::ALL))
            .style(Style::default().add_modifier(Modifier::BOLD));
        f.render_widget(title, area);
        return;
    };

    let step = s.wizard.step();
    let label = match s.busy {
        Some(b) => format!(
            "Inspection {} | Step {}/{} {} | {}",
            s.wizard.inspection_id(),
            step.number(),
            TOTAL_STEPS,
            step.title(),
            busy_label(b)
        ),
        None => format!(
            "Inspection {} | Step {}/{} {}",
            s.wizard.inspection_id(),
            step.number(),
            TOTAL_STEPS,
            step.title()
        ),
    };
    let color = if s.busy.is_some() {
        Color::Yellow
    } else {
        Color::Rgb(255, 140, 0)
    };
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL))
        .gauge_style(Style::default().fg(color).bg(Color::Black))
        .ratio(step.number() as f64 / TOTAL_STEPS as f64)
        .label(label);
    f.render_widget(gauge, area);
}

fn build_start_text(app: &App) -> String {
    let mut lines = vec![
        format!("Backend: {}", display_or_dash(&app.cfg.api.base_url)),
        format!(
            "Camera: {}",
            if app.cfg.camera.is_configured() {
                app.cfg.camera.program.as_str()
            } else {
                "none (file picker)"
            }
        ),
        String::new(),
    ];
    match &app.resumable {
        Some(w) => {
            lines.push(format!("Unfinished inspection: {}", w.inspection_id()));
            lines.push(format!("  stopped at: {}", w.step().title()));
        }
        None => lines.push("No unfinished inspection.".into()),
    }
    lines.join("\n")
}

/// 現在ステップの入力内容を組み立てる。
fn build_step_text(w: &WizardState) -> String {
    match w.step() {
        WizardStep::Fuel | WizardStep::Odometer => {
            let mut lines = vec![];
            if let Some(kind) = w.step().reading_kind() {
                lines.push(reading_line(w, kind));
            }
            if let Some(role) = w.step().photo_role() {
                lines.push(photo_line(w, role));
            }
            let missing = w.missing_requirements();
            if !missing.is_empty() {
                lines.push(String::new());
                lines.push("Still needed:".into());
                lines.extend(missing.into_iter().map(|m| format!("  - {m}")));
            }
            lines.join("\n")
        }
        WizardStep::Review => {
            let mut lines = vec!["Review before submitting:".to_string(), String::new()];
            for role in PhotoRole::REQUIRED {
                if let Some(kind) = [ReadingKind::FuelLevel, ReadingKind::Odometer]
                    .into_iter()
                    .find(|k| k.photo_role() == role)
                {
                    lines.push(reading_line(w, kind));
                }
                lines.push(photo_line(w, role));
            }
            lines.push(String::new());
            lines.push(format!(
                "Result: {}",
                w.final_status()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "not selected".into())
            ));
            lines.join("\n")
        }
        WizardStep::Submitted => "Submitted.".into(),
    }
}

fn reading_line(w: &WizardState, kind: ReadingKind) -> String {
    match w.reading(kind) {
        Some(r) => format!("{}: {}", kind.label(), r.value),
        None => format!("{}: -", kind.label()),
    }
}

fn photo_line(w: &WizardState, role: PhotoRole) -> String {
    let state = match w.photo(role) {
        None => "not taken".to_string(),
        Some(slot) => match &slot.status {
            PhotoStatus::Captured => format!(
                "{} ({}x{}) not uploaded",
                slot.photo.file_name(),
                slot.photo.width,
                slot.photo.height
            ),
            PhotoStatus::Confirmed { object_key, .. } => format!("uploaded as {object_key}"),
        },
    };
    format!("{} photo: {state}", role.label())
}

fn build_settings_text(app: &App) -> String {
    let token = match &app.token {
        None => "(unchanged)",
        Some(t) if t.is_empty() => "(remove)",
        Some(_) => "(new token entered)",
    };
    format!(
        "Base URL: {}\nToken: {}\nToken file: {}\nTimeout: {}s\n\nCheckpoint: {}\nCaptures: {}",
        display_or_dash(&app.base_url),
        token,
        app.cfg.auth.token_file.display(),
        app.cfg.api.timeout_secs,
        app.cfg.checkpoint.path.display(),
        app.cfg.checkpoint.capture_dir.display(),
    )
}

fn build_done_text(app: &App) -> String {
    match &app.completed {
        Some((id, done)) => format!(
            "Inspection {id} submitted.\n\nBackend record: {}\nStatus: {}",
            done.id.as_ref().map_or_else(|| id.to_string(), ToString::to_string),
            done.status.as_deref().unwrap_or("-")
        ),
        None => "Nothing submitted yet.".into(),
    }
}

/// ステータスバーを構築する。
fn build_status_bar(app: &App) -> Paragraph<'static> {
    let screen_name = match app.ui.screen {
        Screen::Start => "Start",
        Screen::Inspection => "Inspection",
        Screen::Settings => "Settings",
        Screen::Done => "Done",
    };

    let status_text = match &app.ui.error {
        Some(err) => format!("[{screen_name}] ERROR: {err}"),
        None => format!("[{screen_name}] {}", app.ui.status),
    };

    let mut status_bar = Paragraph::new(status_text)
        .block(Block::default().borders(Borders::ALL).title("STATUS"))
        .wrap(Wrap { trim: true });
    if app.ui.error.is_some() {
        status_bar = status_bar.style(Style::default().fg(Color::Red));
    }
    status_bar
}

/// 現在画面に応じたヘルプ文字列を返す。
fn get_help_text(app: &App) -> String {
    let sc: &Shortcuts = &app.shortcuts;
    match app.ui.screen {
        Screen::Start => format!(
            "{}: new inspection | {}: resume | {}: settings | {}: quit",
            format_keys(&sc.start.new_inspection),
            format_keys(&sc.start.resume),
            format_keys(&sc.start.settings),
            format_keys(&sc.start.quit)
        ),
        Screen::Inspection => {
            let step = app.session.as_ref().map(|s| s.wizard.step());
            let i = &sc.inspection;
            match step {
                Some(WizardStep::Review) => format!(
                    "{}: pass | {}: fail | {}: submit | {}: back | {}: abandon",
                    format_keys(&i.pass),
                    format_keys(&i.fail),
                    format_keys(&i.submit),
                    format_keys(&i.back),
                    format_keys(&i.abandon)
                ),
                _ => format!(
                    "{}: reading | {}: camera | {}: file | {}: upload/retry | {}: discard | {}: next | {}: back | {}: abandon",
                    format_keys(&i.reading),
                    format_keys(&i.camera),
                    format_keys(&i.file),
                    format_keys(&i.upload),
                    format_keys(&i.discard),
                    format_keys(&i.next),
                    format_keys(&i.back),
                    format_keys(&i.abandon)
                ),
            }
        }
        Screen::Settings => format!(
            "{}: base url | {}: token | {}: save | {}: cancel",
            format_keys(&sc.settings.base_url),
            format_keys(&sc.settings.token),
            format_keys(&sc.settings.save),
            format_keys(&sc.settings.cancel)
        ),
        Screen::Done => format!(
            "{}: back to start | {}: quit",
            format_keys(&sc.done.back),
            format_keys(&sc.done.quit)
        ),
    }
}

/// ショートカットキーの配列を表示用文字列に変換する。
fn format_keys(keys: &[String]) -> String {
    keys.join("/")
}

fn display_or_dash(s: &str) -> &str {
    if s.is_empty() { "-" } else { s }
}
