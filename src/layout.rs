//! レイアウト計算のヘルパー関数

use ratatui::prelude::*;

/// 画面全体の領域（ヘッダ + 本体 + HELP + STATUS）
pub struct MainLayout {
    /// 点検IDと進捗を出すヘッダ
    pub header: Rect,
    /// 本体
    pub body: Rect,
    /// HELPバーの領域
    pub help_bar: Rect,
    /// STATUSバーの領域
    pub status_bar: Rect,
}

/// 本体の2つの領域（ステップ表示 + ログ）
pub struct BodyLayout {
    /// 現在ステップの入力内容
    pub step_panel: Rect,
    /// ワーカーログ
    pub log_panel: Rect,
}

/// 画面を縦に4分割する。
pub fn create_main_layout(area: Rect) -> MainLayout {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // ヘッダ
            Constraint::Min(1),    // 本体
            Constraint::Length(3), // HELPバー
            Constraint::Length(3), // STATUSバー
        ])
        .split(area);

    MainLayout {
        header: chunks[0],
        body: chunks[1],
        help_bar: chunks[2],
        status_bar: chunks[3],
    }
}

/// 本体を左右に分割（ステップ60% + ログ40%）。狭い端末では縦に積む。
pub fn create_body_layout(area: Rect) -> BodyLayout {
    let direction = if area.width < 80 {
        Direction::Vertical
    } else {
        Direction::Horizontal
    };
    let chunks = Layout::default()
        .direction(direction)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    BodyLayout {
        step_panel: chunks[0],
        log_panel: chunks[1],
    }
}
