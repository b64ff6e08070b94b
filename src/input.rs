//! TUI内での文字列入力コンポーネント（InputBox）。

use ratatui::{
    layout::Alignment,
    prelude::*,
    widgets::{Block, Borders, Clear, Paragraph},
};

use crate::inspection::{PhotoRole, ReadingKind};

/// InputBox入力状態
#[derive(Clone, Debug)]
pub struct InputBoxState {
    /// プロンプトメッセージ
    pub prompt: String,
    /// 現在の入力値
    pub value: String,
    /// カーソル位置（文字単位）
    pub cursor: usize,
    /// 入力値を伏せ字で表示するか
    pub masked: bool,
    /// 入力完了時のコールバック識別子
    pub callback_id: InputCallbackId,
}

/// 入力完了時のコールバック識別子
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputCallbackId {
    // Start画面用
    InspectionId,

    // Inspection画面用
    Reading(ReadingKind),
    PhotoPath(PhotoRole),

    // Settings画面用
    ApiBaseUrl,
    ApiToken,
}

impl InputBoxState {
    /// 初期値の末尾にカーソルを置いて作る。
    pub fn new(prompt: impl Into<String>, value: impl Into<String>, callback_id: InputCallbackId) -> Self {
        let value = value.into();
        Self {
            prompt: prompt.into(),
            cursor: value.chars().count(),
            value,
            masked: false,
            callback_id,
        }
    }

    /// 伏せ字表示にする（トークン入力用）。
    pub fn masked(mut self) -> Self {
        self.masked = true;
        self
    }

    /// 文字位置をバイト位置へ変換する。
    fn byte_index(&self, char_pos: usize) -> usize {
        self.value
            .char_indices()
            .nth(char_pos)
            .map(|(i, _)| i)
            .unwrap_or(self.value.len())
    }

    /// 文字を挿入
    pub fn insert_char(&mut self, c: char) {
        let at = self.byte_index(self.cursor);
        self.value.insert(at, c);
        self.cursor += 1;
    }

    /// Backspace（カーソル前の文字を削除）
    pub fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        let at = self.byte_index(self.cursor);
        self.value.remove(at);
    }

    /// Delete（カーソル位置の文字を削除）
    pub fn delete(&mut self) {
        if self.cursor < self.value.chars().count() {
            let at = self.byte_index(self.cursor);
            self.value.remove(at);
        }
    }

    /// カーソルを左に移動
    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    /// カーソルを右に移動
    pub fn move_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.value.chars().count());
    }

    /// カーソルを先頭に移動
    pub fn move_home(&mut self) {
        self.cursor = 0;
    }

    /// カーソルを末尾に移動
    pub fn move_end(&mut self) {
        self.cursor = self.value.chars().count();
    }

    /// 行全体をクリア
    pub fn clear_line(&mut self) {
        self.value.clear();
        self.cursor = 0;
    }

    /// 画面に出す文字列（伏せ字を反映）。
    fn display_value(&self) -> String {
        if self.masked {
            "*".repeat(self.value.chars().count())
        } else {
            self.value.clone()
        }
    }
}

/// InputBoxをポップアップとして描画
pub fn render_input_box(f: &mut Frame, state: &InputBoxState) {
    // 中央に配置されたポップアップ領域を計算する。
    let popup_area = centered_popup(f.area(), 70, 7);
    f.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .title("Input")
        .style(Style::default().bg(Color::DarkGray));
    f.render_widget(block, popup_area);

    // プロンプト + 入力欄 + 空行 + ヘルプ。
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(popup_area);

    let prompt_widget = Paragraph::new(state.prompt.clone()).style(
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    );
    f.render_widget(prompt_widget, rows[0]);

    // カーソルが見える位置まで横スクロールする。
    let width = (rows[1].width as usize).saturating_sub(1).max(1);
    let offset = (state.cursor + 1).saturating_sub(width);
    let visible = with_cursor(&state.display_value(), state.cursor, offset, width);
    let input_widget = Paragraph::new(visible).style(Style::default().fg(Color::Green));
    f.render_widget(input_widget, rows[1]);

    let help = Paragraph::new("Enter=確定 | ESC=キャンセル | Ctrl+U=クリア")
        .style(Style::default().fg(Color::Gray))
        .alignment(Alignment::Center);
    f.render_widget(help, rows[3]);
}

/// 表示範囲を切り出し、カーソル位置に`|`を差し込む。
fn with_cursor(text: &str, cursor: usize, offset: usize, width: usize) -> String {
    let mut out: String = text.chars().skip(offset).take(cursor - offset).collect();
    out.push('|');
    out.extend(text.chars().skip(cursor).take(width.saturating_sub(cursor - offset)));
    out
}

/// 中央配置のポップアップ領域を計算
fn centered_popup(area: Rect, width_percent: u16, height: u16) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length((area.height.saturating_sub(height)) / 2),
            Constraint::Length(height),
            Constraint::Min(0),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - width_percent) / 2),
            Constraint::Percentage(width_percent),
            Constraint::Percentage((100 - width_percent) / 2),
        ])
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_editing_multibyte_text() {
        // 全角文字を含む入力でもカーソル位置で編集できる。
        let mut s = InputBoxState::new("p", "燃料", InputCallbackId::InspectionId);
        assert_eq!(s.cursor, 2);
        s.move_left();
        s.insert_char('x');
        assert_eq!(s.value, "燃x料");
        s.backspace();
        assert_eq!(s.value, "燃料");
        s.move_home();
        s.delete();
        assert_eq!(s.value, "料");
        s.move_end();
        s.move_right();
        assert_eq!(s.cursor, 1);
    }

    #[test]
    fn test_masked_display() {
        let s = InputBoxState::new("Token:", "secret", InputCallbackId::ApiToken).masked();
        assert_eq!(s.display_value(), "******");
        assert_eq!(s.value, "secret");
    }

    #[test]
    fn test_cursor_marker_scrolls_with_cursor() {
        assert_eq!(with_cursor("75", 2, 0, 10), "75|");
        assert_eq!(with_cursor("45231", 0, 0, 10), "|45231");
        assert_eq!(with_cursor("abcdef", 6, 3, 3), "def|");
    }
}
