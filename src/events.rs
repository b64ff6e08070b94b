//! 画面遷移用のUI状態と画面種別。

/// TUIで現在表示中の画面。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Screen {
    /// 点検IDの入力とチェックポイントからの再開。
    Start,
    /// 点検ウィザード画面。
    Inspection,
    /// 接続設定画面。
    Settings,
    /// 提出完了画面。
    Done,
}

/// 描画側と共有するUI状態。
#[derive(Clone, Debug)]
pub struct UiState {
    /// 現在の画面。
    pub screen: Screen,
    /// 右側パネルに表示するログ。
    pub log: Vec<String>,
    /// 画面下部のステータス文言。
    pub status: String,
    /// エラーメッセージ（強調表示用）。
    pub error: Option<String>,
}

impl UiState {
    /// 指定画面で初期化する。
    pub fn new(screen: Screen) -> Self {
        Self {
            screen,
            log: vec![],
            status: "Ready".into(),
            error: None,
        }
    }

    /// ログへ1行追加し、古い行は捨てる。
    pub fn push_log(&mut self, line: impl Into<String>) {
        // 表示に使うのは末尾の数行だけなので上限を設ける。
        const MAX_LOG: usize = 200;
        self.log.push(line.into());
        if self.log.len() > MAX_LOG {
            let overflow = self.log.len() - MAX_LOG;
            self.log.drain(..overflow);
        }
    }
}
