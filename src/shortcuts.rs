//! ショートカット設定の管理。

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// ショートカット設定の全体。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shortcuts {
    pub start: StartShortcuts,
    pub inspection: InspectionShortcuts,
    pub settings: SettingsShortcuts,
    pub done: DoneShortcuts,
    pub input_box: InputBoxShortcuts,
}

/// 開始画面のショートカット。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartShortcuts {
    pub new_inspection: Vec<String>,
    pub resume: Vec<String>,
    pub settings: Vec<String>,
    pub quit: Vec<String>,
}

/// 点検ウィザード画面のショートカット。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectionShortcuts {
    pub reading: Vec<String>,
    pub camera: Vec<String>,
    pub file: Vec<String>,
    pub upload: Vec<String>,
    pub discard: Vec<String>,
    pub next: Vec<String>,
    pub back: Vec<String>,
    pub pass: Vec<String>,
    pub fail: Vec<String>,
    pub submit: Vec<String>,
    pub abandon: Vec<String>,
}

/// 設定画面のショートカット。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsShortcuts {
    pub base_url: Vec<String>,
    pub token: Vec<String>,
    pub save: Vec<String>,
    pub cancel: Vec<String>,
}

/// 提出完了画面のショートカット。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoneShortcuts {
    pub back: Vec<String>,
    pub quit: Vec<String>,
}

/// InputBoxのショートカット。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputBoxShortcuts {
    pub confirm: Vec<String>,
    pub cancel: Vec<String>,
    pub backspace: Vec<String>,
    pub delete: Vec<String>,
    pub left: Vec<String>,
    pub right: Vec<String>,
    pub home: Vec<String>,
    pub end: Vec<String>,
    pub clear_line: Vec<String>,
}

impl Shortcuts {
    /// TOMLから読み込み、無ければデフォルトを返す。
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

fn keys(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for Shortcuts {
    fn default() -> Self {
        Self {
            start: StartShortcuts {
                new_inspection: keys(&["n"]),
                resume: keys(&["r"]),
                settings: keys(&["t"]),
                quit: keys(&["q"]),
            },
            inspection: InspectionShortcuts {
                reading: keys(&["e"]),
                camera: keys(&["c"]),
                file: keys(&["o"]),
                upload: keys(&["u"]),
                discard: keys(&["d"]),
                next: keys(&["Enter", "Right"]),
                back: keys(&["b", "Left"]),
                pass: keys(&["p"]),
                fail: keys(&["f"]),
                submit: keys(&["s"]),
                abandon: keys(&["Esc"]),
            },
            settings: SettingsShortcuts {
                base_url: keys(&["u"]),
                token: keys(&["k"]),
                save: keys(&["Enter"]),
                cancel: keys(&["Esc"]),
            },
            done: DoneShortcuts {
                back: keys(&["Enter", "Esc"]),
                quit: keys(&["q"]),
            },
            // URLやトークンを打つので文字キーは割り当てない。
            input_box: InputBoxShortcuts {
                confirm: keys(&["Enter"]),
                cancel: keys(&["Esc"]),
                backspace: keys(&["Backspace"]),
                delete: keys(&["Delete"]),
                left: keys(&["Left"]),
                right: keys(&["Right"]),
                home: keys(&["Home", "Ctrl+a"]),
                end: keys(&["End", "Ctrl+e"]),
                clear_line: keys(&["Ctrl+u"]),
            },
        }
    }
}

/// KeyEventがいずれかのショートカット文字列と一致するか判定する。
pub fn matches_shortcut(key: &KeyEvent, shortcuts: &[String]) -> bool {
    shortcuts.iter().any(|s| matches_single_shortcut(key, s))
}

/// KeyEventが単一のショートカット文字列と一致するか判定する。
fn matches_single_shortcut(key: &KeyEvent, shortcut: &str) -> bool {
    // ショートカット文字列を分解する（例: "Ctrl+u", "a", "Enter"）。
    let parts: Vec<&str> = shortcut.split('+').collect();

    let (modifiers_str, key_str) = if parts.len() > 1 {
        // 修飾キー付きの形式（例: "Ctrl+u"）。
        (&parts[0..parts.len() - 1], parts[parts.len() - 1])
    } else {
        // 修飾キーなしの形式（例: "a", "Enter"）。
        (&[][..], parts[0])
    };

    // 修飾キーを解析して期待値を作る。
    let mut expected_modifiers = KeyModifiers::empty();
    for modifier in modifiers_str {
        match *modifier {
            "Ctrl" | "ctrl" => expected_modifiers |= KeyModifiers::CONTROL,
            "Alt" | "alt" => expected_modifiers |= KeyModifiers::ALT,
            "Shift" | "shift" => expected_modifiers |= KeyModifiers::SHIFT,
            _ => return false,
        }
    }

    // 修飾キーが一致しなければ即座に不一致とする。
    if key.modifiers != expected_modifiers {
        return false;
    }

    // キーコードの種別ごとに一致判定を行う。
    match key_str {
        "Enter" | "enter" => key.code == KeyCode::Enter,
        "Esc" | "esc" => key.code == KeyCode::Esc,
        "Tab" | "tab" => key.code == KeyCode::Tab,
        "Backspace" | "backspace" => key.code == KeyCode::Backspace,
        "Delete" | "delete" => key.code == KeyCode::Delete,
        "Up" | "up" => key.code == KeyCode::Up,
        "Down" | "down" => key.code == KeyCode::Down,
        "Left" | "left" => key.code == KeyCode::Left,
        "Right" | "right" => key.code == KeyCode::Right,
        "Home" | "home" => key.code == KeyCode::Home,
        "End" | "end" => key.code == KeyCode::End,
        // 単一文字は Char として比較する。
        s if s.len() == 1 => {
            if let Some(c) = s.chars().next() {
                key.code == KeyCode::Char(c)
            } else {
                false
            }
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_shortcut_simple_char() {
        // 単一文字の一致判定を検証する。
        let key = KeyEvent::new(KeyCode::Char('q'), KeyModifiers::empty());
        assert!(matches_shortcut(&key, &[String::from("q")]));
        assert!(!matches_shortcut(&key, &[String::from("w")]));
    }

    #[test]
    fn test_matches_shortcut_special_key() {
        // 特殊キーの一致判定を検証する。
        let key = KeyEvent::new(KeyCode::Enter, KeyModifiers::empty());
        assert!(matches_shortcut(&key, &[String::from("Enter")]));
        assert!(!matches_shortcut(&key, &[String::from("Esc")]));
    }

    #[test]
    fn test_matches_shortcut_with_modifier() {
        // 修飾キー付きの一致判定を検証する。
        let key = KeyEvent::new(KeyCode::Char('u'), KeyModifiers::CONTROL);
        assert!(matches_shortcut(&key, &[String::from("Ctrl+u")]));
        assert!(!matches_shortcut(&key, &[String::from("u")]));
    }

    #[test]
    fn test_matches_shortcut_arrow_keys() {
        // 矢印キーの一致判定を検証する。
        let key = KeyEvent::new(KeyCode::Up, KeyModifiers::empty());
        assert!(matches_shortcut(&key, &[String::from("Up")]));
        assert!(!matches_shortcut(&key, &[String::from("Down")]));
    }

    #[test]
    fn test_matches_shortcut_multiple_keys() {
        // 複数キーバインドの一致判定を検証する。
        let s = Shortcuts::default();
        let enter = KeyEvent::new(KeyCode::Enter, KeyModifiers::empty());
        let right = KeyEvent::new(KeyCode::Right, KeyModifiers::empty());
        assert!(matches_shortcut(&enter, &s.inspection.next));
        assert!(matches_shortcut(&right, &s.inspection.next));

        let b = KeyEvent::new(KeyCode::Char('b'), KeyModifiers::empty());
        assert!(!matches_shortcut(&b, &s.inspection.next));
        assert!(matches_shortcut(&b, &s.inspection.back));
    }

    #[test]
    fn test_input_box_leaves_letters_for_text() {
        // 入力欄では文字キーがショートカットに取られない。
        let s = Shortcuts::default().input_box;
        let all = [
            s.confirm, s.cancel, s.backspace, s.delete, s.left, s.right, s.home, s.end,
            s.clear_line,
        ];
        for c in ['h', 'l', 'u', 'a', 'e'] {
            let key = KeyEvent::new(KeyCode::Char(c), KeyModifiers::empty());
            assert!(all.iter().all(|k| !matches_shortcut(&key, k)), "{c}");
        }
    }

    #[test]
    fn test_load_overrides_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shortcuts.toml");
        let mut s = Shortcuts::default();
        s.start.quit = vec!["x".into()];
        std::fs::write(&path, toml::to_string_pretty(&s).unwrap()).unwrap();

        let loaded = Shortcuts::load_or_default(&path).unwrap();
        assert_eq!(loaded.start.quit, vec!["x".to_string()]);
        assert_eq!(loaded.inspection.submit, vec!["s".to_string()]);
    }
}
