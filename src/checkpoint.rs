//! 進行中ウィザードのチェックポイント保存と復元。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, io::ErrorKind, path::Path};

use crate::wizard::{WizardState, WizardStep};

/// ファイル形式のバージョン。
const FORMAT_VERSION: u32 = 1;

/// ディスク上の形式。
#[derive(Debug, Serialize, Deserialize)]
struct Checkpoint {
    version: u32,
    saved_at: chrono::DateTime<chrono::Utc>,
    wizard: WizardState,
}

/// ウィザード状態を一時ファイル経由で書き出す。
pub fn save(path: &Path, wizard: &WizardState) -> Result<()> {
    // 親ディレクトリが無ければ作る。
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let cp = Checkpoint {
        version: FORMAT_VERSION,
        saved_at: chrono::Utc::now(),
        wizard: wizard.clone(),
    };
    let data = serde_json::to_vec_pretty(&cp)?;
    // 途中で落ちても壊れたファイルが残らないよう、書き込み後にrenameする。
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, data).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("rename to {}", path.display()))?;
    tracing::debug!(step = ?wizard.step(), "checkpoint saved to {}", path.display());
    Ok(())
}

/// 再開できるウィザード状態を読み込む。無い・読めない場合はNone。
pub fn load(path: &Path) -> Result<Option<WizardState>> {
    let data = match fs::read(path) {
        Ok(d) => d,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let cp: Checkpoint = match serde_json::from_slice(&data) {
        Ok(cp) => cp,
        Err(e) => {
            // 壊れたチェックポイントで起動を止めない。
            tracing::warn!("ignoring unreadable checkpoint {}: {e}", path.display());
            return Ok(None);
        }
    };
    if cp.version != FORMAT_VERSION {
        tracing::warn!("ignoring checkpoint version {}", cp.version);
        return Ok(None);
    }
    // 提出済みの状態は再開対象にしない。
    if cp.wizard.step() == WizardStep::Submitted {
        return Ok(None);
    }
    tracing::info!(
        inspection = %cp.wizard.inspection_id(),
        saved_at = %cp.saved_at,
        "checkpoint found"
    );
    Ok(Some(cp.wizard))
}

/// チェックポイントを削除する。
pub fn clear(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
