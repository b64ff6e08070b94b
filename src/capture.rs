//! カメラ/ファイル選択から撮影写真を取り込むアダプタ。

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use thiserror::Error;
use uuid::Uuid;

use crate::inspection::{PendingPhoto, PhotoRole};

/// 署名付きアップロードが受け付ける画像形式。
pub const SUPPORTED_IMAGE_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

/// 取り込みの結果。キャンセルはエラーではない。
#[derive(Debug)]
pub enum CaptureOutcome {
    Captured(PendingPhoto),
    Cancelled,
}

/// 取り込み時のエラー。
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("permission denied: {0} (grant access and try again)")]
    PermissionDenied(PathBuf),

    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),

    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    /// ウィザードを中断せずに再試行できるか。
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CaptureError::Io(_))
    }
}

/// 外部の撮影コマンド（例: `fswebcam -r 1280x960 --no-banner`）。
///
/// 出力先のパスは最後の引数として付け足される。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CameraCommand {
    /// 実行ファイル名。空ならカメラは無効。
    pub program: String,
    /// 出力パスの前に渡す引数。
    #[serde(default)]
    pub args: Vec<String>,
}

impl CameraCommand {
    /// カメラが設定されているか。
    pub fn is_configured(&self) -> bool {
        !self.program.trim().is_empty()
    }

    /// 撮影コマンドを実行し、書き出された画像を取り込む。
    pub async fn capture(
        &self,
        role: PhotoRole,
        out_dir: &Path,
    ) -> Result<CaptureOutcome, CaptureError> {
        if !self.is_configured() {
            return Err(CaptureError::CameraUnavailable("no camera configured".into()));
        }
        // 出力ファイル名は撮影対象と時刻から決める。
        let out = out_dir.join(format!(
            "{}_{}.jpg",
            role.part().to_lowercase(),
            Utc::now().format("%Y%m%dT%H%M%S%3f")
        ));
        tracing::info!(program = %self.program, out = %out.display(), "running camera command");

        let status = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(&out)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await;

        match status {
            Ok(s) if s.success() => match load_photo(role, &out)? {
                CaptureOutcome::Captured(photo) => {
                    rename_for_type(photo).map(CaptureOutcome::Captured)
                }
                CaptureOutcome::Cancelled => Ok(CaptureOutcome::Cancelled),
            },
            Ok(s) => {
                // 撮影アプリ側での中止は利用者のキャンセルとして扱う。
                tracing::info!("camera command exited with {s}; treating as cancel");
                Ok(CaptureOutcome::Cancelled)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(CaptureError::CameraUnavailable(
                format!("{} not found", self.program),
            )),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                Err(CaptureError::PermissionDenied(PathBuf::from(&self.program)))
            }
            Err(e) => Err(CaptureError::CameraUnavailable(e.to_string())),
        }
    }
}

/// ファイル選択で指定された画像を取り込む。空のパスはキャンセル。
pub fn load_photo(role: PhotoRole, path: &Path) -> Result<CaptureOutcome, CaptureError> {
    if path.as_os_str().is_empty() {
        return Ok(CaptureOutcome::Cancelled);
    }

    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::PermissionDenied => CaptureError::PermissionDenied(path.to_path_buf()),
        ErrorKind::NotFound => CaptureError::NotFound(path.to_path_buf()),
        _ => CaptureError::Io(e),
    })?;

    let (mime_type, (width, height)) = sniff_image(&bytes)?;
    tracing::info!(
        role = role.part(),
        mime_type,
        width,
        height,
        "photo captured from {}",
        path.display()
    );

    Ok(CaptureOutcome::Captured(PendingPhoto {
        handle: Uuid::new_v4(),
        role,
        path: path.to_path_buf(),
        mime_type: mime_type.to_string(),
        width,
        height,
        captured_at: Utc::now(),
        digest: digest(&bytes),
    }))
}

/// 実際の形式と拡張子が食い違っていれば付け替える。
fn rename_for_type(mut photo: PendingPhoto) -> Result<PendingPhoto, CaptureError> {
    let ext = match photo.mime_type.as_str() {
        "image/png" => "png",
        _ => "jpg",
    };
    if photo.path.extension().is_some_and(|e| e == ext) {
        return Ok(photo);
    }
    let renamed = photo.path.with_extension(ext);
    std::fs::rename(&photo.path, &renamed)?;
    tracing::info!(to = %renamed.display(), "renamed capture to match {}", photo.mime_type);
    photo.path = renamed;
    Ok(photo)
}

/// 画像バイト列のSHA-256をURL安全base64で返す。
pub fn digest(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(bytes))
}

/// 先頭のマジックバイトからMIMEタイプと画素寸法を判定する。
pub fn sniff_image(bytes: &[u8]) -> Result<(&'static str, (u32, u32)), CaptureError> {
    const PNG_SIG: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    if bytes.starts_with(&PNG_SIG) {
        return png_dimensions(bytes).map(|d| ("image/png", d));
    }
    if bytes.starts_with(&[0xFF, 0xD8]) {
        return jpeg_dimensions(bytes).map(|d| ("image/jpeg", d));
    }
    Err(CaptureError::UnsupportedFormat(
        "expected a JPEG or PNG image".into(),
    ))
}

/// PNGのIHDRチャンクから幅と高さを読む。
fn png_dimensions(bytes: &[u8]) -> Result<(u32, u32), CaptureError> {
    // シグネチャ(8) + 長さ(4) + "IHDR"(4) + 幅(4) + 高さ(4)。
    if bytes.len() < 24 || &bytes[12..16] != b"IHDR" {
        return Err(CaptureError::UnsupportedFormat("truncated PNG header".into()));
    }
    let width = u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
    let height = u32::from_be_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
    Ok((width, height))
}

/// JPEGのSOFセグメントを探して幅と高さを読む。
fn jpeg_dimensions(bytes: &[u8]) -> Result<(u32, u32), CaptureError> {
    let truncated = || CaptureError::UnsupportedFormat("no JPEG frame header".into());
    let be16 = |i: usize| -> Option<u32> {
        Some(u32::from(u16::from_be_bytes([*bytes.get(i)?, *bytes.get(i + 1)?])))
    };

    // SOIの直後からセグメントを順に辿る。
    let mut i = 2;
    while i < bytes.len() {
        if bytes[i] != 0xFF {
            return Err(truncated());
        }
        // 詰め物の0xFFは読み飛ばす。
        while bytes.get(i) == Some(&0xFF) {
            i += 1;
        }
        let marker = *bytes.get(i).ok_or_else(truncated)?;
        i += 1;
        match marker {
            // 長さを持たない単独マーカー。
            0x01 | 0xD0..=0xD7 => continue,
            0xD9 | 0xDA => break,
            // SOF0〜SOF15（DHT/JPG/DACは除く）。
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                let height = be16(i + 3).ok_or_else(truncated)?;
                let width = be16(i + 5).ok_or_else(truncated)?;
                return Ok((width, height));
            }
            _ => {
                let len = be16(i).ok_or_else(truncated)? as usize;
                i += len;
            }
        }
    }
    Err(truncated())
}
