//! 点検レコード・読み取り値・撮影写真のモデル。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};
use uuid::Uuid;

use crate::wizard::WizardError;

/// シフト開始時にバックエンドが払い出す点検ID。
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InspectionId(String);

impl InspectionId {
    /// 前後の空白を除いた値でIDを作る。空ならNone。
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// 生の文字列表現。
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InspectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 写真の撮影対象（confirm時の `part`）。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhotoRole {
    /// 燃料計。
    FuelGauge,
    /// オドメーター。
    Odometer,
}

impl PhotoRole {
    /// 必須の撮影対象一覧（ウィザードの順序どおり）。
    pub const REQUIRED: [PhotoRole; 2] = [PhotoRole::FuelGauge, PhotoRole::Odometer];

    /// confirm APIへ送る `part` の値。
    pub fn part(self) -> &'static str {
        match self {
            PhotoRole::FuelGauge => "FUEL_GAUGE",
            PhotoRole::Odometer => "ODOMETER",
        }
    }

    /// confirm APIへ送る `angle` の値。どちらもダッシュボード正面から撮る。
    pub fn angle(self) -> &'static str {
        "DASHBOARD"
    }

    /// 撮影ガイド用の表示名。
    pub fn label(self) -> &'static str {
        match self {
            PhotoRole::FuelGauge => "Fuel gauge",
            PhotoRole::Odometer => "Odometer",
        }
    }
}

/// 数値読み取りの種類。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReadingKind {
    /// 燃料残量（%）。
    FuelLevel,
    /// 走行距離（km）。
    Odometer,
}

impl ReadingKind {
    /// この読み取り値の裏付けとなる写真の種類。
    pub fn photo_role(self) -> PhotoRole {
        match self {
            ReadingKind::FuelLevel => PhotoRole::FuelGauge,
            ReadingKind::Odometer => PhotoRole::Odometer,
        }
    }

    /// 入力プロンプト用の表示名。
    pub fn label(self) -> &'static str {
        match self {
            ReadingKind::FuelLevel => "Fuel level (0-100 %)",
            ReadingKind::Odometer => "Odometer (km)",
        }
    }

    /// 値が有効範囲に収まっているか検証する。
    pub fn validate(self, value: f64) -> Result<(), WizardError> {
        // NaNや無限大はどの種類でも受け付けない。
        if !value.is_finite() {
            return Err(WizardError::OutOfRange { kind: self, value });
        }
        let ok = match self {
            ReadingKind::FuelLevel => (0.0..=100.0).contains(&value),
            ReadingKind::Odometer => value >= 0.0,
        };
        if ok {
            Ok(())
        } else {
            Err(WizardError::OutOfRange { kind: self, value })
        }
    }
}

/// 検証済みの読み取り値。
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReadingEntry {
    /// 読み取りの種類。
    pub kind: ReadingKind,
    /// 数値。
    pub value: f64,
}

impl ReadingEntry {
    /// 範囲検証を通った場合のみ値を作る。
    pub fn new(kind: ReadingKind, value: f64) -> Result<Self, WizardError> {
        kind.validate(value)?;
        Ok(Self { kind, value })
    }

    /// 入力ボックスの文字列を数値として解釈し検証する。
    pub fn parse(kind: ReadingKind, raw: &str) -> Result<Self, WizardError> {
        let value = raw
            .trim()
            .parse::<f64>()
            .map_err(|_| WizardError::NotANumber {
                kind,
                raw: raw.to_string(),
            })?;
        Self::new(kind, value)
    }
}

/// 撮影済みでまだ確定していない写真。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingPhoto {
    /// ローカル参照（リテイク判定に使う）。
    pub handle: Uuid,
    /// 撮影対象。
    pub role: PhotoRole,
    /// 画像ファイルの場所。
    pub path: PathBuf,
    /// 判定したMIMEタイプ。
    pub mime_type: String,
    /// 画素幅。
    pub width: u32,
    /// 画素高さ。
    pub height: u32,
    /// 撮影（取り込み）時刻。
    pub captured_at: DateTime<Utc>,
    /// 画像バイト列のSHA-256（URL安全base64）。
    pub digest: String,
}

impl PendingPhoto {
    /// アップロード時のファイル名。
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.bin", self.handle))
    }
}

/// confirmで払い出される写真レコードID。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhotoRecordId(pub i64);

impl fmt::Display for PhotoRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 写真スロットの進行状態。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PhotoStatus {
    /// 撮影済み、未確定。
    Captured,
    /// アップロードとconfirmが完了。
    Confirmed {
        object_key: String,
        record_id: PhotoRecordId,
    },
}

/// ウィザードが保持する撮影対象ごとの写真。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhotoSlot {
    /// 撮影した写真。
    pub photo: PendingPhoto,
    /// 確定状態。
    pub status: PhotoStatus,
}

impl PhotoSlot {
    /// 確定済みならオブジェクトキーを返す。
    pub fn confirmed_key(&self) -> Option<&str> {
        match &self.status {
            PhotoStatus::Confirmed { object_key, .. } => Some(object_key),
            PhotoStatus::Captured => None,
        }
    }
}

/// 点検の最終判定。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InspectionStatus {
    Pass,
    Fail,
}

impl fmt::Display for InspectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InspectionStatus::Pass => f.write_str("PASS"),
            InspectionStatus::Fail => f.write_str("FAIL"),
        }
    }
}

/// 完了APIへ送る本文。
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub status: InspectionStatus,
    pub fuel_level: f64,
    pub odometer_km: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuel_level_photo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub odometer_photo: Option<String>,
}

/// バックエンドが返すID（数値または文字列）。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum BackendId {
    Int(i64),
    Text(String),
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendId::Int(n) => write!(f, "{n}"),
            BackendId::Text(s) => f.write_str(s),
        }
    }
}

/// 完了APIの応答。本文が無い・足りない場合は各項目がNone。
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct CompletedInspection {
    /// バックエンド側の点検ID。
    #[serde(default)]
    pub id: Option<BackendId>,
    /// 確定したステータス。
    #[serde(default)]
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fuel_level_range() {
        // 0〜100の境界を含めて受け付ける。
        for v in [0.0, 0.5, 50.0, 75.0, 99.9, 100.0] {
            assert!(ReadingEntry::new(ReadingKind::FuelLevel, v).is_ok(), "{v}");
        }
        // 範囲外と非数は拒否する。
        for v in [-0.1, -50.0, 100.01, 250.0, f64::NAN, f64::INFINITY] {
            assert!(ReadingEntry::new(ReadingKind::FuelLevel, v).is_err(), "{v}");
        }
    }

    #[test]
    fn test_odometer_range() {
        for v in [0.0, 1.0, 45231.0, 1_000_000.0] {
            assert!(ReadingEntry::new(ReadingKind::Odometer, v).is_ok(), "{v}");
        }
        for v in [-1.0, -0.001, f64::NEG_INFINITY] {
            assert!(matches!(
                ReadingEntry::new(ReadingKind::Odometer, v),
                Err(WizardError::OutOfRange { .. })
            ));
        }
    }

    #[test]
    fn test_parse_reading_text() {
        let r = ReadingEntry::parse(ReadingKind::Odometer, " 45231 ").unwrap();
        assert_eq!(r.value, 45231.0);
        assert!(matches!(
            ReadingEntry::parse(ReadingKind::FuelLevel, "full"),
            Err(WizardError::NotANumber { .. })
        ));
    }

    #[test]
    fn test_inspection_id_trims() {
        assert_eq!(InspectionId::parse("  42 ").unwrap().as_str(), "42");
        assert!(InspectionId::parse("   ").is_none());
    }

    #[test]
    fn test_completion_request_omits_missing_photos() {
        let req = CompletionRequest {
            status: InspectionStatus::Fail,
            fuel_level: 10.0,
            odometer_km: 5.0,
            fuel_level_photo: None,
            odometer_photo: Some("k".into()),
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["status"], "FAIL");
        assert!(v.get("fuel_level_photo").is_none());
        assert_eq!(v["odometer_photo"], "k");
    }

    #[test]
    fn test_completed_inspection_tolerates_partial_body() {
        let done: CompletedInspection = serde_json::from_str(r#"{"status":"COMPLETED"}"#).unwrap();
        assert_eq!(done.id, None);
        assert_eq!(done.status.as_deref(), Some("COMPLETED"));
        let done: CompletedInspection = serde_json::from_str(r#"{"id":"abc"}"#).unwrap();
        assert_eq!(done.id, Some(BackendId::Text("abc".into())));
    }
}
