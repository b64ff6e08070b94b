//! 点検ウィザード（燃料→オドメーター→確認→提出）のステート管理。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

use crate::inspection::{
    CompletionRequest, InspectionId, InspectionStatus, PendingPhoto, PhotoRecordId, PhotoRole,
    PhotoSlot, PhotoStatus, ReadingEntry, ReadingKind,
};

/// ウィザードの各ステップ
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WizardStep {
    /// 燃料残量と燃料計の写真
    Fuel,
    /// 走行距離とオドメーターの写真
    Odometer,
    /// 判定の選択と提出
    Review,
    /// 提出済み（終端）
    Submitted,
}

impl WizardStep {
    /// このステップで入力する読み取り値。
    pub fn reading_kind(self) -> Option<ReadingKind> {
        match self {
            WizardStep::Fuel => Some(ReadingKind::FuelLevel),
            WizardStep::Odometer => Some(ReadingKind::Odometer),
            WizardStep::Review | WizardStep::Submitted => None,
        }
    }

    /// このステップで撮影する写真。
    pub fn photo_role(self) -> Option<PhotoRole> {
        self.reading_kind().map(ReadingKind::photo_role)
    }

    /// ステップ番号（1始まり）。
    pub fn number(self) -> usize {
        match self {
            WizardStep::Fuel => 1,
            WizardStep::Odometer => 2,
            WizardStep::Review => 3,
            WizardStep::Submitted => 4,
        }
    }

    /// 画面表示用の名前。
    pub fn title(self) -> &'static str {
        match self {
            WizardStep::Fuel => "Fuel",
            WizardStep::Odometer => "Odometer",
            WizardStep::Review => "Review",
            WizardStep::Submitted => "Submitted",
        }
    }
}

/// 全ステップ数（終端を含む）。
pub const TOTAL_STEPS: usize = 4;

/// ウィザード操作が拒否された理由。ネットワークへは到達しない。
#[derive(Debug, Error, PartialEq)]
pub enum WizardError {
    #[error("{} must be a number (got {raw:?})", .kind.label())]
    NotANumber { kind: ReadingKind, raw: String },

    #[error("{} out of range: {value}", .kind.label())]
    OutOfRange { kind: ReadingKind, value: f64 },

    #[error("{} reading is missing", .kind.label())]
    MissingReading { kind: ReadingKind },

    #[error("{} photo is missing", .role.label())]
    MissingPhoto { role: PhotoRole },

    #[error("{} photo is not uploaded yet", .role.label())]
    PhotoNotConfirmed { role: PhotoRole },

    #[error("{what} cannot be changed on the {} step", .step.title())]
    WrongStep { step: WizardStep, what: &'static str },

    #[error("no {} photo to confirm", .role.label())]
    NoPhoto { role: PhotoRole },

    #[error("{} photo was retaken while uploading", .role.label())]
    StalePhoto { role: PhotoRole },

    #[error("select PASS or FAIL before submitting")]
    StatusNotSelected,

    #[error("already on the first step")]
    AtFirstStep,

    #[error("submit from the review step")]
    SubmitRequired,

    #[error("inspection already submitted")]
    AlreadySubmitted,
}

/// 進行中の点検1件分の状態。チェックポイントとしてそのまま保存できる。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WizardState {
    /// 画面セッションの識別子（破棄済みセッションのイベントを捨てるのに使う）。
    pub session_id: Uuid,
    /// 対象の点検ID。
    inspection_id: InspectionId,
    /// 現在のステップ。
    step: WizardStep,
    /// 入力済みの読み取り値。
    readings: BTreeMap<ReadingKind, ReadingEntry>,
    /// 撮影済みの写真。
    photos: BTreeMap<PhotoRole, PhotoSlot>,
    /// 選択された最終判定。
    final_status: Option<InspectionStatus>,
}

impl WizardState {
    /// 新しいウィザード状態を作成
    pub fn new(inspection_id: InspectionId) -> Self {
        // 最初は燃料ステップから開始する。
        Self {
            session_id: Uuid::new_v4(),
            inspection_id,
            step: WizardStep::Fuel,
            readings: BTreeMap::new(),
            photos: BTreeMap::new(),
            final_status: None,
        }
    }

    pub fn inspection_id(&self) -> &InspectionId {
        &self.inspection_id
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn reading(&self, kind: ReadingKind) -> Option<&ReadingEntry> {
        self.readings.get(&kind)
    }

    pub fn photo(&self, role: PhotoRole) -> Option<&PhotoSlot> {
        self.photos.get(&role)
    }

    pub fn final_status(&self) -> Option<InspectionStatus> {
        self.final_status
    }

    /// 数値を検証して現在ステップの読み取り値として記録する。
    pub fn set_reading(&mut self, kind: ReadingKind, value: f64) -> Result<(), WizardError> {
        self.ensure_step_owns_reading(kind)?;
        let entry = ReadingEntry::new(kind, value)?;
        self.readings.insert(kind, entry);
        Ok(())
    }

    /// 入力ボックスの文字列から読み取り値を記録する。
    pub fn enter_reading(&mut self, kind: ReadingKind, raw: &str) -> Result<(), WizardError> {
        self.ensure_step_owns_reading(kind)?;
        let entry = ReadingEntry::parse(kind, raw)?;
        self.readings.insert(kind, entry);
        Ok(())
    }

    /// 撮影した写真をスロットへ入れる。既存の写真は置き換えて返す（リテイク）。
    pub fn attach_photo(&mut self, photo: PendingPhoto) -> Result<Option<PhotoSlot>, WizardError> {
        self.ensure_step_owns_photo(photo.role)?;
        let role = photo.role;
        let previous = self.photos.insert(
            role,
            PhotoSlot {
                photo,
                status: PhotoStatus::Captured,
            },
        );
        Ok(previous)
    }

    /// 写真を破棄する（撮り直し）。
    pub fn discard_photo(&mut self, role: PhotoRole) -> Result<Option<PhotoSlot>, WizardError> {
        self.ensure_step_owns_photo(role)?;
        Ok(self.photos.remove(&role))
    }

    /// アップロードとconfirmの完了を写真スロットへ反映する。
    pub fn mark_confirmed(
        &mut self,
        role: PhotoRole,
        handle: Uuid,
        object_key: String,
        record_id: PhotoRecordId,
    ) -> Result<(), WizardError> {
        if self.step == WizardStep::Submitted {
            return Err(WizardError::AlreadySubmitted);
        }
        let slot = self
            .photos
            .get_mut(&role)
            .ok_or(WizardError::NoPhoto { role })?;
        // アップロード中に撮り直された写真には反映しない。
        if slot.photo.handle != handle {
            return Err(WizardError::StalePhoto { role });
        }
        slot.status = PhotoStatus::Confirmed {
            object_key,
            record_id,
        };
        Ok(())
    }

    /// 次のステップへ進む。ガード条件を満たさなければ理由を返す。
    pub fn advance(&mut self) -> Result<WizardStep, WizardError> {
        let next = match self.step {
            WizardStep::Fuel => {
                self.ensure_pair(ReadingKind::FuelLevel)?;
                WizardStep::Odometer
            }
            WizardStep::Odometer => {
                self.ensure_pair(ReadingKind::Odometer)?;
                WizardStep::Review
            }
            WizardStep::Review => return Err(WizardError::SubmitRequired),
            WizardStep::Submitted => return Err(WizardError::AlreadySubmitted),
        };
        tracing::info!(from = ?self.step, to = ?next, "wizard advanced");
        self.step = next;
        Ok(next)
    }

    /// 前のステップへ戻る。入力済みのデータは保持する。
    pub fn back(&mut self) -> Result<WizardStep, WizardError> {
        let prev = match self.step {
            WizardStep::Fuel => return Err(WizardError::AtFirstStep),
            WizardStep::Odometer => WizardStep::Fuel,
            WizardStep::Review => WizardStep::Odometer,
            WizardStep::Submitted => return Err(WizardError::AlreadySubmitted),
        };
        tracing::info!(from = ?self.step, to = ?prev, "wizard moved back");
        self.step = prev;
        Ok(prev)
    }

    /// 確認ステップで最終判定を選ぶ。
    pub fn select_status(&mut self, status: InspectionStatus) -> Result<(), WizardError> {
        match self.step {
            WizardStep::Review => {
                self.final_status = Some(status);
                Ok(())
            }
            WizardStep::Submitted => Err(WizardError::AlreadySubmitted),
            step => Err(WizardError::WrongStep {
                step,
                what: "final status",
            }),
        }
    }

    /// 完了APIへ送る本文を組み立てる。確認ステップ以外では作れない。
    pub fn completion_request(&self) -> Result<CompletionRequest, WizardError> {
        match self.step {
            WizardStep::Review => {}
            WizardStep::Submitted => return Err(WizardError::AlreadySubmitted),
            step => {
                return Err(WizardError::WrongStep {
                    step,
                    what: "submission",
                });
            }
        }
        let status = self.final_status.ok_or(WizardError::StatusNotSelected)?;
        let fuel = self.ensure_pair(ReadingKind::FuelLevel)?;
        let odometer = self.ensure_pair(ReadingKind::Odometer)?;
        Ok(CompletionRequest {
            status,
            fuel_level: fuel.0,
            odometer_km: odometer.0,
            fuel_level_photo: Some(fuel.1),
            odometer_photo: Some(odometer.1),
        })
    }

    /// 完了APIの成功を受けて終端状態へ移る。
    pub fn mark_submitted(&mut self) -> Result<(), WizardError> {
        match self.step {
            WizardStep::Review => {
                self.step = WizardStep::Submitted;
                Ok(())
            }
            WizardStep::Submitted => Err(WizardError::AlreadySubmitted),
            _ => Err(WizardError::SubmitRequired),
        }
    }

    /// 現在のステップを先へ進めるのに足りないもの。
    pub fn missing_requirements(&self) -> Vec<String> {
        match self.step {
            WizardStep::Fuel | WizardStep::Odometer => {
                let Some(kind) = self.step.reading_kind() else {
                    return vec![];
                };
                let mut missing = vec![];
                if self.readings.get(&kind).is_none() {
                    missing.push(format!("{} reading", kind.label()));
                }
                let role = kind.photo_role();
                match self.photos.get(&role) {
                    None => missing.push(format!("{} photo", role.label())),
                    Some(slot) if slot.confirmed_key().is_none() => {
                        missing.push(format!("{} photo upload", role.label()))
                    }
                    Some(_) => {}
                }
                missing
            }
            WizardStep::Review if self.final_status.is_none() => {
                vec!["PASS/FAIL selection".to_string()]
            }
            WizardStep::Review | WizardStep::Submitted => vec![],
        }
    }

    /// 読み取り値と確定済み写真が揃っているか確認し、値とキーを返す。
    fn ensure_pair(&self, kind: ReadingKind) -> Result<(f64, String), WizardError> {
        let reading = self
            .readings
            .get(&kind)
            .ok_or(WizardError::MissingReading { kind })?;
        let role = kind.photo_role();
        let slot = self
            .photos
            .get(&role)
            .ok_or(WizardError::MissingPhoto { role })?;
        let key = slot
            .confirmed_key()
            .ok_or(WizardError::PhotoNotConfirmed { role })?;
        Ok((reading.value, key.to_string()))
    }

    fn ensure_step_owns_reading(&self, kind: ReadingKind) -> Result<(), WizardError> {
        match self.step {
            WizardStep::Submitted => Err(WizardError::AlreadySubmitted),
            step if step.reading_kind() == Some(kind) => Ok(()),
            step => Err(WizardError::WrongStep {
                step,
                what: "reading",
            }),
        }
    }

    fn ensure_step_owns_photo(&self, role: PhotoRole) -> Result<(), WizardError> {
        match self.step {
            WizardStep::Submitted => Err(WizardError::AlreadySubmitted),
            step if step.photo_role() == Some(role) => Ok(()),
            step => Err(WizardError::WrongStep {
                step,
                what: "photo",
            }),
        }
    }
}
