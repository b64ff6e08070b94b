//! Wire types for the signed-upload handshake.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::error::ApiError;
use crate::{
    capture::SUPPORTED_IMAGE_TYPES,
    inspection::{InspectionId, PendingPhoto, PhotoRecordId},
};

/// Sign request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignReq<'a> {
    pub content_type: &'a str,
}

/// Raw sign response as sent by the backend.
#[derive(Debug, Deserialize)]
pub struct SignResp {
    pub url: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    pub key: String,
}

/// A single-use pre-signed upload target.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadGrant {
    /// Object storage endpoint to POST to.
    pub target_url: String,
    /// Form fields that must precede the file part.
    pub form_fields: BTreeMap<String, String>,
    /// Object key the bytes will be stored under.
    pub object_key: String,
}

impl TryFrom<SignResp> for UploadGrant {
    type Error = ApiError;

    fn try_from(resp: SignResp) -> Result<Self, Self::Error> {
        if resp.url.trim().is_empty() {
            return Err(ApiError::Parse("sign response has an empty url".into()));
        }
        if resp.key.trim().is_empty() {
            return Err(ApiError::Parse("sign response has an empty key".into()));
        }
        Ok(Self {
            target_url: resp.url,
            form_fields: resp.fields,
            object_key: resp.key,
        })
    }
}

/// Confirm request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmReq {
    pub inspection_id: InspectionId,
    pub file_key: String,
    pub part: &'static str,
    pub angle: &'static str,
    pub width: u32,
    pub height: u32,
    pub taken_at: String,
}

impl ConfirmReq {
    /// Build the confirmation for a photo uploaded under `file_key`.
    pub fn for_photo(inspection_id: &InspectionId, file_key: &str, photo: &PendingPhoto) -> Self {
        Self {
            inspection_id: inspection_id.clone(),
            file_key: file_key.to_string(),
            part: photo.role.part(),
            angle: photo.role.angle(),
            width: photo.width,
            height: photo.height,
            taken_at: iso8601(photo.captured_at),
        }
    }
}

/// Confirm response; only the record id is used.
#[derive(Debug, Deserialize)]
pub struct ConfirmResp {
    pub id: PhotoRecordId,
}

/// Format a capture timestamp the way the backend parses it.
pub fn iso8601(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Fail fast on content types the signer will not accept.
pub fn ensure_supported_image(content_type: &str) -> Result<(), ApiError> {
    if SUPPORTED_IMAGE_TYPES.contains(&content_type) {
        Ok(())
    } else {
        Err(ApiError::UnsupportedContentType(content_type.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{inspection::PhotoRole, wizard::tests::photo};
    use chrono::TimeZone;

    #[test]
    fn test_sign_response_becomes_grant() {
        let resp: SignResp = serde_json::from_str(
            r#"{"url":"https://bucket.example.com/","fields":{"policy":"p","key":"uploads/abc123"},"key":"uploads/abc123"}"#,
        )
        .unwrap();
        let grant = UploadGrant::try_from(resp).unwrap();
        assert_eq!(grant.object_key, "uploads/abc123");
        assert_eq!(grant.form_fields["policy"], "p");
    }

    #[test]
    fn test_sign_response_without_key_is_rejected() {
        let resp: SignResp =
            serde_json::from_str(r#"{"url":"https://bucket.example.com/","key":" "}"#).unwrap();
        assert!(matches!(
            UploadGrant::try_from(resp),
            Err(ApiError::Parse(_))
        ));
        // A response without a key fails at decode time.
        assert!(serde_json::from_str::<SignResp>(r#"{"url":"x"}"#).is_err());
    }

    #[test]
    fn test_confirm_body_shape() {
        let mut p = photo(PhotoRole::Odometer);
        p.captured_at = Utc.with_ymd_and_hms(2025, 3, 1, 8, 30, 0).unwrap();
        let id = InspectionId::parse("88").unwrap();
        let v = serde_json::to_value(ConfirmReq::for_photo(&id, "def456", &p)).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "inspection_id": "88",
                "file_key": "def456",
                "part": "ODOMETER",
                "angle": "DASHBOARD",
                "width": 1280,
                "height": 960,
                "taken_at": "2025-03-01T08:30:00.000Z"
            })
        );
    }

    #[test]
    fn test_only_images_are_signed() {
        assert!(ensure_supported_image("image/jpeg").is_ok());
        assert!(ensure_supported_image("image/png").is_ok());
        assert!(matches!(
            ensure_supported_image("application/pdf"),
            Err(ApiError::UnsupportedContentType(_))
        ));
    }
}
