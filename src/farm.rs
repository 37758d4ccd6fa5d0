//! The farm side of a submission: the management client, the upload
//! progress dialog, and the records handed between them.
//!
//! Both collaborators are external. Client responses are untyped documents
//! and only the fields the submitter needs are read out of them.

use camino::Utf8PathBuf;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::assets::AssetReferences;
use crate::error::{ClientError, TransportError};
use crate::params::ParameterValues;
use crate::template::{JobTemplate, ParameterDefinition};

/// An untyped response document.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Farm management API, scoped to the calls a submission makes.
pub trait FarmClient {
    fn get_farm(&self, farm_id: &str) -> Result<Document, ClientError>;

    fn get_queue(&self, farm_id: &str, queue_id: &str) -> Result<Document, ClientError>;

    /// Credentials acting as the queue's role, used for asset uploads.
    fn get_queue_user_session(
        &self,
        farm_id: &str,
        queue_id: &str,
        queue_display_name: &str,
    ) -> Result<QueueSession, ClientError>;

    /// Parameters declared by the queue's environments.
    fn queue_parameter_definitions(
        &self,
        farm_id: &str,
        queue_id: &str,
    ) -> Result<Vec<ParameterDefinition>, ClientError>;

    fn create_job(&self, request: &CreateJobRequest<'_>) -> Result<Document, ClientError>;
}

/// Drives the asset upload and reports how it ended. Any background work
/// and user cancellation happen behind this call.
pub trait ProgressDialog {
    fn upload_attachments(&mut self, request: &UploadRequest, manager: &AssetManager) -> UploadOutcome;
}

#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    /// Uploaded; carries the attachment manifest for job creation.
    Completed(Document),
    Canceled,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAttachmentSettings {
    pub s3_bucket_name: String,
    pub root_prefix: String,
}

/// Opaque queue-role session.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSession {
    pub queue_display_name: String,
    pub credentials: Document,
}

/// Everything the upload manager is constructed with.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetManager {
    pub farm_id: String,
    pub queue_id: String,
    pub settings: JobAttachmentSettings,
    pub session: QueueSession,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    pub farm_id: String,
    pub queue_id: String,
    pub storage_profile_id: Option<String>,
    pub bundle_dir: Utf8PathBuf,
    pub asset_references: AssetReferences,
    pub auto_accept: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest<'a> {
    pub farm_id: &'a str,
    pub queue_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_profile_id: Option<&'a str>,
    pub template: &'a JobTemplate,
    pub parameter_values: &'a ParameterValues,
    pub attachments: &'a Document,
}

/// Reads a required string field of a `call` response.
pub fn string_field(
    document: &Document,
    call: &'static str,
    field: &'static str,
) -> Result<String, TransportError> {
    match document.get(field) {
        Some(serde_json::Value::String(value)) => Ok(value.clone()),
        Some(_) => Err(TransportError::MalformedField {
            call,
            field,
            source: <serde_json::Error as serde::de::Error>::custom("expected a string"),
        }),
        None => Err(TransportError::MissingField { call, field }),
    }
}

/// Reads a required structured field of a `call` response.
pub fn typed_field<T>(
    document: &Document,
    call: &'static str,
    field: &'static str,
) -> Result<T, TransportError>
where
    T: DeserializeOwned,
{
    let value = document
        .get(field)
        .ok_or(TransportError::MissingField { call, field })?;

    T::deserialize(value).map_err(|source| TransportError::MalformedField { call, field, source })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn document(value: serde_json::Value) -> Document {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_string_field() {
        let doc = document(json!({"displayName": "Main", "count": 3}));

        assert_eq!(string_field(&doc, "get_queue", "displayName").unwrap(), "Main");
        assert!(matches!(
            string_field(&doc, "get_queue", "missing"),
            Err(TransportError::MissingField { field: "missing", .. })
        ));
        assert!(matches!(
            string_field(&doc, "get_queue", "count"),
            Err(TransportError::MalformedField { field: "count", .. })
        ));
    }

    #[test]
    fn test_typed_field() {
        let doc = document(json!({
            "jobAttachmentSettings": {"s3BucketName": "bucket", "rootPrefix": "root", "extra": 1},
            "broken": {"s3BucketName": 5},
        }));

        let settings: JobAttachmentSettings =
            typed_field(&doc, "get_queue", "jobAttachmentSettings").unwrap();
        assert_eq!(
            settings,
            JobAttachmentSettings {
                s3_bucket_name: "bucket".into(),
                root_prefix: "root".into(),
            }
        );

        let broken: Result<JobAttachmentSettings, _> = typed_field(&doc, "get_queue", "broken");
        assert!(matches!(broken, Err(TransportError::MalformedField { .. })));
    }
}
