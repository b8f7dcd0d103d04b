//! Typed bindings for the inpainting service's REST endpoints.
//!
//! Every endpoint answers with the envelope
//! `{"success": bool, "message": str?, "data": ...}`; the bindings
//! return the decoded `data`.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::client::{Client, RequestSpec};
use crate::error::NetworkError;
use crate::multipart::MultipartForm;
use crate::transport::{Transport, UploadProgress};

/// Multipart upload endpoint.
pub const UPLOAD_PATH: &str = "/api/v1/upload";
/// Inpainting submission endpoint.
pub const INPAINT_PATH: &str = "/api/v1/inpaint";

/// Job retrieval path for a process id.
#[must_use]
pub fn process_path(process_id: &str) -> String {
    format!("/api/v1/process/{}", urlencoding::encode(process_id))
}

/// Record retrieval path for a history id.
#[must_use]
pub fn history_path(history_id: &str) -> String {
    format!("/api/v1/history/{}", urlencoding::encode(history_id))
}

/// Saved work retrieval path for a work id.
#[must_use]
pub fn work_path(work_id: &str) -> String {
    format!("/api/v1/works/{}", urlencoding::encode(work_id))
}

/// Server-side inpainting model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InpaintModel {
    /// Large-mask inpainting; fast.
    #[default]
    Lama,
    /// Latent diffusion; slower, higher quality.
    Ldm,
    /// Mask-aware transformer.
    Mat,
}

impl InpaintModel {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lama => "lama",
            Self::Ldm => "ldm",
            Self::Mat => "mat",
        }
    }

    /// Display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Lama => "LAMA",
            Self::Ldm => "LDM",
            Self::Mat => "MAT",
        }
    }
}

impl fmt::Display for InpaintModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-facing model choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelPreset {
    /// Quick result.
    #[default]
    Fast,
    /// Better result, slower.
    Quality,
}

impl From<ModelPreset> for InpaintModel {
    fn from(preset: ModelPreset) -> Self {
        match preset {
            ModelPreset::Fast => Self::Lama,
            ModelPreset::Quality => Self::Ldm,
        }
    }
}

/// Upload classification sent as the `type` form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// The photo to repair.
    Original,
    /// The binary mask.
    Mask,
}

impl ImageKind {
    /// Form field value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Mask => "mask",
        }
    }
}

/// A server identifier, sent as either a JSON string or number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    /// Wrap an identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RemoteId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(Self(s)),
            Value::Number(n) => Ok(Self(n.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "expected a string or number id, got {other}"
            ))),
        }
    }
}

/// Result of an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// Server-side file id.
    pub id: RemoteId,
}

/// Body of an inpainting submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InpaintRequest<'a> {
    /// Uploaded original.
    pub image_id: &'a RemoteId,
    /// Uploaded mask.
    pub mask_id: &'a RemoteId,
    /// Model to run.
    pub model: InpaintModel,
}

/// Result of an inpainting submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessTicket {
    /// Job id for [`InpaintApi::fetch_process`].
    pub process_id: RemoteId,
}

/// Lifecycle of a server-side job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Accepted, not started.
    Pending,
    /// Running.
    Processing,
    /// Finished with a result.
    #[serde(alias = "success")]
    Completed,
    /// Finished without a result.
    Failed,
    /// A status this client does not know.
    #[serde(other)]
    Unknown,
}

impl RecordStatus {
    /// Whether the job will not change any more.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A processing record as returned by the job and history endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    /// Job state.
    pub status: RecordStatus,
    /// Processing time in seconds.
    #[serde(default)]
    pub duration: Option<f64>,
    /// Wire name of the model used.
    #[serde(default)]
    pub model: Option<String>,
    /// URL of the uploaded original.
    #[serde(default)]
    pub original_image_url: Option<String>,
    /// URL of the repaired image, once completed.
    #[serde(default)]
    pub result_image_url: Option<String>,
    /// Result dimensions as display text (e.g. `"1024 × 768"`).
    #[serde(default)]
    pub dimensions: Option<String>,
    /// Result format (e.g. `"PNG"`).
    #[serde(default)]
    pub format: Option<String>,
    /// Result size in bytes.
    #[serde(default)]
    pub file_size: Option<u64>,
    /// Creation timestamp as sent by the server.
    #[serde(default)]
    pub created_at: Option<String>,
    /// Job progress in percent.
    #[serde(default)]
    pub progress: Option<u8>,
    /// Failure reason, for failed jobs.
    #[serde(default)]
    pub error_message: Option<String>,
}

impl ProcessRecord {
    /// Result size for display, or `None` when unknown or zero.
    #[must_use]
    pub fn formatted_file_size(&self) -> Option<String> {
        self.file_size.filter(|&b| b > 0).map(format_file_size)
    }

    /// Upper-case model label; unknown models pass through unchanged.
    #[must_use]
    pub fn model_label(&self) -> Option<String> {
        let model = self.model.as_deref()?;
        let label = match model {
            "lama" => InpaintModel::Lama.label(),
            "ldm" => InpaintModel::Ldm.label(),
            "mat" => InpaintModel::Mat.label(),
            other => other,
        };
        Some(label.to_owned())
    }

    /// Result format, defaulting to PNG.
    #[must_use]
    pub fn format_label(&self) -> &str {
        self.format.as_deref().unwrap_or("PNG")
    }
}

/// Format a byte count with one decimal: `B`, `KB`, `MB` or `GB`
/// (powers of 1024).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.1} {}", UNITS[unit])
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

fn data<T: DeserializeOwned>(body: Value) -> Result<T, NetworkError> {
    let envelope: Envelope<T> = serde_json::from_value(body)?;
    Ok(envelope.data)
}

/// The inpainting service.
#[derive(Debug)]
pub struct InpaintApi<T> {
    client: Client<T>,
}

impl<T: Transport> InpaintApi<T> {
    /// Wrap a client.
    #[must_use]
    pub const fn new(client: Client<T>) -> Self {
        Self { client }
    }

    /// The underlying client.
    #[must_use]
    pub const fn client(&self) -> &Client<T> {
        &self.client
    }

    /// Upload an image as a multipart `file` part with a `type` field.
    ///
    /// # Errors
    ///
    /// Returns a [`NetworkError`] if the request fails or the response
    /// has no `data.id`.
    pub fn upload_image(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        kind: ImageKind,
        progress: &mut dyn FnMut(UploadProgress),
    ) -> Result<UploadedFile, NetworkError> {
        let form = MultipartForm::new()
            .file("file", file_name, bytes)
            .text("type", kind.as_str());
        let body = self.client.upload(UPLOAD_PATH, form, progress)?;
        let uploaded: UploadedFile = data(body)?;
        tracing::debug!(kind = kind.as_str(), id = %uploaded.id, "image uploaded");
        Ok(uploaded)
    }

    /// Start an inpainting job.
    ///
    /// # Errors
    ///
    /// Returns a [`NetworkError`] if the request fails or the response
    /// has no `data.process_id`.
    pub fn submit_inpaint(
        &self,
        image_id: &RemoteId,
        mask_id: &RemoteId,
        model: InpaintModel,
    ) -> Result<ProcessTicket, NetworkError> {
        let request = InpaintRequest {
            image_id,
            mask_id,
            model,
        };
        let spec = RequestSpec::post(INPAINT_PATH, serde_json::to_value(&request)?);
        data(self.client.request(&spec)?)
    }

    /// Fetch a job by process id.
    ///
    /// # Errors
    ///
    /// Returns a [`NetworkError`] if the request fails or the record
    /// cannot be decoded.
    pub fn fetch_process(&self, process_id: &RemoteId) -> Result<ProcessRecord, NetworkError> {
        let spec = RequestSpec::get(process_path(process_id.as_str()));
        data(self.client.request(&spec)?)
    }

    /// Fetch a record by history id.
    ///
    /// # Errors
    ///
    /// Returns a [`NetworkError`] if the request fails or the record
    /// cannot be decoded.
    pub fn fetch_history(&self, history_id: &RemoteId) -> Result<ProcessRecord, NetworkError> {
        let spec = RequestSpec::get(history_path(history_id.as_str()));
        data(self.client.request(&spec)?)
    }

    /// Fetch a saved work. Works carry the same fields as process
    /// records.
    ///
    /// # Errors
    ///
    /// Returns a [`NetworkError`] if the request fails or the record
    /// cannot be decoded.
    pub fn fetch_work(&self, work_id: &RemoteId) -> Result<ProcessRecord, NetworkError> {
        let spec = RequestSpec::get(work_path(work_id.as_str()));
        data(self.client.request(&spec)?)
    }

    /// Download the repaired image of a finished record. `Ok(None)`
    /// when the record has no result yet.
    ///
    /// # Errors
    ///
    /// Returns a [`NetworkError`] if the download fails.
    pub fn download_result(&self, record: &ProcessRecord) -> Result<Option<Vec<u8>>, NetworkError> {
        record
            .result_image_url
            .as_deref()
            .map(|url| self.client.download(url))
            .transpose()
    }
}
