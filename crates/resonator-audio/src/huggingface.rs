// ABOUTME: Hugging Face Inference API client for stem separation, denoising, and model status.
// ABOUTME: Maps 503/timeout/non-200 responses to HfError and writes returned audio next to the input.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co/models";

const STATUS_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_LOADING_ESTIMATE: f64 = 60.0;
const ERROR_BODY_LIMIT: usize = 200;

/// Errors returned by inference calls. `status_code` gives the HTTP status to surface.
#[derive(Debug, Error)]
pub enum HfError {
    #[error("request timed out; the model may be loading")]
    Timeout,

    #[error("model is loading; estimated wait {estimated_time}s, please retry")]
    ModelLoading { estimated_time: f64 },

    #[error("hugging face api error: {body}")]
    Api { status: u16, body: String },

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl HfError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            HfError::Timeout => Some(408),
            HfError::ModelLoading { .. } => Some(503),
            HfError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Audio post-processing tasks offered through the inference API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HfTask {
    Demucs,
    Denoise,
}

impl HfTask {
    pub const ALL: [HfTask; 2] = [HfTask::Demucs, HfTask::Denoise];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|task| task.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            HfTask::Demucs => "demucs",
            HfTask::Denoise => "denoise",
        }
    }

    pub fn model_id(self) -> &'static str {
        match self {
            HfTask::Demucs => "facebook/demucs",
            HfTask::Denoise => "speechbrain/sepformer-wham16k-enhancement",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelState {
    Ready,
    Loading,
    Error,
}

/// Availability of a hosted model, as reported by the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelStatus {
    pub status: ModelState,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ModelStatus {
    /// Interpret a status-endpoint reply.
    pub fn from_response(model: &str, status: u16, body: Option<&Value>) -> Self {
        let (state, estimated_time, message) = match status {
            200 => (ModelState::Ready, None, None),
            503 => (
                ModelState::Loading,
                body.and_then(|b| b.get("estimated_time")).and_then(Value::as_f64),
                None,
            ),
            other => (ModelState::Error, None, Some(format!("status code {}", other))),
        };

        Self {
            status: state,
            model: model.to_string(),
            estimated_time,
            message,
        }
    }

    fn unreachable(model: &str, reason: String) -> Self {
        Self {
            status: ModelState::Error,
            model: model.to_string(),
            estimated_time: None,
            message: Some(reason),
        }
    }
}

/// Thin client over the Hugging Face Inference API.
#[derive(Debug, Clone)]
pub struct HfClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
}

impl HfClient {
    /// `timeout` bounds inference requests; status checks use a shorter fixed timeout.
    pub fn new(base_url: String, token: Option<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            timeout,
        }
    }

    pub fn model_url(&self, model_id: &str) -> String {
        format!("{}/{}", self.base_url, model_id)
    }

    /// Check whether a model is loaded. Network failures are reported as an
    /// `Error` status rather than returned.
    pub async fn model_status(&self, model_id: &str) -> ModelStatus {
        let request = self
            .authorize(self.client.get(self.model_url(model_id)))
            .header("Content-Type", "application/json")
            .timeout(STATUS_TIMEOUT);

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("error checking model status for {}: {}", model_id, e);
                return ModelStatus::unreachable(model_id, e.to_string());
            }
        };

        let status = response.status().as_u16();
        let body = if status == 503 {
            response.json::<Value>().await.ok()
        } else {
            None
        };
        ModelStatus::from_response(model_id, status, body.as_ref())
    }

    /// POST raw audio bytes and return the successful response.
    pub async fn infer_audio(
        &self,
        model_id: &str,
        audio: Vec<u8>,
    ) -> Result<reqwest::Response, HfError> {
        let response = self
            .authorize(self.client.post(self.model_url(model_id)))
            .header("Content-Type", "application/octet-stream")
            .timeout(self.timeout)
            .body(audio)
            .send()
            .await
            .map_err(map_send_error)?;

        check_response(response).await
    }

    /// POST a JSON payload, asking for `accept` as the reply media type, and
    /// return the successful response.
    pub async fn infer_json(
        &self,
        model_id: &str,
        payload: &Value,
        accept: &str,
    ) -> Result<reqwest::Response, HfError> {
        let response = self
            .authorize(self.client.post(self.model_url(model_id)))
            .header("Accept", accept)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .map_err(map_send_error)?;

        check_response(response).await
    }

    /// Split audio into stems with Demucs. Each stem is written to
    /// `<base>_stem_<name>.wav` in `output_dir`; returns stem name to filename.
    pub async fn separate_stems(
        &self,
        audio_path: &Path,
        output_dir: &Path,
    ) -> Result<BTreeMap<String, String>, HfError> {
        let audio = tokio::fs::read(audio_path).await?;
        tracing::info!("sending {} to demucs for stem separation", audio_path.display());

        let response = self.infer_audio(HfTask::Demucs.model_id(), audio).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| HfError::UnexpectedResponse(format!("failed to parse JSON: {}", e)))?;

        let base = base_name(audio_path);
        let mut stems = BTreeMap::new();
        for (stem, bytes) in decode_stems(&body)? {
            let filename = format!("{}_stem_{}.wav", base, stem);
            tokio::fs::write(output_dir.join(&filename), bytes).await?;
            tracing::info!("saved stem: {}", filename);
            stems.insert(stem, filename);
        }

        Ok(stems)
    }

    /// Denoise audio and write the result to `<base>_denoised.wav`; returns that filename.
    pub async fn denoise(&self, audio_path: &Path, output_dir: &Path) -> Result<String, HfError> {
        let audio = tokio::fs::read(audio_path).await?;
        tracing::info!("sending {} for denoising", audio_path.display());

        let response = self.infer_audio(HfTask::Denoise.model_id(), audio).await?;
        let bytes = response.bytes().await?;

        let filename = format!("{}_denoised.wav", base_name(audio_path));
        tokio::fs::write(output_dir.join(&filename), &bytes).await?;
        tracing::info!("saved denoised audio: {}", filename);

        Ok(filename)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn map_send_error(e: reqwest::Error) -> HfError {
    if e.is_timeout() {
        HfError::Timeout
    } else {
        HfError::Http(e)
    }
}

async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, HfError> {
    let status = response.status();

    if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
        let estimated_time = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|b| b.get("estimated_time").and_then(Value::as_f64))
            .unwrap_or(DEFAULT_LOADING_ESTIMATE);
        return Err(HfError::ModelLoading { estimated_time });
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(HfError::Api {
            status: status.as_u16(),
            body: truncate_error_body(&body),
        });
    }

    Ok(response)
}

/// Decode a Demucs reply of the form `{"<stem>": "<base64 audio>", ...}`.
pub fn decode_stems(body: &Value) -> Result<Vec<(String, Vec<u8>)>, HfError> {
    let object = body.as_object().ok_or_else(|| {
        HfError::UnexpectedResponse("expected a JSON object of stems from demucs".to_string())
    })?;

    object
        .iter()
        .map(|(stem, encoded)| {
            let encoded = encoded.as_str().ok_or_else(|| {
                HfError::UnexpectedResponse(format!("stem {} is not a base64 string", stem))
            })?;
            let bytes = STANDARD.decode(encoded).map_err(|e| {
                HfError::UnexpectedResponse(format!("stem {} is not valid base64: {}", stem, e))
            })?;
            Ok((stem.clone(), bytes))
        })
        .collect()
}

fn truncate_error_body(body: &str) -> String {
    if body.is_empty() {
        return "Unknown error".to_string();
    }
    body.chars().take(ERROR_BODY_LIMIT).collect()
}

fn base_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string())
}
