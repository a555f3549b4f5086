//! Validated input parameters for each pipeline stage.

use serde::{Deserialize, Serialize};

use crate::error::OrchestratorError;
use crate::jobs::JobType;

fn default_true() -> bool {
    true
}

/// Parameters of a folder download from Drive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DriveParams {
    pub folder_id: String,
    pub destination: String,
    pub service_account: String,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default = "default_true")]
    pub verbose: bool,
}

/// Compute device for OCR.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Auto,
    Cuda,
    Cpu,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Auto => "auto",
            Device::Cuda => "cuda",
            Device::Cpu => "cpu",
        }
    }
}

/// Parameters of an OCR extraction run over a folder of documents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OcrParams {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default)]
    pub device: Device,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
    #[serde(default)]
    pub min_length: u32,
    #[serde(default)]
    pub force: bool,
    #[serde(default = "default_true")]
    pub verbose: bool,
}

fn default_dpi() -> u32 {
    220
}

impl OcrParams {
    /// Parameters for `source` with every optional field at its default.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            output: None,
            device: Device::Auto,
            dpi: default_dpi(),
            min_length: 0,
            force: false,
            verbose: true,
        }
    }
}

/// Parameters of a model-based analysis over OCR outputs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AnalysisParams {
    pub output_root: String,
    pub prompt: String,
    pub service_account: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_analysis_dir_name")]
    pub analysis_dir_name: String,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: u32,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: u32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_true")]
    pub verbose: bool,
}

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash-002";

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_region() -> String {
    "us-central1".to_string()
}

fn default_analysis_dir_name() -> String {
    "analysis_outputs".to_string()
}

fn default_max_input_chars() -> u32 {
    6000
}

fn default_chunk_overlap() -> u32 {
    300
}

fn default_max_output_tokens() -> u32 {
    2048
}

fn default_top_p() -> f64 {
    0.9
}

fn default_top_k() -> u32 {
    40
}

/// Parameters of a submitted job, one variant per stage.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum JobParams {
    Drive(DriveParams),
    Ocr(OcrParams),
    Analysis(AnalysisParams),
}

impl JobParams {
    /// Deserializes and validates raw parameters for `job_type`.
    pub fn parse(job_type: JobType, raw: serde_json::Value) -> Result<Self, OrchestratorError> {
        let invalid = |reason: String| OrchestratorError::InvalidParameters {
            job_type: job_type.to_string(),
            reason,
        };

        let params = match job_type {
            JobType::Drive => serde_json::from_value(raw).map(JobParams::Drive),
            JobType::Ocr => serde_json::from_value(raw).map(JobParams::Ocr),
            JobType::Analysis => serde_json::from_value(raw).map(JobParams::Analysis),
        }
        .map_err(|e| invalid(e.to_string()))?;

        params.validate().map_err(invalid)?;
        Ok(params)
    }

    pub fn job_type(&self) -> JobType {
        match self {
            JobParams::Drive(_) => JobType::Drive,
            JobParams::Ocr(_) => JobType::Ocr,
            JobParams::Analysis(_) => JobType::Analysis,
        }
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            JobParams::Drive(p) => {
                require_non_empty("folder_id", &p.folder_id)?;
                require_non_empty("destination", &p.destination)?;
                require_non_empty("service_account", &p.service_account)?;
            }
            JobParams::Ocr(p) => {
                require_non_empty("source", &p.source)?;
                if p.dpi < 72 {
                    return Err(format!("dpi must be at least 72, got {}", p.dpi));
                }
            }
            JobParams::Analysis(p) => {
                require_non_empty("output_root", &p.output_root)?;
                require_non_empty("prompt", &p.prompt)?;
                require_non_empty("service_account", &p.service_account)?;
                require_non_empty("model", &p.model)?;
                if p.max_input_chars < 500 {
                    return Err(format!(
                        "max_input_chars must be at least 500, got {}",
                        p.max_input_chars
                    ));
                }
                if p.max_output_tokens < 256 {
                    return Err(format!(
                        "max_output_tokens must be at least 256, got {}",
                        p.max_output_tokens
                    ));
                }
                if !(0.0..=1.0).contains(&p.temperature) {
                    return Err(format!(
                        "temperature must be within [0, 1], got {}",
                        p.temperature
                    ));
                }
                if !(0.0..=1.0).contains(&p.top_p) {
                    return Err(format!("top_p must be within [0, 1], got {}", p.top_p));
                }
                if p.top_k < 1 {
                    return Err("top_k must be at least 1".to_string());
                }
            }
        }
        Ok(())
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} must not be empty", field));
    }
    Ok(())
}
