//! Helpers for sanitizing data before it enters tracing span attributes.
//!
//! Job parameters name local folders and service-account key files; spans
//! carry only file names or short hashes of them.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

use crate::tasks::JobParams;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Returns a short deterministic hash of a path for correlation without
/// exposing the actual path.
pub fn hash_path(path: &Path) -> String {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    let hash = hasher.finish();
    format!("{:016x}", hash)
}

/// One-line description of job parameters that is safe to log.
///
/// Paths are hashed, the Drive folder id is elided and the analysis prompt
/// is reduced to its length.
pub fn describe_params(params: &JobParams) -> String {
    match params {
        JobParams::Drive(p) => format!(
            "destination={} overwrite={}",
            hash_path(Path::new(&p.destination)),
            p.overwrite
        ),
        JobParams::Ocr(p) => format!(
            "source={} device={} dpi={} force={}",
            hash_path(Path::new(&p.source)),
            p.device.as_str(),
            p.dpi,
            p.force
        ),
        JobParams::Analysis(p) => format!(
            "output_root={} model={} prompt_chars={}",
            hash_path(Path::new(&p.output_root)),
            p.model,
            p.prompt.chars().count()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{AnalysisParams, DriveParams, OcrParams};

    #[test]
    fn test_redact_path_returns_filename() {
        assert_eq!(
            redact_path(Path::new("/home/user/scripts/gpu_turkish_ocr.py")),
            "gpu_turkish_ocr.py"
        );
    }

    #[test]
    fn test_redact_path_no_filename() {
        assert_eq!(redact_path(Path::new("/")), "<unknown>");
    }

    #[test]
    fn test_hash_path_deterministic() {
        let a = hash_path(Path::new("/data/scans"));
        assert_eq!(a, hash_path(Path::new("/data/scans")));
        assert_ne!(a, hash_path(Path::new("/data/other")));
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_describe_params_hides_paths() {
        let ocr = JobParams::Ocr(OcrParams::new("/home/alice/private/scans"));
        let described = describe_params(&ocr);
        assert!(!described.contains("alice"));
        assert!(described.contains("dpi=220"));

        let drive = JobParams::Drive(DriveParams {
            folder_id: "1AbCdEf".to_string(),
            destination: "/home/alice/in".to_string(),
            service_account: "/home/alice/sa.json".to_string(),
            overwrite: false,
            verbose: true,
        });
        let described = describe_params(&drive);
        assert!(!described.contains("1AbCdEf"));
        assert!(!described.contains("sa.json"));
    }

    #[test]
    fn test_describe_params_reduces_prompt() {
        let params: AnalysisParams = serde_json::from_value(serde_json::json!({
            "output_root": "/ocr",
            "prompt": "Find every invoice number",
            "service_account": "/sa.json"
        }))
        .unwrap();
        let described = describe_params(&JobParams::Analysis(params));
        assert!(described.contains("prompt_chars=25"));
        assert!(!described.contains("invoice"));
    }
}
