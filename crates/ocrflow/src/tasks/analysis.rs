//! Model-based analysis stage over OCR outputs.

use super::params::AnalysisParams;
use super::script::resolve_path;
use crate::error::TaskError;

pub(crate) fn build_args(params: &AnalysisParams) -> Result<Vec<String>, TaskError> {
    let mut args = vec![
        resolve_path(&params.output_root)?.display().to_string(),
        "--prompt".to_string(),
        params.prompt.clone(),
        "--service-account".to_string(),
        resolve_path(&params.service_account)?.display().to_string(),
        "--model".to_string(),
        params.model.clone(),
        "--region".to_string(),
        params.region.clone(),
        "--analysis-dir-name".to_string(),
        params.analysis_dir_name.clone(),
        "--chunk-size".to_string(),
        params.max_input_chars.to_string(),
        "--chunk-overlap".to_string(),
        params.chunk_overlap.to_string(),
        "--max-output-tokens".to_string(),
        params.max_output_tokens.to_string(),
        "--temperature".to_string(),
        params.temperature.to_string(),
        "--top-p".to_string(),
        params.top_p.to_string(),
        "--top-k".to_string(),
        params.top_k.to_string(),
    ];
    if params.verbose {
        args.push("--verbose".to_string());
    }
    Ok(args)
}

pub(crate) fn preflight(params: &AnalysisParams) -> Result<(), TaskError> {
    let root = resolve_path(&params.output_root)?;
    if !root.is_dir() {
        return Err(TaskError::failed(format!(
            "OCR output folder not found: {}",
            root.display()
        )));
    }
    let service_account = resolve_path(&params.service_account)?;
    if !service_account.is_file() {
        return Err(TaskError::failed(format!(
            "Service account file not found: {}",
            service_account.display()
        )));
    }
    Ok(())
}
