//! OCR extraction stage.

use super::params::OcrParams;
use super::script::resolve_path;
use crate::error::TaskError;

pub(crate) fn build_args(params: &OcrParams) -> Result<Vec<String>, TaskError> {
    let mut args = vec![resolve_path(&params.source)?.display().to_string()];
    if let Some(output) = &params.output {
        args.push("--output".to_string());
        args.push(resolve_path(output)?.display().to_string());
    }
    args.push("--device".to_string());
    args.push(params.device.as_str().to_string());
    args.push("--dpi".to_string());
    args.push(params.dpi.to_string());
    if params.min_length > 0 {
        args.push("--min-length".to_string());
        args.push(params.min_length.to_string());
    }
    if params.force {
        args.push("--force".to_string());
    }
    if params.verbose {
        args.push("--verbose".to_string());
    }
    Ok(args)
}

pub(crate) fn preflight(params: &OcrParams) -> Result<(), TaskError> {
    let source = resolve_path(&params.source)?;
    if !source.is_dir() {
        return Err(TaskError::failed(format!(
            "Source folder not found: {}",
            source.display()
        )));
    }
    Ok(())
}
