//! Drive folder download stage.

use super::params::DriveParams;
use super::script::resolve_path;
use crate::error::TaskError;

pub(crate) fn build_args(params: &DriveParams) -> Result<Vec<String>, TaskError> {
    let mut args = vec![
        params.folder_id.clone(),
        resolve_path(&params.destination)?.display().to_string(),
        "--service-account".to_string(),
        resolve_path(&params.service_account)?.display().to_string(),
    ];
    if params.overwrite {
        args.push("--overwrite".to_string());
    }
    if params.verbose {
        args.push("--verbose".to_string());
    }
    Ok(args)
}

/// The service account key must exist before anything is downloaded.
pub(crate) fn preflight(params: &DriveParams) -> Result<(), TaskError> {
    let service_account = resolve_path(&params.service_account)?;
    if !service_account.is_file() {
        return Err(TaskError::failed(format!(
            "Service account file not found: {}",
            service_account.display()
        )));
    }
    Ok(())
}
