use crate::export::exporter::{ExportResult, Exporter};
use crate::export::file_ext::FileExtProvider;
use crate::export::function_path;
use crate::export::postgres::PostgresExporter;
use crate::export::result_error::error::Error;
use crate::export::result_error::result::Result;
use crate::export::result_error::{AddFunctionName, AddMsg};
use function_name::named;
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::Validate;

/// Top level of the YAML configuration file
#[derive(Clone, Serialize, Deserialize, Debug, Validate)]
#[serde(deny_unknown_fields)]
pub struct ExportConfig {
    #[validate(length(min = 1), nested)]
    pub exports: Vec<PostgresExporter>,
    /// Rename successful artifacts to carry an extension matching their content type
    #[serde(default)]
    pub append_file_ext: bool,
}

impl ExportConfig {
    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self> {
        let config: ExportConfig = serde_yml::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Runs every configured export on `pool`, results in configuration order.
    pub fn run_all(&self, pool: &ThreadPool) -> Vec<ExportResult> {
        tracing::info!("Running {} export(s)", self.exports.len());
        pool.install(|| {
            self.exports
                .par_iter()
                .map(|exporter| exporter.export())
                .collect()
        })
    }

    /// Hands back the final artifact path of a successful export.
    pub fn finalize(&self, result: ExportResult) -> Result<PathBuf> {
        let (path, mime, _, outcome) = result.into_parts();
        outcome?;
        if !self.append_file_ext {
            return Ok(path);
        }
        let ext = mime.file_ext().map(|ext| ext.as_ref().to_string());
        match ext {
            Some(ext) => rename_with_ext(&path, &ext),
            None => Ok(path),
        }
    }
}

#[named]
fn rename_with_ext(path: &Path, ext: &str) -> Result<PathBuf> {
    // appended, database names may contain dots
    let mut file_name = path.file_name().unwrap_or_default().to_os_string();
    file_name.push(".");
    file_name.push(ext);
    let target = path.with_file_name(file_name);
    std::fs::rename(path, &target)
        .map_err(Error::from)
        .add_msg(format!("Renaming {:?} to {:?} failed", path, target))
        .add_fn_name(function_path!())?;
    tracing::debug!("Renamed {:?} to {:?}", path, target);
    Ok(target)
}
