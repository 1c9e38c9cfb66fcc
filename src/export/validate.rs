//! Validation functions for configuration values.
//!
//! Only the configuration layer calls these; `Exporter::export` runs on
//! whatever it is given.

use sanitize_filename::{is_sanitized, sanitize};
use validator::ValidationError;

use std::path::Path;

/// Database names end up inside artifact file names
pub fn validate_file_name_part<S: AsRef<str>>(name: S) -> Result<(), ValidationError> {
    let name = name.as_ref();
    if !name.is_empty() && !is_sanitized(name) {
        return Err(ValidationError::new("InvalidFileNamePart").with_message(
            format!(
                "{:?} cannot be used in a file name, try sanitizing like {:?}",
                name,
                sanitize(name)
            )
            .into(),
        ));
    }

    Ok(())
}

pub fn validate_dir_exist_or_created<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir.exists() {
        if !dir.is_dir() {
            return Err(ValidationError::new("InvalidDirectory")
                .with_message(format!("{:?} is not a directory", dir).into()));
        }
    } else {
        return std::fs::create_dir_all(dir).map_err(|e| {
            ValidationError::new("InvalidDirectory").with_message(
                format!("cannot create or access out_dir path {:?}: {}", dir, e).into(),
            )
        });
    }

    Ok(())
}

pub fn validate_writable_dir<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    validate_dir_exist_or_created(dir)?;
    let md = std::fs::metadata(dir).map_err(|e| {
        ValidationError::new("InvalidDirectory")
            .with_message(format!("cannot access metadata for {:?}: {}", dir, e).into())
    })?;
    if md.permissions().readonly() {
        Err(ValidationError::new("InvalidDirectory")
            .with_message(format!("cannot write to dir {:?}", dir).into()))
    } else {
        Ok(())
    }
}

/// Empty means the working directory. The artifact path is passed to the dump
/// utility as text, so it has to be valid UTF-8.
pub fn validate_out_dir<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    if dir.to_str().is_none() {
        return Err(ValidationError::new("InvalidDirectory")
            .with_message(format!("{:?} is not valid UTF-8", dir).into()));
    }
    validate_writable_dir(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_name_part() {
        assert!(validate_file_name_part("shop").is_ok());
        assert!(validate_file_name_part("").is_ok());
        assert!(validate_file_name_part("a/b").is_err());
    }

    #[test]
    fn test_out_dir_empty_is_ok() {
        assert!(validate_out_dir("").is_ok());
    }

    #[test]
    fn test_out_dir_created() {
        let temp_dir = TempDir::new().unwrap();
        let out_dir = temp_dir.path().join("nested/backups");

        assert!(validate_out_dir(&out_dir).is_ok());
        assert!(out_dir.is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_out_dir_not_utf8() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp_dir = TempDir::new().unwrap();
        let out_dir = temp_dir.path().join(OsStr::from_bytes(b"backups_\xff"));

        assert!(validate_out_dir(&out_dir).is_err());
        assert!(!out_dir.exists());
    }

    #[test]
    fn test_out_dir_is_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file");
        std::fs::write(&file, "x").unwrap();

        assert!(validate_out_dir(&file).is_err());
    }
}
