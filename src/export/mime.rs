use crate::export::file_ext::FileExtProvider;
use derive_more::Display;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Option token asking the dump utility for plain SQL output
pub static PLAIN_TEXT_FLAG: &str = "-Fp";

/// Content type of a produced export artifact
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactMime {
    #[display("text/plain")]
    #[serde(rename = "text/plain")]
    PlainText,
    #[display("application/x-tar")]
    #[serde(rename = "application/x-tar")]
    Tar,
}

impl ArtifactMime {
    /// Classifies from the assembled dump options alone, before anything runs.
    pub fn classify<S: AsRef<str>>(options: &[S]) -> Self {
        let joined = options.iter().map(AsRef::as_ref).join("|");
        if joined.contains(PLAIN_TEXT_FLAG) {
            ArtifactMime::PlainText
        } else {
            ArtifactMime::Tar
        }
    }
}

impl FileExtProvider for ArtifactMime {
    fn file_ext(&self) -> Option<impl AsRef<str>> {
        match self {
            ArtifactMime::PlainText => Some("sql"),
            ArtifactMime::Tar => Some("tar"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_without_plain_flag() {
        assert_eq!(ArtifactMime::classify(&["-dshop"]), ArtifactMime::Tar);
        assert_eq!(ArtifactMime::classify::<&str>(&[]), ArtifactMime::Tar);
    }

    #[test]
    fn test_classify_with_plain_flag_anywhere() {
        let options = ["--inserts", "-Fp", "-dshop", "-hdb.local"];
        assert_eq!(ArtifactMime::classify(&options), ArtifactMime::PlainText);

        let options = ["-dshop", "-Fp"];
        assert_eq!(ArtifactMime::classify(&options), ArtifactMime::PlainText);
    }

    #[test]
    fn test_custom_format_is_tar() {
        assert_eq!(ArtifactMime::classify(&["-Fc"]), ArtifactMime::Tar);
    }

    #[test]
    fn test_display() {
        assert_eq!(ArtifactMime::PlainText.to_string(), "text/plain");
        assert_eq!(ArtifactMime::Tar.to_string(), "application/x-tar");
    }

    #[test]
    fn test_serialization() {
        let serialized = serde_json::to_string(&ArtifactMime::Tar).unwrap();
        assert_eq!(serialized, "\"application/x-tar\"");
    }

    #[test]
    fn test_file_ext() {
        assert_eq!(ArtifactMime::PlainText.file_ext().unwrap().as_ref(), "sql");
        assert_eq!(ArtifactMime::Tar.file_ext().unwrap().as_ref(), "tar");
    }
}
