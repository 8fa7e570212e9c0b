//! Source documents and their formats

use std::path::Path;

use serde::Serialize;

use crate::error::{Error, Result};

/// Text formats accepted for ingestion, resolved once from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceFormat {
    PlainText,
    Markdown,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("txt") | Some("text") => Ok(Self::PlainText),
            Some("md") | Some("markdown") => Ok(Self::Markdown),
            Some(other) => Err(Error::UnsupportedFormat(format!(".{}", other))),
            None => Err(Error::UnsupportedFormat(format!(
                "{} has no file extension",
                path.display()
            ))),
        }
    }

    /// Reduce the raw file contents to prose for chunking and extraction
    pub fn normalize(self, raw: &str) -> String {
        match self {
            Self::PlainText => raw.replace("\r\n", "\n"),
            Self::Markdown => raw
                .lines()
                .filter(|line| !is_rule(line))
                .map(|line| line.trim_start_matches('#').trim_start())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

fn is_rule(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= 3
        && (trimmed.chars().all(|c| c == '-')
            || trimmed.chars().all(|c| c == '*')
            || trimmed.chars().all(|c| c == '=')
            || trimmed.starts_with("```"))
}

/// A document's extracted text, ready for ingestion
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    /// Identifier used in citations (the file name for loaded files)
    pub id: String,
    pub format: SourceFormat,
    pub text: String,
}

impl SourceDocument {
    pub fn new(id: impl Into<String>, format: SourceFormat, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            format,
            text: text.into(),
        }
    }

    /// Read a plain text or markdown file
    pub async fn load(path: &Path) -> Result<Self> {
        let format = SourceFormat::from_path(path)?;
        let raw = tokio::fs::read_to_string(path).await?;
        let id = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self::new(id, format, format.normalize(&raw)))
    }
}
