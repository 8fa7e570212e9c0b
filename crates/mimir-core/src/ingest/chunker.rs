//! Overlapping fixed-size text chunks

use crate::config::IngestConfig;
use crate::error::{Error, Result};

/// A piece of a document with its character offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub offset: usize,
    pub text: String,
}

/// Splits text into windows of `chunk_size` characters overlapping by `chunk_overlap`
///
/// A window ends at the last whitespace in its second half when there is one,
/// so words are not cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidInput("chunk_size must be positive".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(Error::InvalidInput(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn split(&self, text: &str) -> Vec<TextSpan> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let mut spans = Vec::new();
        let mut start = 0;

        while start < total {
            let mut end = (start + self.chunk_size).min(total);
            if end < total {
                let floor = start + self.chunk_size / 2;
                if let Some(pos) = (floor..end).rev().find(|&i| chars[i].is_whitespace()) {
                    end = pos + 1;
                }
            }

            let piece: String = chars[start..end].iter().collect();
            let trimmed = piece.trim();
            if !trimmed.is_empty() {
                spans.push(TextSpan {
                    offset: start,
                    text: trimmed.to_string(),
                });
            }

            if end == total {
                break;
            }
            // Start the overlap at a word boundary when one is in reach
            let mut next = end.saturating_sub(self.chunk_overlap);
            if next > 0
                && !chars[next - 1].is_whitespace()
                && let Some(pos) = (next..end).find(|&i| chars[i].is_whitespace())
            {
                next = pos + 1;
            }
            start = next.max(start + 1);
        }

        spans
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_settings() {
        assert!(TextChunker::new(0, 0).is_err());
        assert!(TextChunker::new(100, 100).is_err());
        assert!(TextChunker::new(100, 20).is_ok());
        assert!(TextChunker::from_config(&IngestConfig::default()).is_ok());
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunker = TextChunker::new(1000, 200).unwrap();
        let spans = chunker.split("  MapReduce is a programming model.  ");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].offset, 0);
        assert_eq!(spans[0].text, "MapReduce is a programming model.");
    }

    #[test]
    fn test_windows_overlap() {
        let chunker = TextChunker::new(1000, 200).unwrap();
        let text = "a".repeat(2500);
        let spans = chunker.split(&text);

        let offsets: Vec<usize> = spans.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![0, 800, 1600]);
        assert_eq!(spans[0].text.len(), 1000);
        assert_eq!(spans[2].text.len(), 900);
    }

    #[test]
    fn test_breaks_on_whitespace() {
        let chunker = TextChunker::new(10, 2).unwrap();
        let spans = chunker.split("alpha beta gamma delta");
        assert_eq!(spans[0].text, "alpha");
        assert_eq!(spans[1].text, "beta gamma");
        assert_eq!(spans[1].offset, 6);
        assert!(spans.last().unwrap().text.ends_with("delta"));
    }

    #[test]
    fn test_empty_text() {
        let chunker = TextChunker::new(10, 2).unwrap();
        assert!(chunker.split("").is_empty());
        assert!(chunker.split("   ").is_empty());
    }
}
