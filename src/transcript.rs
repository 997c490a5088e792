//! Accumulated dispatch output, savable to a text file.

use crate::dispatch::DispatchResult;
use crate::error::TranscriptError;
use std::path::Path;

#[derive(Debug, Default, Clone)]
pub struct Transcript {
    lines: Vec<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// Appends every rendered entry of `result`.
    pub fn record(&mut self, result: &DispatchResult) {
        self.lines.extend(result.render());
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Writes one line per entry. Refuses to create an empty file.
    pub fn save(&self, path: &Path) -> Result<(), TranscriptError> {
        if self.is_empty() {
            return Err(TranscriptError::Empty);
        }
        let mut content = self.lines.join("\n");
        content.push('\n');
        std::fs::write(path, content)?;
        log::info!("saved {} line(s) to {}", self.lines.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_transcript_is_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("responses.txt");
        assert!(matches!(Transcript::new().save(&path), Err(TranscriptError::Empty)));
        assert!(!path.exists());
    }

    #[test]
    fn saves_one_line_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("responses.txt");
        let mut transcript = Transcript::new();
        transcript.push("Load-5000 (5000): VOLT? -> 14");
        transcript.push("Load-5001 (5001): VOLT? -> 14");
        transcript.save(&path).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "Load-5000 (5000): VOLT? -> 14\nLoad-5001 (5001): VOLT? -> 14\n"
        );
    }
}
