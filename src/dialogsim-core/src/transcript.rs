//! Transcript persistence.
//!
//! Transcripts are written in the flattened `"Agent A (emotion): text"` form:
//! a pretty-printed JSON array (one message per line) and a plain text file
//! with exactly one message per line.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::DialogueError;
use crate::state::Utterance;

pub const JSON_TRANSCRIPT: &str = "transcript.json";
pub const TEXT_TRANSCRIPT: &str = "transcript.txt";

/// Paths written by [`save_transcript`].
#[derive(Debug, Clone)]
pub struct SavedTranscript {
    pub json: PathBuf,
    pub text: PathBuf,
}

/// Write both transcript forms into `dir`, creating it if needed.
pub fn save_transcript<P: AsRef<Path>>(
    messages: &[Utterance],
    dir: P,
) -> Result<SavedTranscript, DialogueError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let lines: Vec<String> = messages.iter().map(Utterance::render).collect();

    let json = dir.join(JSON_TRANSCRIPT);
    fs::write(&json, serde_json::to_string_pretty(&lines)?)?;

    let text = dir.join(TEXT_TRANSCRIPT);
    let mut file = fs::File::create(&text)?;
    for line in &lines {
        writeln!(file, "{}", single_line(line))?;
    }

    Ok(SavedTranscript { json, text })
}

/// Fold embedded line breaks into spaces.
fn single_line(message: &str) -> String {
    message
        .lines()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Read the JSON form back as flattened lines.
pub fn load_transcript<P: AsRef<Path>>(path: P) -> Result<Vec<String>, DialogueError> {
    let content = fs::read_to_string(path.as_ref())?;
    Ok(serde_json::from_str(&content)?)
}
