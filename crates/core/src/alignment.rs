//! Lyric alignment task types.
//!
//! Only characters in the configured [`AlignableCharset`] may receive a
//! fine-grained timing highlight. The default set is ASCII lowercase letters
//! plus the apostrophe; digits, punctuation and non-Latin scripts are left
//! untimed. That restriction is intentional and kept configurable rather than
//! widened implicitly.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::config::default_alignable_chars;

/// One timed line of lyrics as sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyricLine {
    /// Milliseconds from track start.
    #[serde(rename = "startTime")]
    pub start_time_ms: f64,
    #[serde(rename = "endTime")]
    pub end_time_ms: f64,
    pub text: String,
}

fn default_reference() -> String {
    ReferenceTrack::Vocals.as_str().to_string()
}

/// Body of an alignment request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignmentTask {
    pub lyrics: Vec<LyricLine>,
    #[serde(default = "default_reference")]
    pub reference: String,
    pub input_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown reference track '{0}' (expected vocals, instrumental or combined)")]
pub struct UnknownReference(pub String);

/// Which cached file the aligner listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceTrack {
    Vocals,
    Instrumental,
    /// The original upload.
    Combined,
}

impl ReferenceTrack {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vocals => "vocals",
            Self::Instrumental => "instrumental",
            Self::Combined => "combined",
        }
    }
}

impl FromStr for ReferenceTrack {
    type Err = UnknownReference;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vocals" => Ok(Self::Vocals),
            "instrumental" => Ok(Self::Instrumental),
            "combined" => Ok(Self::Combined),
            other => Err(UnknownReference(other.to_string())),
        }
    }
}

impl fmt::Display for ReferenceTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of characters eligible for timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignableCharset {
    chars: HashSet<char>,
}

impl AlignableCharset {
    pub fn new(chars: &str) -> Self {
        Self {
            chars: chars.chars().collect(),
        }
    }

    pub fn is_alignable(&self, c: char) -> bool {
        self.chars.contains(&c)
    }

    /// Per-character eligibility for `word`.
    pub fn mask(&self, word: &str) -> Vec<bool> {
        word.chars().map(|c| self.is_alignable(c)).collect()
    }

    /// `word` with ineligible characters removed.
    pub fn alignable(&self, word: &str) -> String {
        word.chars().filter(|c| self.is_alignable(*c)).collect()
    }
}

impl Default for AlignableCharset {
    fn default() -> Self {
        Self::new(&default_alignable_chars())
    }
}

/// One whitespace-separated word of a lyric line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LyricSegment {
    pub word: String,
    pub alignable: String,
    pub mask: Vec<bool>,
}

impl LyricSegment {
    pub fn new(word: &str, charset: &AlignableCharset) -> Self {
        Self {
            word: word.to_string(),
            alignable: charset.alignable(word),
            mask: charset.mask(word),
        }
    }
}

/// A line handed to the aligner, timed in seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignmentSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Everything the external aligner receives.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignmentRequest {
    pub audio_path: PathBuf,
    pub segments: Vec<AlignmentSegment>,
    pub words: Vec<LyricSegment>,
}

impl LyricLine {
    pub fn segments(&self, charset: &AlignableCharset) -> Vec<LyricSegment> {
        self.text
            .split_whitespace()
            .map(|word| LyricSegment::new(word, charset))
            .collect()
    }

    pub fn to_alignment_segment(&self) -> AlignmentSegment {
        AlignmentSegment {
            start: self.start_time_ms / 1000.0,
            end: self.end_time_ms / 1000.0,
            text: self.text.clone(),
        }
    }
}

impl AlignmentTask {
    /// Words of every line, in order.
    pub fn word_segments(&self, charset: &AlignableCharset) -> Vec<LyricSegment> {
        self.lyrics
            .iter()
            .flat_map(|line| line.segments(charset))
            .collect()
    }

    /// Build the aligner input against an already resolved audio file.
    pub fn to_request(&self, audio_path: PathBuf, charset: &AlignableCharset) -> AlignmentRequest {
        AlignmentRequest {
            audio_path,
            segments: self
                .lyrics
                .iter()
                .map(LyricLine::to_alignment_segment)
                .collect(),
            words: self.word_segments(charset),
        }
    }
}
