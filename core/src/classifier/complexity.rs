use serde::{Deserialize, Serialize};

use super::lexicon::{matched_terms, Lexicon};

/// Scores at or below this are low complexity.
pub const LOW_MAX_SCORE: u32 = 3;
/// Scores at or above this are high complexity.
pub const HIGH_MIN_SCORE: u32 = 8;

pub const PROMPT_TIER_WEIGHT: u32 = 2;
pub const FILE_TIER_WEIGHT: u32 = 2;
pub const WORKFLOW_MARKER_WEIGHT: u32 = 3;
pub const MAX_COUNTED_WORKFLOW_MARKERS: u32 = 2;
pub const KEYWORD_WEIGHT: u32 = 1;
pub const MAX_COUNTED_KEYWORDS: u32 = 5;

/// Upper bounds (exclusive) of prompt-length tiers 0..=2, in characters.
pub const PROMPT_TIER_BOUNDS: [usize; 3] = [100, 500, 1500];
/// Upper bounds (inclusive) of file-count tiers 0..=2.
pub const FILE_TIER_BOUNDS: [usize; 3] = [0, 2, 5];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    pub fn from_score(score: u32) -> Self {
        if score >= HIGH_MIN_SCORE {
            Self::High
        } else if score <= LOW_MAX_SCORE {
            Self::Low
        } else {
            Self::Medium
        }
    }
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexityScore {
    pub score: u32,
    pub level: Complexity,
    pub prompt_tier: u32,
    pub file_tier: u32,
    pub workflow_markers: u32,
    pub keyword_hits: u32,
}

pub fn prompt_tier(chars: usize) -> u32 {
    PROMPT_TIER_BOUNDS
        .iter()
        .position(|&bound| chars < bound)
        .unwrap_or(PROMPT_TIER_BOUNDS.len()) as u32
}

pub fn file_tier(count: usize) -> u32 {
    FILE_TIER_BOUNDS
        .iter()
        .position(|&bound| count <= bound)
        .unwrap_or(FILE_TIER_BOUNDS.len()) as u32
}

/// Weighted sum over prompt length, file count, workflow markers and
/// complexity keywords.
pub fn score(prompt_lower: &str, prompt_chars: usize, file_count: usize, lexicon: &Lexicon) -> ComplexityScore {
    let prompt_tier = prompt_tier(prompt_chars);
    let file_tier = file_tier(file_count);
    let workflow_markers = (matched_terms(prompt_lower, lexicon.workflow_markers).len() as u32)
        .min(MAX_COUNTED_WORKFLOW_MARKERS);
    let keyword_hits =
        (matched_terms(prompt_lower, lexicon.complexity_keywords).len() as u32).min(MAX_COUNTED_KEYWORDS);

    let score = prompt_tier * PROMPT_TIER_WEIGHT
        + file_tier * FILE_TIER_WEIGHT
        + workflow_markers * WORKFLOW_MARKER_WEIGHT
        + keyword_hits * KEYWORD_WEIGHT;

    ComplexityScore {
        score,
        level: Complexity::from_score(score),
        prompt_tier,
        file_tier,
        workflow_markers,
        keyword_hits,
    }
}
