//! Winner selection, confidence and version extraction.

use serde::{Deserialize, Serialize};

use crate::document::FetchedDocument;
use crate::matching::{match_document, ProfileMatch};
use crate::signatures::{CmsProfile, SignatureRegistry};

/// Outcome of scoring one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub cms: Option<String>,
    /// 0 to 100; 0 exactly when `cms` is `None`.
    pub confidence: u8,
    pub signals: Vec<String>,
    pub version: Option<String>,
}

impl DetectionResult {
    /// The "no CMS detected" result.
    pub fn undetected() -> Self {
        Self::default()
    }

    pub fn is_detected(&self) -> bool {
        self.cms.is_some()
    }
}

/// Percentage of `max_score` reached by `score`, floored and capped at 100.
pub fn confidence(score: u32, max_score: u32) -> u8 {
    if max_score == 0 {
        return 0;
    }
    let percent = u64::from(score) * 100 / u64::from(max_score);
    percent.min(100) as u8
}

/// Picks the highest-scoring match; the first to reach the maximum wins ties.
pub fn select_winner<'a, 'r>(matches: &'a [ProfileMatch<'r>]) -> Option<&'a ProfileMatch<'r>> {
    let mut best: Option<&ProfileMatch<'r>> = None;
    for candidate in matches {
        match best {
            Some(current) if candidate.score <= current.score => {}
            _ => best = Some(candidate),
        }
    }
    best
}

/// Turns per-profile matches into a [`DetectionResult`].
pub fn score_matches(matches: &[ProfileMatch<'_>], threshold: u32, doc: &FetchedDocument) -> DetectionResult {
    let winner = match select_winner(matches) {
        Some(winner) if winner.score >= threshold => winner,
        _ => return DetectionResult::undetected(),
    };

    DetectionResult {
        cms: Some(winner.profile.name.clone()),
        // A reported CMS never carries confidence 0, even for very heavy custom profiles.
        confidence: confidence(winner.score, winner.profile.max_score()).max(1),
        signals: winner.signals.clone(),
        version: extract_version(winner.profile, doc),
    }
}

/// Runs matching and scoring for one document.
pub fn detect_cms(registry: &SignatureRegistry, doc: &FetchedDocument) -> DetectionResult {
    let matches = match_document(registry, doc);
    score_matches(&matches, registry.threshold(), doc)
}

/// Version advertised in the generator tag, when the profile knows how to read it.
pub fn extract_version(profile: &CmsProfile, doc: &FetchedDocument) -> Option<String> {
    let pattern = profile.version_pattern.as_ref()?;
    let content = doc.generator()?;
    pattern
        .captures(content)
        .and_then(|captures| captures.get(1))
        .map(|version| version.as_str().to_string())
}
