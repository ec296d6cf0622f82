//! Evaluates every signature check in a registry against a fetched document.

use tracing::trace;

use crate::document::FetchedDocument;
use crate::signatures::{CheckKind, CmsProfile, SignatureCheck, SignatureRegistry};

/// Accumulated evidence for one profile that matched at least one check.
#[derive(Debug, Clone)]
pub struct ProfileMatch<'r> {
    pub profile: &'r CmsProfile,
    /// Sum of the weights of every matched check.
    pub score: u32,
    /// Descriptions of the matched checks, in catalog order.
    pub signals: Vec<String>,
}

impl SignatureCheck {
    /// Whether this check fires for `doc`.
    pub fn matches(&self, doc: &FetchedDocument) -> bool {
        match self.kind {
            CheckKind::Header => self
                .header_name
                .as_deref()
                .and_then(|name| doc.header(name))
                .map(|value| self.pattern.is_match(&value))
                .unwrap_or(false),
            CheckKind::Cookie => {
                doc.cookies.keys().any(|name| self.pattern.is_match(name))
                    || doc.raw_set_cookies.iter().any(|raw| self.pattern.is_match(raw))
            }
            CheckKind::Html => !doc.body.is_empty() && self.pattern.is_match(&doc.body),
            CheckKind::MetaGenerator => doc
                .generator()
                .map(|content| self.pattern.is_match(content))
                .unwrap_or(false),
            CheckKind::Script => doc.tags.scripts.iter().any(|script| self.pattern.is_match(script)),
            CheckKind::Meta => doc.tags.meta_tags.iter().any(|meta| self.pattern.is_match(meta)),
        }
    }

    /// Signal text reported for a matched check.
    ///
    /// Generator checks report the literal tag content so the caller sees the
    /// version string the site advertises.
    pub fn describe(&self, doc: &FetchedDocument) -> String {
        match (self.kind, doc.generator()) {
            (CheckKind::MetaGenerator, Some(content)) => format!("meta_generator: {}", content),
            _ => self.description.clone(),
        }
    }
}

/// Scores `profile` against `doc`, or `None` when nothing matched.
pub fn match_profile<'r>(profile: &'r CmsProfile, doc: &FetchedDocument) -> Option<ProfileMatch<'r>> {
    let mut score = 0;
    let mut signals = Vec::new();

    for check in &profile.checks {
        if check.matches(doc) {
            trace!("{} matched: {}", profile.name, check.description);
            score += check.weight;
            signals.push(check.describe(doc));
        }
    }

    if score == 0 {
        None
    } else {
        Some(ProfileMatch {
            profile,
            score,
            signals,
        })
    }
}

/// Matches every profile in catalog order, keeping only those with a positive score.
pub fn match_document<'r>(registry: &'r SignatureRegistry, doc: &FetchedDocument) -> Vec<ProfileMatch<'r>> {
    registry
        .profiles()
        .iter()
        .filter_map(|profile| match_profile(profile, doc))
        .collect()
}
