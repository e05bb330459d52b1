use crate::config::DEFAULT_MOTIF_WHITELIST;
use std::collections::HashSet;

/// Motif code for a whitelisted cancellation reason.
pub const MOTIF_WHITELISTED: u8 = 0;
/// Motif code for any other reason, including a missing one.
pub const MOTIF_OTHER: u8 = 1;

/// Maps the free-text cancellation reason to a binary category.
///
/// Matching is exact and case-sensitive; no trimming or normalization.
#[derive(Debug, Clone)]
pub struct MotifClassifier {
    whitelist: HashSet<String>,
}

impl MotifClassifier {
    pub fn new<I, S>(whitelist: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            whitelist: whitelist.into_iter().map(Into::into).collect(),
        }
    }

    pub fn classify(&self, motif: Option<&str>) -> u8 {
        match motif {
            Some(text) if self.whitelist.contains(text) => MOTIF_WHITELISTED,
            _ => MOTIF_OTHER,
        }
    }
}

impl Default for MotifClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_MOTIF_WHITELIST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_whitelist() {
        let classifier = MotifClassifier::default();
        for motif in DEFAULT_MOTIF_WHITELIST {
            assert_eq!(classifier.classify(Some(motif)), 0, "{motif}");
        }
        assert_eq!(classifier.classify(Some("Résiliation suite SWAP GPON")), 0);
        assert_eq!(classifier.classify(Some("Résilliation IP fixe avec réservation")), 0);
    }

    #[test]
    fn test_non_matching_and_missing() {
        let classifier = MotifClassifier::default();
        assert_eq!(classifier.classify(None), 1);
        assert_eq!(classifier.classify(Some("")), 1);
        assert_eq!(classifier.classify(Some("Déménagement")), 1);
        // Case and surrounding whitespace matter.
        assert_eq!(classifier.classify(Some("autres")), 1);
        assert_eq!(classifier.classify(Some("Autres ")), 1);
    }

    #[test]
    fn test_custom_whitelist() {
        let classifier = MotifClassifier::new(vec!["Déménagement"]);
        assert_eq!(classifier.classify(Some("Déménagement")), 0);
        assert_eq!(classifier.classify(Some("Autres")), 1);
    }
}
