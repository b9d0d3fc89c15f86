//! Review text sentiment
//!
//! Scores reviews with VADER (valence aware dictionary and sentiment reasoner). The
//! compound score already folds in negation, intensifiers, "but" clauses, capitalisation
//! and punctuation emphasis, and is normalised into [-1, 1].

use vader_sentiment::SentimentIntensityAnalyzer;

/// Scores free text with a compound polarity in [-1, 1]
pub trait SentimentScorer: Send + Sync {
    fn polarity(&self, text: &str) -> f64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VaderSentiment;

impl VaderSentiment {
    pub fn new() -> Self {
        Self
    }
}

impl SentimentScorer for VaderSentiment {
    fn polarity(&self, text: &str) -> f64 {
        if text.trim().is_empty() {
            return 0.0;
        }
        // The analyzer only borrows the shared lexicon, so building one per call is cheap
        let analyzer = SentimentIntensityAnalyzer::new();
        let scores = analyzer.polarity_scores(text);
        scores
            .get("compound")
            .copied()
            .filter(|c| c.is_finite())
            .unwrap_or(0.0)
            .clamp(-1.0, 1.0)
    }
}

/// Map a polarity in [-1, 1] onto the 0..=5 rating scale
pub fn rescale_to_rating(polarity: f64) -> f64 {
    (polarity.clamp(-1.0, 1.0) + 1.0) * 2.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neutral_text_scores_zero() {
        let scorer = VaderSentiment::new();
        assert_eq!(scorer.polarity("arrived on tuesday in a box"), 0.0);
        assert_eq!(scorer.polarity(""), 0.0);
        assert_eq!(scorer.polarity("   "), 0.0);
    }

    #[test]
    fn test_everyday_praise_is_positive() {
        let scorer = VaderSentiment::new();
        for text in [
            "Works well, very useful and reliable",
            "Fast shipping, fits perfectly, highly recommended",
            "I love it, excellent quality",
            "Good value for the price",
        ] {
            let p = scorer.polarity(text);
            assert!(p > 0.0, "{:?} scored {}", text, p);
        }
    }

    #[test]
    fn test_complaints_are_negative() {
        let scorer = VaderSentiment::new();
        assert!(scorer.polarity("Terrible, broke after a day. Awful waste of money") < 0.0);
        assert!(scorer.polarity("This is not good") < 0.0);
    }

    #[test]
    fn test_clause_after_but_dominates() {
        let scorer = VaderSentiment::new();
        assert!(scorer.polarity("The product is good, but the battery is terrible") < 0.0);
        assert!(scorer.polarity("The battery is terrible, but the product is great") > 0.0);
    }

    #[test]
    fn test_intensity_raises_magnitude() {
        let scorer = VaderSentiment::new();
        let plain = scorer.polarity("The screen is good");
        let boosted = scorer.polarity("The screen is extremely good!!!");
        assert!(boosted > plain);
        assert!(boosted <= 1.0);
    }

    #[test]
    fn test_rescale_to_rating_bounds() {
        assert_eq!(rescale_to_rating(-1.0), 0.0);
        assert_eq!(rescale_to_rating(0.0), 2.5);
        assert_eq!(rescale_to_rating(1.0), 5.0);
        assert_eq!(rescale_to_rating(3.0), 5.0);
    }
}
