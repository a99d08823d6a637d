use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::hash::{self, Fingerprint};

const TEXT_WEIGHT: f64 = 1.45;
const IMAGE_WEIGHT: f64 = 1.10;
const BONUS_WEIGHT: f64 = 0.80;
const OFFSET: f64 = 0.55;
const STEEPNESS: f64 = 2.1;

pub const CATEGORY_BONUS: f64 = 0.06;
/// Text score the title must beat before the category bonus applies.
const CATEGORY_BONUS_MIN_TEXT: f64 = 0.40;
/// Image similarity above which the match is worth mentioning.
const IMAGE_REASON_MIN: f64 = 0.70;

static CATEGORY: Lazy<Regex> =
    Lazy::new(|| Regex::new("(?i)hoodie|sweat|jogger|pullover|crewneck").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub text: f64,
    pub image: f64,
    pub bonus: f64,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Fuse the three signals into one probability.
pub fn combine(text: f64, image: f64, bonus: f64) -> f64 {
    let z = TEXT_WEIGHT * text + IMAGE_WEIGHT * image + BONUS_WEIGHT * bonus - OFFSET;
    sigmoid(STEEPNESS * z).clamp(0.0, 1.0)
}

/// Small boost for apparel listings that already look like the brand.
pub fn category_bonus(raw_title: &str, text_score: f64) -> f64 {
    if text_score > CATEGORY_BONUS_MIN_TEXT && CATEGORY.is_match(raw_title) {
        CATEGORY_BONUS
    } else {
        0.0
    }
}

/// Similarity of `fp` to the closest reference, with a reason when it is
/// close enough to mention.
pub fn image_similarity(fp: Fingerprint, references: &[Fingerprint]) -> (f64, Option<String>) {
    let Some(distance) = hash::min_distance(fp, references) else {
        return (0.0, None);
    };

    let similarity = hash::similarity(distance);
    let reason = (similarity > IMAGE_REASON_MIN).then(|| {
        format!(
            "Image hash similar to reference ({}%)",
            (similarity * 100.0).round()
        )
    });

    (similarity, reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_floor_and_ceiling() {
        let floor = combine(0.0, 0.0, 0.0);
        assert!((floor - sigmoid(2.1 * -0.55)).abs() < 1e-12);
        assert!((floor - 0.2396).abs() < 1e-3);

        let ceiling = combine(1.0, 1.0, 0.06);
        // z = 2.048, 2.1z = 4.3008
        assert!(ceiling > 0.98 && ceiling < 1.0);
    }

    #[test]
    fn test_combine_monotonic() {
        let grid = [0.0, 0.1, 0.25, 0.4, 0.55, 0.7, 0.85, 1.0];
        for &a in &grid {
            for &b in &grid {
                for pair in grid.windows(2) {
                    let (lo, hi) = (pair[0], pair[1]);
                    assert!(combine(lo, a, b.min(0.06)) <= combine(hi, a, b.min(0.06)));
                    assert!(combine(a, lo, b.min(0.06)) <= combine(a, hi, b.min(0.06)));
                }
                assert!(combine(a, b, 0.0) <= combine(a, b, 0.06));
            }
        }
    }

    #[test]
    fn test_single_strong_signal() {
        // brand + apparel title with no image
        let score = combine(0.65, 0.0, 0.06);
        assert!(score > 0.7 && score < 0.72, "{score}");
    }

    #[test]
    fn test_category_bonus_needs_both_conditions() {
        assert_eq!(category_bonus("Comfrt Crewneck", 0.55), CATEGORY_BONUS);
        assert_eq!(category_bonus("Comfrt SWEATPANTS", 0.41), CATEGORY_BONUS);
        assert_eq!(category_bonus("Comfrt Crewneck", 0.40), 0.0);
        assert_eq!(category_bonus("Comfrt Blanket", 0.9), 0.0);
    }

    #[test]
    fn test_image_similarity_reason() {
        let refs = [Fingerprint(0), Fingerprint(u64::MAX)];

        let (sim, reason) = image_similarity(Fingerprint(0b1111), &refs);
        assert_eq!(sim, 1.0 - 4.0 / 64.0);
        assert_eq!(reason.as_deref(), Some("Image hash similar to reference (94%)"));

        // 32 bits away from both references
        let (sim, reason) = image_similarity(Fingerprint(0xFFFF_FFFF), &refs);
        assert_eq!(sim, 0.5);
        assert!(reason.is_none());

        assert_eq!(image_similarity(Fingerprint(1), &[]), (0.0, None));
    }
}
