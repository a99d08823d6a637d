//! Title matching against the brand token.

use once_cell::sync::Lazy;
use regex::Regex;

pub const TARGET: &str = "comfrt";
/// Generic word that looks like the brand but usually isn't.
const DECOY: &str = "comfort";
const APPAREL: [&str; 5] = ["hoodie", "sweatshirt", "sweatpants", "jogger", "pullover"];

const EXACT_MATCH_WEIGHT: f64 = 0.55;
const FUZZY_MATCH_WEIGHT: f64 = 0.12;
const FUZZY_MATCH_MIN: f64 = 0.72;
const APPAREL_WEIGHT: f64 = 0.05;
const APPAREL_CAP: f64 = 0.15;
const DECOY_PENALTY: f64 = 0.05;

static TRADEMARKS: Lazy<Regex> = Lazy::new(|| Regex::new("[®™©]").unwrap());
static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new("[^a-z0-9]+").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct TextScore {
    pub score: f64,
    pub reasons: Vec<String>,
}

/// Lowercase, drop trademark glyphs, collapse every other non-alphanumeric
/// run into one space.
pub fn normalize(title: &str) -> String {
    let lower = title.to_lowercase();
    let stripped = TRADEMARKS.replace_all(&lower, "");
    NON_ALNUM.replace_all(&stripped, " ").trim().to_string()
}

/// Whole-word match on an already normalized title.
fn contains_word(title: &str, word: &str) -> bool {
    title.split(' ').any(|w| w == word)
}

/// Score a listing title. The terms are independent, so their order only
/// affects the order of `reasons`.
pub fn score_text(title: &str) -> TextScore {
    let title = normalize(title);
    let mut reasons = Vec::new();
    let mut score = 0.0;

    if contains_word(&title, TARGET) {
        score += EXACT_MATCH_WEIGHT;
        reasons.push(format!("Contains \"{TARGET}\" in the listing title"));
    }

    let similarity = strsim::normalized_levenshtein(&title, TARGET);
    if similarity > FUZZY_MATCH_MIN {
        score += FUZZY_MATCH_WEIGHT;
        reasons.push(format!(
            "Title similar to \"{TARGET}\" (sim {:.0}%)",
            similarity * 100.0
        ));
    }

    let apparel: Vec<&str> = APPAREL
        .iter()
        .copied()
        .filter(|kw| title.contains(kw))
        .collect();
    if !apparel.is_empty() {
        score += APPAREL_CAP.min(APPAREL_WEIGHT * apparel.len() as f64);
        let shown: Vec<&str> = apparel.iter().take(3).copied().collect();
        reasons.push(format!("Apparel keywords: {}", shown.join(", ")));
    }

    if contains_word(&title, DECOY) {
        score -= DECOY_PENALTY;
    }

    TextScore {
        score: score.clamp(0.0, 1.0),
        reasons,
    }
}
