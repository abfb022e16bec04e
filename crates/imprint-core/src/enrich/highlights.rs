//! Recommended highlight extraction
//!
//! Picks up to three sentence-level spans from the note that are worth
//! surfacing: length inside the 12-40 token band and presence of salience
//! keywords. Short notes are returned whole.

/// Maximum recommended spans per record
pub const MAX_RECOMMENDED: usize = 3;

/// Notes shorter than this are a single span
const SHORT_NOTE_CHARS: usize = 100;

/// Token band a good span falls into
const TARGET_TOKENS: std::ops::RangeInclusive<usize> = 12..=40;

const SALIENCE_KEYWORDS: &[&str] = &["important", "key", "main", "crucial", "significant"];

/// Extract recommended highlight spans from a note
pub fn recommend_highlights(note: &str) -> Vec<String> {
    let trimmed = note.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed.chars().count() < SHORT_NOTE_CHARS {
        return vec![trimmed.to_string()];
    }

    let mut scored: Vec<(String, u32, usize)> = Vec::new();
    for (position, sentence) in split_sentences(trimmed).enumerate() {
        let mut score = 0u32;
        let token_count = sentence.split_whitespace().count();
        if TARGET_TOKENS.contains(&token_count) {
            score += 2;
        }
        let lower = sentence.to_lowercase();
        for keyword in SALIENCE_KEYWORDS {
            if lower.contains(keyword) {
                score += 1;
            }
        }
        if score > 0 {
            scored.push((sentence.to_string(), score, position));
        }
    }

    // Highest score first; document order within equal scores
    scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    scored
        .into_iter()
        .take(MAX_RECOMMENDED)
        .map(|(sentence, _, _)| sentence)
        .collect()
}

fn split_sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
