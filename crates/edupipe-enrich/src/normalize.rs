//! Segment and result normalization.
//!
//! Pure functions: identical raw input always yields identical output,
//! so write-backs stay idempotent under at-least-once processing.

use std::collections::HashSet;

use edupipe_models::{TagResult, TranscriptSegment, WordToken, INSUFFICIENT_TRANSCRIPT, NOT_EDUCATIONAL};

/// Gap between consecutive tokens that closes a segment.
pub const SEGMENT_GAP_MS: u64 = 1000;

/// The fixed onboarding bucket ids a category assignment may resolve to.
pub const ONBOARDING_BUCKETS: [&str; 16] = [
    "ancient_civilizations",
    "art_history",
    "astrophysics",
    "biology_life_sciences",
    "economics_money",
    "fun_facts",
    "geography",
    "how_things_work",
    "lab_experiments",
    "math_physics",
    "other",
    "philosophy",
    "psychology",
    "technology_ai",
    "words_languages",
    "world_history",
];

/// Group word-level tokens into phrase segments.
///
/// A segment closes on trailing punctuation, on a gap larger than
/// [`SEGMENT_GAP_MS`] before the next token, and always at the last
/// token. Blank segments are dropped. After a close, the next segment
/// starts at the next token's start offset, so consecutive segments
/// never overlap.
pub fn group_words_into_segments(words: &[WordToken]) -> Vec<TranscriptSegment> {
    let first = match words.first() {
        Some(w) => w,
        None => return Vec::new(),
    };

    let mut segments = Vec::new();
    let mut text = String::new();
    let mut start = first.start;
    let mut last_end = 0;

    for (i, word) in words.iter().enumerate() {
        text.push_str(&word.text);
        text.push(' ');
        last_end = word.end;

        let next = words.get(i + 1);
        let is_punctuation = word.text.ends_with(['.', '!', '?', ',', ';']);
        let has_gap = next.is_some_and(|n| n.start.saturating_sub(word.end) > SEGMENT_GAP_MS);
        let is_last = next.is_none();

        if is_punctuation || has_gap || is_last {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                segments.push(TranscriptSegment {
                    start,
                    end: last_end,
                    text: trimmed.to_string(),
                });
            }
            text.clear();
            start = next.map_or(last_end, |n| n.start);
        }
    }

    segments
}

/// Clamp a confidence score into the closed interval [0, 1].
/// Non-finite values collapse to 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Normalize a classification result.
///
/// Every confidence is clamped into [0, 1]. When an allowed-label set is
/// given, category tags outside it are dropped (the sentinel labels
/// always pass); topics are free-form and never filtered.
pub fn normalize_tags(mut result: TagResult, allowed: Option<&HashSet<String>>) -> TagResult {
    for category in &mut result.categories {
        category.confidence = clamp_confidence(category.confidence);
    }
    for topic in &mut result.topics {
        topic.confidence = clamp_confidence(topic.confidence);
    }

    if let Some(allowed) = allowed {
        result.categories.retain(|c| {
            allowed.contains(&c.tag)
                || c.tag == INSUFFICIENT_TRANSCRIPT
                || c.tag == NOT_EDUCATIONAL
        });
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use edupipe_models::{CategoryTag, TopicTag};

    fn token(text: &str, start: u64, end: u64) -> WordToken {
        WordToken::new(text, start, end)
    }

    #[test]
    fn test_empty_input_yields_no_segments() {
        assert!(group_words_into_segments(&[]).is_empty());
    }

    #[test]
    fn test_two_words_closed_by_trailing_punctuation() {
        let words = vec![token("Hello", 0, 500), token("world.", 600, 1100)];
        let segments = group_words_into_segments(&words);

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start, 0);
        assert_eq!(segments[0].end, 1100);
        assert_eq!(segments[0].text, "Hello world.");
    }

    #[test]
    fn test_gap_over_threshold_splits_segments() {
        let words = vec![
            token("first", 0, 400),
            token("part", 450, 900),
            // 1500ms of silence
            token("second", 2400, 2800),
            token("part", 2850, 3200),
        ];
        let segments = group_words_into_segments(&words);

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "first part");
        assert_eq!(segments[0].end, 900);
        assert_eq!(segments[1].start, 2400);
        assert_eq!(segments[1].text, "second part");
    }

    #[test]
    fn test_gap_exactly_at_threshold_does_not_split() {
        let words = vec![token("one", 0, 100), token("two", 1100, 1300)];
        let segments = group_words_into_segments(&words);
        assert_eq!(segments.len(), 1);
    }

    #[test]
    fn test_last_token_always_closes_without_punctuation() {
        let words = vec![token("trailing", 0, 300), token("words", 350, 700)];
        let segments = group_words_into_segments(&words);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "trailing words");
        assert_eq!(segments[0].end, 700);
    }

    #[test]
    fn test_segments_are_contiguous() {
        let words = vec![
            token("So,", 0, 200),
            token("today", 250, 600),
            token("we", 620, 700),
            token("learn.", 720, 1200),
            token("Next", 2500, 2900),
            token("topic!", 2950, 3400),
        ];
        let segments = group_words_into_segments(&words);

        assert!(!segments.is_empty());
        for pair in segments.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
        for segment in &segments {
            assert!(!segment.text.trim().is_empty());
        }
    }

    #[test]
    fn test_whitespace_only_tokens_are_discarded() {
        let words = vec![token(" ", 0, 100), token("", 2000, 2100)];
        let segments = group_words_into_segments(&words);
        assert!(segments.is_empty());
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let words = vec![
            token("Repeat", 0, 300),
            token("after", 350, 600),
            token("me.", 650, 1000),
            token("Done", 2200, 2600),
        ];
        let once = group_words_into_segments(&words);
        let twice = group_words_into_segments(&words);
        assert_eq!(once, twice);

        let tags = TagResult {
            categories: vec![CategoryTag {
                tag: "science".into(),
                confidence: 1.7,
            }],
            topics: vec![TopicTag {
                topic: "photosynthesis".into(),
                confidence: -0.2,
            }],
        };
        let once = normalize_tags(tags.clone(), None);
        let twice = normalize_tags(once.clone(), None);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_confidence_clamped_into_unit_interval() {
        let tags = TagResult {
            categories: vec![
                CategoryTag {
                    tag: "science".into(),
                    confidence: 1.5,
                },
                CategoryTag {
                    tag: "history".into(),
                    confidence: -3.0,
                },
            ],
            topics: vec![TopicTag {
                topic: "gravity".into(),
                confidence: f64::NAN,
            }],
        };

        let normalized = normalize_tags(tags, None);
        for c in &normalized.categories {
            assert!((0.0..=1.0).contains(&c.confidence));
        }
        assert_eq!(normalized.categories[0].confidence, 1.0);
        assert_eq!(normalized.categories[1].confidence, 0.0);
        assert_eq!(normalized.topics[0].confidence, 0.0);
    }

    #[test]
    fn test_allowed_set_filters_unknown_categories() {
        let allowed: HashSet<String> =
            ONBOARDING_BUCKETS.iter().map(|s| s.to_string()).collect();
        let tags = TagResult {
            categories: vec![
                CategoryTag {
                    tag: "astrophysics".into(),
                    confidence: 0.9,
                },
                CategoryTag {
                    tag: "underwater_basket_weaving".into(),
                    confidence: 0.8,
                },
                CategoryTag {
                    tag: INSUFFICIENT_TRANSCRIPT.into(),
                    confidence: 1.0,
                },
            ],
            topics: vec![TopicTag {
                topic: "free form topic".into(),
                confidence: 0.5,
            }],
        };

        let normalized = normalize_tags(tags, Some(&allowed));
        let labels: Vec<&str> = normalized.categories.iter().map(|c| c.tag.as_str()).collect();
        assert_eq!(labels, vec!["astrophysics", INSUFFICIENT_TRANSCRIPT]);
        // Topics pass through untouched.
        assert_eq!(normalized.topics.len(), 1);
    }
}
