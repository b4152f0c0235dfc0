use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static CODE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```.*?```").expect("valid code block regex"));
static URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").expect("valid url regex"));
static WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9]+(?:'[A-Za-z]+)?").expect("valid word regex"));
static SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]+").expect("valid sentence regex"));

const IMAGE_SUFFIXES: &[&str] = &[".jpg", ".jpeg", ".png"];

/// Content features of an issue title and body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextFeatures {
    /// Characters in the title after code removal.
    pub len_title: usize,
    /// Characters in the body after code removal.
    pub len_body: usize,
    pub n_code_snips: usize,
    pub n_urls: usize,
    pub n_imgs: usize,
    pub readability: Readability,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Readability {
    pub flesch_reading_ease: f64,
    pub flesch_kincaid_grade: f64,
    pub coleman_liau_index: f64,
    pub automated_readability_index: f64,
}

/// Remove fenced code blocks, returning the remaining text and the number removed.
pub fn strip_code_blocks(text: &str) -> (String, usize) {
    let count = CODE_BLOCK.find_iter(text).count();
    (CODE_BLOCK.replace_all(text, " ").into_owned(), count)
}

/// Count bare URLs as `(links, images)`. Images are URLs ending in a picture suffix.
pub fn count_urls(text: &str) -> (usize, usize) {
    URL.find_iter(text).fold((0, 0), |(links, imgs), m| {
        let url = m
            .as_str()
            .trim_end_matches(|c: char| ".,;:!?)]>\"'".contains(c))
            .to_ascii_lowercase();
        if IMAGE_SUFFIXES.iter().any(|suffix| url.ends_with(suffix)) {
            (links, imgs + 1)
        } else {
            (links + 1, imgs)
        }
    })
}

pub fn strip_urls(text: &str) -> String {
    URL.replace_all(text, " ").into_owned()
}

fn syllables(word: &str) -> usize {
    let lower = word.to_ascii_lowercase();
    let mut count = 0;
    let mut prev_vowel = false;
    for c in lower.chars() {
        let vowel = matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
        if vowel && !prev_vowel {
            count += 1;
        }
        prev_vowel = vowel;
    }
    if count > 1 && lower.ends_with('e') && !lower.ends_with("le") {
        count -= 1;
    }
    count.max(1)
}

/// Standard readability indices. Text without words scores 0.0 on every index.
pub fn readability(text: &str) -> Readability {
    let words: Vec<&str> = WORD.find_iter(text).map(|m| m.as_str()).collect();
    if words.is_empty() {
        return Readability::default();
    }

    let n_words = words.len() as f64;
    let n_sentences = SENTENCE_END
        .split(text)
        .filter(|s| WORD.is_match(s))
        .count()
        .max(1) as f64;
    let n_syllables = words.iter().map(|w| syllables(w)).sum::<usize>() as f64;
    let n_chars = words
        .iter()
        .map(|w| w.chars().filter(|c| c.is_ascii_alphanumeric()).count())
        .sum::<usize>() as f64;

    let words_per_sentence = n_words / n_sentences;
    let syllables_per_word = n_syllables / n_words;
    let letters_per_100 = n_chars / n_words * 100.0;
    let sentences_per_100 = n_sentences / n_words * 100.0;

    Readability {
        flesch_reading_ease: 206.835 - 1.015 * words_per_sentence - 84.6 * syllables_per_word,
        flesch_kincaid_grade: 0.39 * words_per_sentence + 11.8 * syllables_per_word - 15.59,
        coleman_liau_index: 0.0588 * letters_per_100 - 0.296 * sentences_per_100 - 15.8,
        automated_readability_index: 4.71 * (n_chars / n_words) + 0.5 * words_per_sentence
            - 21.43,
    }
}

/// Content features of an issue. Code is removed before any length or
/// readability metric, URLs before readability.
pub fn extract(title: Option<&str>, body: Option<&str>) -> TextFeatures {
    let (title, title_snips) = strip_code_blocks(title.unwrap_or_default());
    let (body, body_snips) = strip_code_blocks(body.unwrap_or_default());
    let (n_urls, n_imgs) = count_urls(&body);

    TextFeatures {
        len_title: title.trim().chars().count(),
        len_body: body.trim().chars().count(),
        n_code_snips: title_snips + body_snips,
        n_urls,
        n_imgs,
        readability: readability(&strip_urls(&body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_blocks_is_non_greedy() {
        let text = "before\n```rust\nfn a() {}\n```\nmiddle\n```\nb\n```\nafter";
        let (stripped, count) = strip_code_blocks(text);
        assert_eq!(count, 2);
        assert!(stripped.contains("middle"));
        assert!(!stripped.contains("fn a"));
    }

    #[test]
    fn test_count_urls_classifies_images() {
        let text = "see https://example.com/page and https://i.imgur.com/x.PNG, \
                    plus (https://example.com/shot.jpeg) and http://a.b/c.jpg.";
        assert_eq!(count_urls(text), (1, 3));
    }

    #[test]
    fn test_urls_inside_code_are_ignored() {
        let features = extract(None, Some("```\nhttps://example.com/a.png\n```"));
        assert_eq!(features.n_code_snips, 1);
        assert_eq!(features.n_imgs, 0);
        assert_eq!(features.n_urls, 0);
    }

    #[test]
    fn test_readability_of_empty_text_is_zero() {
        assert_eq!(readability(""), Readability::default());
        assert_eq!(readability("... !?"), Readability::default());

        let features = extract(Some(""), None);
        assert_eq!(features.len_body, 0);
        assert_eq!(features.readability, Readability::default());

        let only_links = extract(None, Some("https://x.y ```let a = 1;```"));
        assert_eq!(only_links.readability, Readability::default());
    }

    #[test]
    fn test_readability_simple_sentence() {
        let r = readability("The cat sat on the mat.");
        // Six one-syllable words in one sentence.
        let expected = 206.835 - 1.015 * 6.0 - 84.6;
        assert!((r.flesch_reading_ease - expected).abs() < 1e-9);
        assert!(r.flesch_kincaid_grade < 0.0);
    }

    #[test]
    fn test_syllables() {
        assert_eq!(syllables("cat"), 1);
        assert_eq!(syllables("table"), 2);
        assert_eq!(syllables("make"), 1);
        assert_eq!(syllables("readability"), 5);
    }
}
