//! Dictionary-driven segmentation for unspaced CJK text.

use crate::retrieval::text::keywords::is_han;

/// Split `text` into index tokens by forward maximum matching.
///
/// Han runs are segmented greedily: at each position the longest prefix (up to
/// `max_word_chars`) accepted by `is_word` becomes a token, otherwise a single
/// character does. Runs of other alphanumerics become one lowercase token each.
/// Everything else separates tokens.
///
/// # Errors
/// Propagates the first error returned by `is_word`.
pub fn forward_maximum_match<E>(
    text: &str,
    max_word_chars: usize,
    mut is_word: impl FnMut(&str) -> Result<bool, E>,
) -> Result<Vec<String>, E> {
    let mut tokens = Vec::new();
    let mut han_run: Vec<char> = Vec::new();
    let mut latin_run = String::new();

    for ch in text.chars().chain(std::iter::once(' ')) {
        if is_han(ch) {
            flush_latin(&mut latin_run, &mut tokens);
            han_run.push(ch);
        } else if ch.is_alphanumeric() {
            segment_han(&han_run, max_word_chars, &mut is_word, &mut tokens)?;
            han_run.clear();
            latin_run.extend(ch.to_lowercase());
        } else {
            flush_latin(&mut latin_run, &mut tokens);
            segment_han(&han_run, max_word_chars, &mut is_word, &mut tokens)?;
            han_run.clear();
        }
    }

    Ok(tokens)
}

fn flush_latin(run: &mut String, tokens: &mut Vec<String>) {
    if !run.is_empty() {
        tokens.push(std::mem::take(run));
    }
}

fn segment_han<E>(
    run: &[char],
    max_word_chars: usize,
    is_word: &mut impl FnMut(&str) -> Result<bool, E>,
    tokens: &mut Vec<String>,
) -> Result<(), E> {
    let mut start = 0;
    while start < run.len() {
        let longest = max_word_chars.min(run.len() - start);
        let mut width = 1;
        for candidate in (2..=longest).rev() {
            let word: String = run[start..start + candidate].iter().collect();
            if is_word(&word)? {
                width = candidate;
                break;
            }
        }
        tokens.push(run[start..start + width].iter().collect());
        start += width;
    }
    Ok(())
}
