//! Keyword-density snippet extraction.
//!
//! Picks the excerpt of a chunk that best justifies it as a citation: the
//! fixed-width window containing the most keyword matches from the combined
//! query + answer text. The scan only considers windows anchored at match
//! positions; it is deliberately not a true maximum-density search, and the
//! window width stays fixed. Behavior, not optimality, is the contract.
//!
//! All offsets are character offsets. Matching runs over a per-character
//! lowercased copy that stays aligned one-to-one with the original content,
//! so window math never lands inside a UTF-8 sequence.

use std::collections::HashSet;

/// Flat-truncation length used when keyword matching cannot help.
const FALLBACK_CHARS: usize = 150;

/// Extract the densest keyword window from `content`.
///
/// `search_context` is the user query concatenated with the generated
/// answer. `window` is the snippet width in characters and `lead` the
/// context added before the winning match position. Falls back to a flat
/// 150-character truncation when no keywords or no matches exist.
pub fn smart_snippet(content: &str, search_context: &str, window: usize, lead: usize) -> String {
    if content.is_empty() {
        return String::new();
    }

    let keywords = extract_keywords(search_context);
    if keywords.is_empty() {
        return flat_truncate(content);
    }

    let content_chars: Vec<char> = content.chars().collect();
    let lower_chars: Vec<char> = content_chars
        .iter()
        .map(|c| c.to_lowercase().next().unwrap_or(*c))
        .collect();

    let mut positions: Vec<usize> = Vec::new();
    for keyword in &keywords {
        let kw_chars: Vec<char> = keyword.chars().collect();
        let digit_bounded = kw_chars.iter().any(|c| c.is_ascii_digit());
        positions.extend(find_positions(&lower_chars, &kw_chars, digit_bounded));
    }
    positions.sort_unstable();

    if positions.is_empty() {
        return flat_truncate(content);
    }

    // Density scan: each match position is a candidate window start; the
    // first window with the strictly highest match count wins.
    let mut best_start = positions[0];
    let mut max_density = 0usize;
    for i in 0..positions.len() {
        let current_start = positions[i];
        let current_end = current_start + window;
        let density = positions[i..]
            .iter()
            .take_while(|pos| **pos < current_end)
            .count();
        if density > max_density {
            max_density = density;
            best_start = current_start;
        }
    }

    // Expand with leading context; re-anchor when the window hits the end.
    let mut start = best_start.saturating_sub(lead);
    let end = (start + window).min(content_chars.len());
    if end == content_chars.len() {
        start = end.saturating_sub(window);
    }

    let mut snippet: Vec<char> = content_chars[start..end].to_vec();
    let leading_ellipsis = start > 0;
    let trailing_ellipsis = end < content_chars.len();

    // Trim partial words at the cut edges.
    if leading_ellipsis {
        if let Some(idx) = snippet.iter().position(|c| *c == ' ') {
            snippet.drain(..=idx);
        }
    }
    if trailing_ellipsis {
        if let Some(idx) = snippet.iter().rposition(|c| *c == ' ') {
            snippet.truncate(idx);
        }
    }

    let mut out = String::new();
    if leading_ellipsis {
        out.push_str("...");
    }
    out.extend(snippet);
    if trailing_ellipsis {
        out.push_str("...");
    }
    out
}

/// First 150 characters plus an ellipsis, or the content verbatim when it
/// already fits.
fn flat_truncate(content: &str) -> String {
    let chars: Vec<char> = content.chars().collect();
    if chars.len() > FALLBACK_CHARS {
        let mut out: String = chars[..FALLBACK_CHARS].iter().collect();
        out.push_str("...");
        out
    } else {
        content.to_string()
    }
}

/// Keywords: whitespace tokens of the lowercased context that are longer
/// than 3 characters or contain a digit, deduplicated first-occurrence.
fn extract_keywords(search_context: &str) -> Vec<String> {
    let lowered = search_context.to_lowercase();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut keywords = Vec::new();
    for token in lowered.split_whitespace() {
        let relevant = token.chars().count() > 3 || token.chars().any(|c| c.is_ascii_digit());
        if relevant && seen.insert(token) {
            keywords.push(token.to_string());
        }
    }
    keywords
}

/// Non-overlapping left-to-right match positions of `keyword` in `haystack`.
///
/// Digit-bearing keywords match exactly: a hit flanked by another digit is
/// rejected (so "42" never matches inside "142"), and scanning resumes one
/// position later.
fn find_positions(haystack: &[char], keyword: &[char], digit_bounded: bool) -> Vec<usize> {
    let mut positions = Vec::new();
    if keyword.is_empty() || keyword.len() > haystack.len() {
        return positions;
    }

    let mut i = 0;
    while i + keyword.len() <= haystack.len() {
        if haystack[i..i + keyword.len()] == *keyword {
            let after = i + keyword.len();
            let bounded = !digit_bounded
                || ((i == 0 || !haystack[i - 1].is_ascii_digit())
                    && (after == haystack.len() || !haystack[after].is_ascii_digit()));
            if bounded {
                positions.push(i);
                i += keyword.len();
                continue;
            }
        }
        i += 1;
    }
    positions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn keywords_filter_and_dedup() {
        let kws = extract_keywords("How do I fix the fix for bug 7 in the deploy");
        assert_eq!(kws, vec!["7", "deploy"]);

        let kws = extract_keywords("Deployment DEPLOYMENT deployment");
        assert_eq!(kws, vec!["deployment"]);
    }

    #[test]
    fn short_chunk_without_keywords_returned_verbatim() {
        let content = "a".repeat(100);
        assert_eq!(smart_snippet(&content, "an of to it", 200, 40), content);
    }

    #[test]
    fn long_chunk_without_keywords_is_flat_truncated() {
        let content = "b".repeat(400);
        let snippet = smart_snippet(&content, "an of", 200, 40);
        assert_eq!(snippet.chars().count(), 153);
        assert!(snippet.ends_with("..."));
    }

    #[test]
    fn keywords_without_matches_fall_back() {
        let content = "completely unrelated body text";
        let snippet = smart_snippet(content, "zebra quantum 99", 200, 40);
        assert_eq!(snippet, content);
    }

    #[test]
    fn digit_keywords_match_exactly() {
        let positions = find_positions(&chars("42 then 142 then x42y then 42"), &chars("42"), true);
        // "142" is rejected (digit before); "x42y" is accepted (letters are
        // not digit boundaries); standalone hits are accepted.
        assert_eq!(positions, vec![0, 18, 27]);
    }

    #[test]
    fn word_keywords_match_as_substrings() {
        let positions = find_positions(&chars("deploy redeploys deploy"), &chars("deploy"), false);
        assert_eq!(positions, vec![0, 9, 17]);
    }

    #[test]
    fn densest_window_wins() {
        // One lonely early match, then a cluster past it.
        let filler = "xxxx ".repeat(60); // 300 chars, no keyword hits
        let content = format!(
            "alpha only once here. {}alpha beta gamma alpha beta alpha end of cluster",
            filler
        );
        let snippet = smart_snippet(&content, "alpha beta gamma", 200, 40);
        assert!(snippet.contains("beta"), "snippet was: {}", snippet);
        assert!(snippet.starts_with("..."), "snippet was: {}", snippet);
    }

    #[test]
    fn window_at_start_has_no_leading_ellipsis() {
        let content = format!("alpha beta right at the start. {}", "pad ".repeat(80));
        let snippet = smart_snippet(&content, "alpha beta", 200, 40);
        assert!(snippet.starts_with("alpha"));
        assert!(snippet.ends_with("..."));
    }

    #[test]
    fn window_reaching_the_end_is_reanchored() {
        let filler = "word ".repeat(50); // 250 chars
        let content = format!("{}closing remark alpha", filler);
        let snippet = smart_snippet(&content, "alpha", 200, 40);
        assert!(snippet.ends_with("alpha"), "snippet was: {}", snippet);
        assert!(snippet.starts_with("..."));
    }

    #[test]
    fn short_content_with_matches_is_returned_whole() {
        let content = "alpha beta gamma";
        let snippet = smart_snippet(content, "alpha", 200, 40);
        assert_eq!(snippet, content);
    }
}
