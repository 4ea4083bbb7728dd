use std::collections::BTreeSet;

/// Canonical form used for cache keys: lowercase, collapsed whitespace,
/// trailing punctuation removed.
pub fn normalize_request(request: &str) -> String {
    let collapsed = request
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    collapsed
        .trim_end_matches(|c: char| matches!(c, '?' | '!' | '.' | '。' | '？' | '！'))
        .trim()
        .to_string()
}

fn tokens(normalized: &str) -> BTreeSet<String> {
    normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity of the two token sets. Symmetric and deterministic;
/// two empty inputs are identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() && tb.is_empty() {
        return 1.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_collapses_case_space_and_punctuation() {
        assert_eq!(
            normalize_request("  What is   the Weather in Tokyo?? "),
            "what is the weather in tokyo"
        );
    }

    #[test]
    fn similarity_is_commutative_and_bounded() {
        let pairs = [
            ("latest rust release", "rust latest release notes"),
            ("a b c", "x y z"),
            ("", "something"),
        ];
        for (a, b) in pairs {
            let ab = similarity(a, b);
            let ba = similarity(b, a);
            assert_eq!(ab, ba);
            assert!((0.0..=1.0).contains(&ab));
        }
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("same words", "words same"), 1.0);
        assert!((similarity("latest rust release", "rust latest release notes") - 0.75).abs() < 1e-9);
    }
}
