use std::collections::BTreeSet;

/// Levenshtein edit distance over chars, two-row O(min(m,n)) space.
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();
    let (m, n) = (a.len(), b.len());

    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    let (a, b, m, n) = if m <= n { (a, b, m, n) } else { (b, a, n, m) };

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];

    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

/// Lowercase alphanumeric words joined by single spaces.
pub fn normalize_description(s: &str) -> String {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Similarity in [0, 1] of two already normalized descriptions: the larger
/// of the Levenshtein ratio and the Sørensen–Dice coefficient on word sets.
/// Empty input never matches.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let max_len = a.chars().count().max(b.chars().count());
    let ratio = 1.0 - levenshtein_distance(a, b) as f64 / max_len as f64;

    ratio.max(dice(a, b))
}

fn dice(a: &str, b: &str) -> f64 {
    let wa: BTreeSet<&str> = a.split(' ').collect();
    let wb: BTreeSet<&str> = b.split(' ').collect();
    let shared = wa.intersection(&wb).count();
    (2 * shared) as f64 / (wa.len() + wb.len()) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_are_zero() {
        assert_eq!(levenshtein_distance("abc", "abc"), 0);
        assert_eq!(levenshtein_distance("", ""), 0);
    }

    #[test]
    fn empty_string_is_length_of_other() {
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("abc", ""), 3);
    }

    #[test]
    fn counts_chars_not_bytes() {
        assert_eq!(levenshtein_distance("qualità", "qualita"), 1);
    }

    #[test]
    fn commutative() {
        assert_eq!(
            levenshtein_distance("olio extravergine", "olio evo"),
            levenshtein_distance("olio evo", "olio extravergine")
        );
    }

    #[test]
    fn normalize_drops_punctuation() {
        assert_eq!(normalize_description("  Olio, 1L - (EVO) "), "olio 1l evo");
    }

    #[test]
    fn word_order_is_forgiven_by_dice() {
        let a = normalize_description("Busta imbottita grande");
        let b = normalize_description("grande busta imbottita");
        assert_eq!(similarity(&a, &b), 1.0);
    }

    #[test]
    fn empty_never_matches() {
        assert_eq!(similarity("", ""), 0.0);
        assert_eq!(similarity("olio", ""), 0.0);
    }

    #[test]
    fn unrelated_text_scores_low() {
        let a = normalize_description("Spedizione espressa");
        let b = normalize_description("Olio 1L");
        assert!(similarity(&a, &b) < 0.75);
    }
}
