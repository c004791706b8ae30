//! Arabic token normalization for equality comparison.
//!
//! The normalized form is never displayed; it only decides whether a
//! recognized word and a canonical word count as the same token.

/// Normalize one whitespace-delimited Arabic token.
///
/// Applied in order: strip tashkeel and the superscript alef, fold the
/// hamza-carrying Alef variants to bare Alef, fold Taa Marbuta to Haa, then
/// drop everything outside the base Arabic letter block (punctuation, digits,
/// Latin artifacts, verse-end ornaments).
///
/// An empty result is valid and means "no comparable content"; callers must
/// skip tokens whose normalized form is empty.
///
/// The function is pure and idempotent.
pub fn normalize_token(raw: &str) -> String {
    raw.chars().filter_map(fold_char).collect()
}

fn fold_char(c: char) -> Option<char> {
    match c {
        // Tashkeel block (fathatan..wavy hamza) and the superscript alef.
        '\u{064B}'..='\u{065F}' | '\u{0670}' => None,
        // Alef with madda, hamza above, hamza below, and the Uthmani-script
        // Alef Wasla all fold to bare Alef.
        '\u{0622}' | '\u{0623}' | '\u{0625}' | '\u{0671}' => Some('\u{0627}'),
        // Taa Marbuta -> Haa.
        '\u{0629}' => Some('\u{0647}'),
        // Base Arabic letters pass through untouched.
        '\u{0621}'..='\u{064A}' => Some(c),
        // Everything else is not comparable content.
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_diacritics() {
        assert_eq!(normalize_token("بِسْمِ"), normalize_token("بسم"));
    }

    #[test]
    fn test_idempotent() {
        let once = normalize_token("ٱلرَّحْمَٰنِ");
        assert!(!once.is_empty());
        assert_eq!(normalize_token(&once), once);
    }

    #[test]
    fn test_wasla_matches_plain_alef() {
        // Uthmani definite article vs standard orthography.
        assert_eq!(normalize_token("ٱلله"), normalize_token("الله"));
    }

    #[test]
    fn test_folds_alef_variants() {
        assert_eq!(normalize_token("أ"), "ا");
        assert_eq!(normalize_token("إ"), "ا");
        assert_eq!(normalize_token("آ"), "ا");
    }

    #[test]
    fn test_folds_taa_marbuta() {
        assert_eq!(normalize_token("رحمة"), normalize_token("رحمه"));
    }

    #[test]
    fn test_drops_non_arabic() {
        assert_eq!(normalize_token("abc123!؟"), "");
        assert_eq!(normalize_token("﴿١﴾"), "");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(normalize_token(""), "");
    }
}
