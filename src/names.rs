use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Clean a name token for output
/// - Trims leading/trailing punctuation and whitespace
/// - Collapses inner whitespace runs to one space
/// - With `fold_diacritics`, strips combining marks via Unicode NFD
///   (e.g. "GRÖSS" -> "GROSS")
pub fn clean_name(input: &str, fold_diacritics: bool) -> String {
    let trimmed = trim_punctuation(input);
    let mut result = String::with_capacity(trimmed.len());
    let mut last_was_space = false;

    let chars: Box<dyn Iterator<Item = char> + '_> = if fold_diacritics {
        Box::new(trimmed.nfd().filter(|c| !is_combining_mark(*c)))
    } else {
        Box::new(trimmed.chars())
    };

    for ch in chars {
        if ch.is_whitespace() {
            if !last_was_space {
                result.push(' ');
                last_was_space = true;
            }
        } else if !ch.is_control() {
            result.push(ch);
            last_was_space = false;
        }
    }

    result
}

/// Strip leading and trailing punctuation and whitespace
pub fn trim_punctuation(input: &str) -> &str {
    input.trim_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation() || is_unicode_punct(c))
}

fn is_unicode_punct(c: char) -> bool {
    matches!(
        c,
        '\u{2018}' | '\u{2019}' | '\u{201C}' | '\u{201D}' | '\u{2013}' | '\u{2014}' | '\u{2026}' | '\u{00B7}'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trims_punctuation() {
        assert_eq!(clean_name("  NEGREANU. ", false), "NEGREANU");
        assert_eq!(clean_name("'VU'", false), "VU");
        assert_eq!(clean_name("…HELLMUTH—", false), "HELLMUTH");
    }

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(clean_name("VAN   DEN  BERG", false), "VAN DEN BERG");
    }

    #[test]
    fn test_keeps_inner_punctuation() {
        assert_eq!(clean_name("O'DWYER", false), "O'DWYER");
        assert_eq!(clean_name("SMITH-JONES", false), "SMITH-JONES");
    }

    #[test]
    fn test_diacritics() {
        assert_eq!(clean_name("GRÖSS", true), "GROSS");
        assert_eq!(clean_name("Müller", true), "Muller");
        assert_eq!(clean_name("Müller", false), "Müller");
    }
}
