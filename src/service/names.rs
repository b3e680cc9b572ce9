use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

/// Comparison key for duplicate detection: whitespace-collapsed, lowercased,
/// with diacritics removed (`"José  Núñez"` and `"jose nunez"` collide).
pub fn normalize_name(name: &str) -> String {
    let stripped: String = name
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::normalize_name;

    #[test]
    fn folds_case_accents_and_spacing() {
        assert_eq!(normalize_name("  José   Núñez "), "jose nunez");
        assert_eq!(normalize_name("JOSE NUNEZ"), normalize_name("josé núñez"));
        assert_eq!(normalize_name("Zoë\tÅngström"), "zoe angstrom");
    }

    #[test]
    fn keeps_distinct_names_distinct() {
        assert_ne!(normalize_name("Ana"), normalize_name("Anna"));
        assert_eq!(normalize_name(""), "");
    }

    #[test]
    fn non_latin_scripts_survive() {
        assert_eq!(normalize_name("Олег"), "олег");
        assert_eq!(normalize_name("محمد"), "محمد");
    }
}
