use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Lower-case and strip combining accents so `"Índice"` matches `"indice"`.
pub fn fold_text(raw: &str) -> String {
    raw.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Trim whitespace and one trailing `%`.
pub fn strip_percent(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed.strip_suffix('%').unwrap_or(trimmed).trim()
}
