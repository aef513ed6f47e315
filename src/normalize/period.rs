use super::cell::Cell;

/// Portuguese three-letter month abbreviations used by the source sheets.
static MONTHS: &[(&str, &str)] = &[
    ("jan", "01"),
    ("fev", "02"),
    ("mar", "03"),
    ("abr", "04"),
    ("mai", "05"),
    ("jun", "06"),
    ("jul", "07"),
    ("ago", "08"),
    ("set", "09"),
    ("out", "10"),
    ("nov", "11"),
    ("dez", "12"),
];

/// Convert a `"mmm/yy"` header such as `"mai/23"` into `"2023-05"`.
///
/// Only text cells are considered: a native date or number in the header row
/// means the template changed, and the column is dropped rather than guessed.
/// The century is always `20`.
pub fn standardize_period(raw: &Cell) -> Option<String> {
    let text = raw.as_str()?;
    standardize_period_str(text)
}

pub fn standardize_period_str(text: &str) -> Option<String> {
    let lower = text.trim().to_lowercase();
    let parts: Vec<&str> = lower.split('/').collect();
    let [month, year] = parts.as_slice() else {
        return None;
    };

    let month_num = MONTHS
        .iter()
        .find(|(abbr, _)| abbr == month)
        .map(|(_, num)| *num)?;

    if year.len() != 2 || !year.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    Some(format!("20{}-{}", year, month_num))
}
