use serde::{Deserialize, Serialize};

use super::cell::Cell;
use super::utils::strip_percent;

/// Decimal separator assumed for percent-formatted variation cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecimalMark {
    /// `"1.5%"`; a comma makes the cell unparseable.
    Point,
    /// `"1,5%"` and `"1.234,5%"`. Text without a comma is read as-is.
    #[default]
    Comma,
}

/// Read a variation cell. Numbers pass through; text has `%` and
/// whitespace stripped before parsing.
pub fn parse_variation(cell: &Cell, mark: DecimalMark) -> Option<f64> {
    match cell {
        Cell::Number(n) if n.is_finite() => Some(*n),
        Cell::Text(s) => parse_percent_str(s, mark),
        _ => None,
    }
}

pub fn parse_percent_str(raw: &str, mark: DecimalMark) -> Option<f64> {
    parse_decimal_str(strip_percent(raw), mark)
}

/// Parse a trimmed decimal number written with `mark`.
pub fn parse_decimal_str(raw: &str, mark: DecimalMark) -> Option<f64> {
    let digits = raw.trim();
    let parsed = match mark {
        DecimalMark::Point => digits.parse::<f64>(),
        DecimalMark::Comma if digits.contains(',') => {
            digits.replace('.', "").replace(',', ".").parse::<f64>()
        }
        DecimalMark::Comma => digits.parse::<f64>(),
    };
    parsed.ok().filter(|v| v.is_finite())
}

/// Read an index value cell. Numbers pass through; text follows `mark`.
pub fn parse_index_value(cell: &Cell, mark: DecimalMark) -> Option<f64> {
    match cell {
        Cell::Number(n) if n.is_finite() => Some(*n),
        Cell::Text(s) => parse_decimal_str(s, mark),
        _ => None,
    }
}
