// src/normalize/mod.rs
//! Turns a human-formatted index sheet (one metric per row, one month per
//! column, two trailing variation columns) into long-form records keyed by
//! `YYYY-MM`.

pub mod cell;
pub mod events;
pub mod period;
pub mod sheet;
pub mod utils;
pub mod variation;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};

use crate::family::MetricFamily;

pub use cell::Cell;
pub use events::{DropReason, NoopEvents, NormalizeEvents, TracingEvents};
pub use period::standardize_period;
pub use sheet::RawSheet;
pub use variation::{parse_index_value, parse_variation, DecimalMark};

/// Leading label column plus the trailing month/year variation columns.
const MIN_COLUMNS: usize = 3;

/// One normalized row, ready for the raw warehouse table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Canonical `YYYY-MM`.
    pub period: String,
    pub index_value: f64,
    /// Same for every record of one extraction.
    pub month_change: f64,
    /// Same for every record of one extraction.
    pub year_change: f64,
    pub loaded_at: DateTime<Utc>,
}

/// How an extraction ended. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeOutcome {
    Found,
    LabelNotFound,
    SheetEmpty,
    TooNarrow { columns: usize },
    /// A variation cell could not be read; every record would carry it,
    /// so none are produced.
    VariationUnparseable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    /// Sorted ascending by `period`, one record per period.
    pub records: Vec<MetricRecord>,
    pub outcome: NormalizeOutcome,
}

impl Normalized {
    fn empty(outcome: NormalizeOutcome) -> Self {
        Self {
            records: Vec::new(),
            outcome,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub struct TableNormalizer {
    decimal_mark: DecimalMark,
    events: Arc<dyn NormalizeEvents>,
}

impl Default for TableNormalizer {
    fn default() -> Self {
        Self::new(DecimalMark::default(), Arc::new(TracingEvents))
    }
}

impl TableNormalizer {
    pub fn new(decimal_mark: DecimalMark, events: Arc<dyn NormalizeEvents>) -> Self {
        Self {
            decimal_mark,
            events,
        }
    }

    pub fn decimal_mark(&self) -> DecimalMark {
        self.decimal_mark
    }

    /// Normalize `sheet`, stamping every record with the current time.
    pub fn normalize(&self, sheet: &RawSheet, family: MetricFamily) -> Normalized {
        self.normalize_at(sheet, family, Utc::now())
    }

    /// Same as [`normalize`](Self::normalize) with an explicit load timestamp.
    pub fn normalize_at(
        &self,
        sheet: &RawSheet,
        family: MetricFamily,
        loaded_at: DateTime<Utc>,
    ) -> Normalized {
        // label rows shift between releases, so prune before any lookup
        let grid = sheet.prune();
        if grid.is_empty() {
            self.events.sheet_empty(family);
            return Normalized::empty(NormalizeOutcome::SheetEmpty);
        }

        let width = grid.width();
        if width < MIN_COLUMNS {
            self.events.too_narrow(family, width);
            return Normalized::empty(NormalizeOutcome::TooNarrow { columns: width });
        }

        let Some(main_idx) = grid.find_row(family.label_marker()) else {
            self.events.label_not_found(family);
            return Normalized::empty(NormalizeOutcome::LabelNotFound);
        };

        // prune() pads every row to `width`
        let header = &grid.rows[0];
        let main = &grid.rows[main_idx];

        let month_change = self.variation(family, "month_change", &main[width - 2]);
        let year_change = self.variation(family, "year_change", &main[width - 1]);
        let (Some(month_change), Some(year_change)) = (month_change, year_change) else {
            return Normalized::empty(NormalizeOutcome::VariationUnparseable);
        };

        let mut by_period: BTreeMap<String, MetricRecord> = BTreeMap::new();
        for col in 1..width - 2 {
            let Some(index_value) = parse_index_value(&main[col], self.decimal_mark) else {
                self.events.column_dropped(family, col, DropReason::NoValue);
                continue;
            };
            let Some(period) = standardize_period(&header[col]) else {
                self.events.column_dropped(family, col, DropReason::BadPeriod);
                continue;
            };

            let record = MetricRecord {
                period: period.clone(),
                index_value,
                month_change,
                year_change,
                loaded_at,
            };
            if by_period.insert(period, record).is_some() {
                self.events.duplicate_period(family, &header[col].to_text());
            }
        }

        let records: Vec<MetricRecord> = by_period.into_values().collect();
        self.events.extracted(family, records.len());

        Normalized {
            records,
            outcome: NormalizeOutcome::Found,
        }
    }

    fn variation(&self, family: MetricFamily, field: &'static str, cell: &Cell) -> Option<f64> {
        let parsed = parse_variation(cell, self.decimal_mark);
        if parsed.is_none() {
            self.events
                .variation_unparseable(family, field, &cell.to_text());
        }
        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Mutex;

    const ICC_LABEL: &str = "Índice de Confiança do Consumidor";

    #[derive(Default)]
    struct RecordingEvents {
        seen: Mutex<Vec<String>>,
    }

    impl RecordingEvents {
        fn events(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl NormalizeEvents for RecordingEvents {
        fn label_not_found(&self, family: MetricFamily) {
            self.seen
                .lock()
                .unwrap()
                .push(format!("label_not_found:{}", family.code()));
        }

        fn column_dropped(&self, _family: MetricFamily, column: usize, reason: DropReason) {
            self.seen
                .lock()
                .unwrap()
                .push(format!("dropped:{}:{:?}", column, reason));
        }

        fn variation_unparseable(&self, _family: MetricFamily, field: &'static str, _raw: &str) {
            self.seen.lock().unwrap().push(format!("variation:{}", field));
        }

        fn duplicate_period(&self, _family: MetricFamily, period: &str) {
            self.seen.lock().unwrap().push(format!("duplicate:{}", period));
        }
    }

    fn normalizer(mark: DecimalMark) -> (TableNormalizer, Arc<RecordingEvents>) {
        let events = Arc::new(RecordingEvents::default());
        (TableNormalizer::new(mark, events.clone()), events)
    }

    fn stamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_end_to_end_scenario() {
        let sheet = RawSheet::from_strings(vec![
            vec!["rótulo", "mar/24", "abr/24", "1,2%", "-0,5%"],
            vec![ICC_LABEL, "100.0", "101.5", "1,2%", "-0,5%"],
        ]);
        let (n, _) = normalizer(DecimalMark::Comma);

        let out = n.normalize_at(&sheet, MetricFamily::ConsumerConfidence, stamp());

        assert_eq!(out.outcome, NormalizeOutcome::Found);
        assert_eq!(
            out.records,
            vec![
                MetricRecord {
                    period: "2024-03".into(),
                    index_value: 100.0,
                    month_change: 1.2,
                    year_change: -0.5,
                    loaded_at: stamp(),
                },
                MetricRecord {
                    period: "2024-04".into(),
                    index_value: 101.5,
                    month_change: 1.2,
                    year_change: -0.5,
                    loaded_at: stamp(),
                },
            ]
        );
    }

    #[test]
    fn test_missing_label_is_empty_not_error() {
        let sheet = RawSheet::from_strings(vec![
            vec!["", "mar/24", "abr/24", "m", "a"],
            vec!["Something else", "1", "2", "0.1", "0.2"],
        ]);
        let (n, events) = normalizer(DecimalMark::Point);

        let out = n.normalize(&sheet, MetricFamily::IntentToBuy);

        assert!(out.is_empty());
        assert_eq!(out.outcome, NormalizeOutcome::LabelNotFound);
        assert_eq!(events.events(), vec!["label_not_found:icf"]);
    }

    #[test]
    fn test_blank_and_narrow_sheets() {
        let (n, _) = normalizer(DecimalMark::Point);

        let blank = RawSheet::from_strings(vec![vec!["", " "], vec![]]);
        assert_eq!(
            n.normalize(&blank, MetricFamily::IntentToBuy).outcome,
            NormalizeOutcome::SheetEmpty
        );

        let narrow = RawSheet::from_strings(vec![vec!["", "mar/24"], vec!["ICF", "90"]]);
        assert_eq!(
            n.normalize(&narrow, MetricFamily::IntentToBuy).outcome,
            NormalizeOutcome::TooNarrow { columns: 2 }
        );
    }

    #[test]
    fn test_blank_margins_and_numeric_cells() {
        let row = |cells: Vec<Cell>| {
            let mut r = vec![Cell::Empty];
            r.extend(cells);
            r.push(Cell::Empty);
            r
        };
        let sheet = RawSheet::new(vec![
            vec![],
            row(vec![
                Cell::Empty,
                Cell::text("jan/24"),
                Cell::text("fev/24"),
                Cell::text("jun/24"),
                Cell::text("Var. mês"),
                Cell::text("Var. ano"),
            ]),
            vec![Cell::Empty; 3],
            row(vec![
                Cell::text("ICF - Intenção de Consumo das Famílias"),
                Cell::Number(95.1),
                Cell::Empty,
                Cell::Number(96.3),
                Cell::Number(0.4),
                Cell::Number(-2.0),
            ]),
        ]);
        let (n, events) = normalizer(DecimalMark::Point);

        let out = n.normalize_at(&sheet, MetricFamily::IntentToBuy, stamp());

        let periods: Vec<&str> = out.records.iter().map(|r| r.period.as_str()).collect();
        assert_eq!(periods, vec!["2024-01", "2024-06"]);
        assert!(out
            .records
            .iter()
            .all(|r| r.month_change == 0.4 && r.year_change == -2.0));
        assert!(out.records.iter().all(|r| r.loaded_at == stamp()));
        assert_eq!(events.events(), vec!["dropped:2:NoValue"]);
    }

    #[test]
    fn test_output_sorted_regardless_of_column_order() {
        let sheet = RawSheet::from_strings(vec![
            vec!["", "dez/23", "mar/24", "jan/24", "fev/24", "m", "a"],
            vec!["ICF", "4", "1", "2", "3", "1.0", "2.0"],
        ]);
        let (n, _) = normalizer(DecimalMark::Point);

        let out = n.normalize(&sheet, MetricFamily::IntentToBuy);

        let periods: Vec<&str> = out.records.iter().map(|r| r.period.as_str()).collect();
        assert_eq!(periods, vec!["2023-12", "2024-01", "2024-02", "2024-03"]);
    }

    #[test]
    fn test_bad_headers_and_values_are_dropped() {
        let sheet = RawSheet::new(vec![
            vec![
                Cell::text("x"),
                Cell::text("mai/23"),
                Cell::Number(45_000.0),
                Cell::text("jun/23"),
                Cell::text("jul/23"),
                Cell::text("m"),
                Cell::text("a"),
            ],
            vec![
                Cell::text("ICF"),
                Cell::Number(1.0),
                Cell::Number(2.0),
                Cell::text("n/d"),
                Cell::text("4"),
                Cell::Number(0.1),
                Cell::Number(0.2),
            ],
        ]);
        let (n, events) = normalizer(DecimalMark::Point);

        let out = n.normalize(&sheet, MetricFamily::IntentToBuy);

        let periods: Vec<&str> = out.records.iter().map(|r| r.period.as_str()).collect();
        assert_eq!(periods, vec!["2023-05", "2023-07"]);
        assert_eq!(
            events.events(),
            vec!["dropped:2:BadPeriod", "dropped:3:NoValue"]
        );
    }

    #[test]
    fn test_first_matching_row_wins() {
        let sheet = RawSheet::from_strings(vec![
            vec!["", "mar/24", "m", "a"],
            vec!["ICF", "10", "1", "1"],
            vec!["ICF - renda até 10 SM", "20", "2", "2"],
        ]);
        let (n, _) = normalizer(DecimalMark::Point);

        let out = n.normalize(&sheet, MetricFamily::IntentToBuy);

        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].index_value, 10.0);
    }

    #[test]
    fn test_duplicate_period_last_write_wins() {
        let sheet = RawSheet::from_strings(vec![
            vec!["", "mar/24", "MAR/24", "m", "a"],
            vec!["ICF", "10", "11", "1", "1"],
        ]);
        let (n, events) = normalizer(DecimalMark::Point);

        let out = n.normalize(&sheet, MetricFamily::IntentToBuy);

        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].index_value, 11.0);
        assert_eq!(events.events(), vec!["duplicate:MAR/24"]);
    }

    #[test]
    fn test_decimal_mark_applies_to_variations() {
        let sheet = RawSheet::from_strings(vec![
            vec!["", "mar/24", "m", "a"],
            vec!["ICF", "10", "1,5%", "2.5%"],
        ]);

        let (comma, _) = normalizer(DecimalMark::Comma);
        let out = comma.normalize(&sheet, MetricFamily::IntentToBuy);
        assert_eq!(out.records[0].month_change, 1.5);
        assert_eq!(out.records[0].year_change, 2.5);

        let (point, events) = normalizer(DecimalMark::Point);
        let out = point.normalize(&sheet, MetricFamily::IntentToBuy);
        assert!(out.is_empty());
        assert_eq!(out.outcome, NormalizeOutcome::VariationUnparseable);
        assert_eq!(events.events(), vec!["variation:month_change"]);
    }

    #[test]
    fn test_unparseable_variation_drops_every_record() {
        let sheet = RawSheet::from_strings(vec![
            vec!["", "mar/24", "abr/24", "m", "a"],
            vec!["ICF", "100", "101", "n/d", "2%"],
        ]);
        let (n, events) = normalizer(DecimalMark::Point);

        let out = n.normalize(&sheet, MetricFamily::IntentToBuy);

        assert!(out.records.is_empty());
        assert_eq!(out.outcome, NormalizeOutcome::VariationUnparseable);
        assert_eq!(events.events(), vec!["variation:month_change"]);
    }

    #[test]
    fn test_both_unparseable_variations_are_reported() {
        let sheet = RawSheet::from_strings(vec![
            vec!["", "mar/24", "m", "a"],
            vec!["ICF", "100", "", "x"],
        ]);
        let (n, events) = normalizer(DecimalMark::Comma);

        let out = n.normalize(&sheet, MetricFamily::IntentToBuy);

        assert!(out.is_empty());
        assert_eq!(
            events.events(),
            vec!["variation:month_change", "variation:year_change"]
        );
    }

    #[test]
    fn test_decimal_mark_applies_to_index_values() {
        let sheet = RawSheet::from_strings(vec![
            vec!["", "mar/24", "abr/24", "m", "a"],
            vec!["ICF", "101,5", "99.0", "1", "2"],
        ]);

        let (comma, _) = normalizer(DecimalMark::Comma);
        let out = comma.normalize(&sheet, MetricFamily::IntentToBuy);
        let values: Vec<f64> = out.records.iter().map(|r| r.index_value).collect();
        assert_eq!(values, vec![101.5, 99.0]);

        let (point, events) = normalizer(DecimalMark::Point);
        let out = point.normalize(&sheet, MetricFamily::IntentToBuy);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].period, "2024-04");
        assert_eq!(events.events(), vec!["dropped:1:NoValue"]);
    }
}
