use tracing::{debug, info, warn};

use crate::family::MetricFamily;

/// Why a header/value column did not produce a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Header cell is not a recognisable `mmm/yy` period.
    BadPeriod,
    /// Value cell is empty or not numeric.
    NoValue,
}

/// Observer for recognition events during normalization.
///
/// Passed to [`TableNormalizer`](super::TableNormalizer) at construction.
/// Every method has a no-op default.
pub trait NormalizeEvents: Send + Sync {
    fn sheet_empty(&self, _family: MetricFamily) {}
    fn too_narrow(&self, _family: MetricFamily, _columns: usize) {}
    fn label_not_found(&self, _family: MetricFamily) {}
    fn column_dropped(&self, _family: MetricFamily, _column: usize, _reason: DropReason) {}
    fn variation_unparseable(&self, _family: MetricFamily, _field: &'static str, _raw: &str) {}
    fn duplicate_period(&self, _family: MetricFamily, _period: &str) {}
    fn extracted(&self, _family: MetricFamily, _records: usize) {}
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEvents;

impl NormalizeEvents for TracingEvents {
    fn sheet_empty(&self, family: MetricFamily) {
        warn!(%family, "sheet has no data after pruning blank rows and columns");
    }

    fn too_narrow(&self, family: MetricFamily, columns: usize) {
        warn!(%family, columns, "sheet too narrow for label + variation columns");
    }

    fn label_not_found(&self, family: MetricFamily) {
        warn!(%family, marker = family.label_marker(), "no main metric row found");
    }

    fn column_dropped(&self, family: MetricFamily, column: usize, reason: DropReason) {
        debug!(%family, column, ?reason, "dropping column");
    }

    fn variation_unparseable(&self, family: MetricFamily, field: &'static str, raw: &str) {
        warn!(%family, field, raw, "variation cell not parseable, dropping the extraction");
    }

    fn duplicate_period(&self, family: MetricFamily, period: &str) {
        debug!(%family, period, "duplicate period, keeping the later column");
    }

    fn extracted(&self, family: MetricFamily, records: usize) {
        info!(%family, records, "normalized sheet");
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvents;

impl NormalizeEvents for NoopEvents {}
