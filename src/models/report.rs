use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::models::{ExtractionOutcome, SiteId};
use crate::utils::error::SiteError;

/// One failed site as it appears in a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedError {
    pub site_id: SiteId,
    pub title: String,
    pub error: SiteError,
}

impl Serialize for ReportedError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ReportedError", 4)?;
        state.serialize_field("site_id", &self.site_id)?;
        state.serialize_field("title", &self.title)?;
        state.serialize_field("kind", self.error.kind())?;
        state.serialize_field("message", &self.error.to_string())?;
        state.end()
    }
}

/// How a run turned out, readable without looking at individual entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// Nothing was registered, nothing was fetched.
    NoSites,
    AllFailed,
    Partial,
    Complete,
}

/// Batch-level result: mean of the extracted prices plus every failure in
/// registry order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    pub average: Option<Decimal>,
    pub succeeded: usize,
    pub errors: Vec<ReportedError>,
}

impl AggregateReport {
    pub fn empty() -> Self {
        Self {
            average: None,
            succeeded: 0,
            errors: Vec::new(),
        }
    }

    /// Builds a report from outcomes that are already in batch order.
    pub fn from_outcomes(outcomes: Vec<ExtractionOutcome>) -> Self {
        let mut total: u128 = 0;
        let mut succeeded = 0usize;
        let mut errors = Vec::new();

        for outcome in outcomes {
            match outcome {
                ExtractionOutcome::Success { price, .. } => {
                    total += u128::from(price);
                    succeeded += 1;
                }
                ExtractionOutcome::Failure { site_id, title, error } => {
                    errors.push(ReportedError { site_id, title, error });
                }
            }
        }

        Self {
            average: mean(total, succeeded),
            succeeded,
            errors,
        }
    }

    pub fn failed(&self) -> usize {
        self.errors.len()
    }

    pub fn status(&self) -> ReportStatus {
        match (self.succeeded, self.errors.len()) {
            (0, 0) => ReportStatus::NoSites,
            (0, _) => ReportStatus::AllFailed,
            (_, 0) => ReportStatus::Complete,
            _ => ReportStatus::Partial,
        }
    }

    pub fn average_f64(&self) -> Option<f64> {
        self.average.and_then(|avg| avg.to_f64())
    }
}

// Split into whole and fractional parts so the sum never has to fit a Decimal.
fn mean(total: u128, count: usize) -> Option<Decimal> {
    if count == 0 {
        return None;
    }
    let count = count as u128;
    let whole = total / count;
    let remainder = total % count;

    // whole <= max price and remainder < count, so both fit in u64
    let whole = Decimal::from(whole as u64);
    let fraction = Decimal::from(remainder as u64) / Decimal::from(count as u64);
    Some(whole + fraction)
}
