use crate::models::SiteId;
use crate::utils::error::SiteError;

/// The single result produced for one site in one aggregation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    Success {
        site_id: SiteId,
        title: String,
        price: u64,
    },
    Failure {
        site_id: SiteId,
        title: String,
        error: SiteError,
    },
}

impl ExtractionOutcome {
    pub fn site_id(&self) -> SiteId {
        match self {
            ExtractionOutcome::Success { site_id, .. } | ExtractionOutcome::Failure { site_id, .. } => *site_id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            ExtractionOutcome::Success { title, .. } | ExtractionOutcome::Failure { title, .. } => title,
        }
    }

    pub fn price(&self) -> Option<u64> {
        match self {
            ExtractionOutcome::Success { price, .. } => Some(*price),
            ExtractionOutcome::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&SiteError> {
        match self {
            ExtractionOutcome::Success { .. } => None,
            ExtractionOutcome::Failure { error, .. } => Some(error),
        }
    }
}
