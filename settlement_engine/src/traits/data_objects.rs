use serde::Serialize;

use crate::db_types::{FundRelease, ReturnRequest, WalletTransaction};

/// What a release attempt actually did. A second attempt on the same sub-order reports
/// `AlreadyReleased` with the original credit instead of paying out twice.
#[derive(Debug, Clone, Serialize)]
pub enum ReleaseOutcome {
    Released { release: FundRelease, transaction: WalletTransaction },
    AlreadyReleased { release: FundRelease, transaction: Option<WalletTransaction> },
}

impl ReleaseOutcome {
    pub fn release(&self) -> &FundRelease {
        match self {
            Self::Released { release, .. } | Self::AlreadyReleased { release, .. } => release,
        }
    }

    /// True when this call performed the credit, false when it found the work already done.
    pub fn is_new(&self) -> bool {
        matches!(self, Self::Released { .. })
    }
}

/// Result of re-evaluating a pending release's conditions against the clock.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationOutcome {
    pub release: FundRelease,
    pub became_ready: bool,
}

/// Result of moving a return through its lifecycle. `refund` is populated only on the step that
/// refunds a previously released sub-order.
#[derive(Debug, Clone, Serialize)]
pub struct ReturnUpdate {
    pub request: ReturnRequest,
    pub refund: Option<WalletTransaction>,
}
