//! Batch helpers for refreshing many reserves and obligations at once.
//!
//! A liquidation scanner typically compounds every reserve once, then values
//! thousands of obligations against the same snapshot. Failures are per
//! obligation: a position referencing an unknown reserve is reported and
//! skipped, never aborting the scan.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::{ObjectId, SimError};
use crate::obligation::Obligation;
use crate::reserve::Reserve;

/// Outcome of refreshing a single obligation
#[derive(Debug, Clone, PartialEq)]
pub struct ObligationReport {
    pub obligation_id: ObjectId,
    pub result: Result<Obligation, SimError>,
}

impl ObligationReport {
    /// The refreshed obligation, if the refresh succeeded
    pub fn refreshed(&self) -> Option<&Obligation> {
        self.result.as_ref().ok()
    }
}

/// Compounds every reserve to `now_s`, keyed by coin type.
///
/// Unlike obligations, a reserve that cannot be compounded invalidates the
/// snapshot, so the first error is returned.
pub fn compound_reserves(
    reserves: &HashMap<String, Reserve>,
    now_s: u64,
) -> Result<HashMap<String, Reserve>, SimError> {
    reserves
        .iter()
        .map(|(coin_type, reserve)| {
            reserve
                .compound_interest(now_s)
                .map(|compounded| (coin_type.clone(), compounded))
        })
        .collect()
}

/// Refreshes each obligation against the same reserve snapshot.
pub fn refresh_obligations(
    obligations: &[Obligation],
    reserves: &HashMap<String, Reserve>,
) -> Vec<ObligationReport> {
    let reports: Vec<ObligationReport> = obligations
        .iter()
        .map(|obligation| {
            let result = obligation.refresh(reserves);
            if let Err(err) = &result {
                warn!(obligation_id = %obligation.id, error = %err, "skipping obligation");
            }
            ObligationReport {
                obligation_id: obligation.id,
                result,
            }
        })
        .collect();

    debug!(
        total = reports.len(),
        failed = reports.iter().filter(|r| r.result.is_err()).count(),
        "refreshed obligations"
    );
    reports
}

/// IDs of successfully refreshed obligations that can be liquidated
pub fn liquidation_candidates(reports: &[ObligationReport]) -> Vec<ObjectId> {
    reports
        .iter()
        .filter_map(ObligationReport::refreshed)
        .filter(|obligation| obligation.is_liquidatable())
        .map(|obligation| obligation.id)
        .collect()
}
