//! Matching run results.
//!
//! [`MatchOutcome`] is emitted for every waitlist entry examined in a run.
//! [`MatchRunSummary`] collects them with per-screening-type counts.

use crate::types::{AllocationId, FundingSource, PatientId, ScreeningTypeId, WaitlistId};
use rust_decimal::Decimal;

/// Why an examined entry was passed over without looking for funds.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SkipReason {
    TooManyUnclaimed { unclaimed: usize },
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum MatchResult {
    Matched {
        allocation_id: AllocationId,
        source: FundingSource,
        amount: Decimal,
    },
    Skipped {
        reason: SkipReason,
    },
    /// No campaign and no pool money covers the cost. Entry stays pending.
    Unfunded,
    /// The match transaction was rejected; state is unchanged.
    Failed {
        error: String,
    },
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MatchOutcome {
    pub waitlist_id: WaitlistId,
    pub patient_id: PatientId,
    pub screening_type_id: ScreeningTypeId,
    pub result: MatchResult,
}

impl MatchOutcome {
    pub fn is_matched(&self) -> bool {
        matches!(self.result, MatchResult::Matched { .. })
    }
}

/// Counts for one screening type in one run.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ScreeningTypeSummary {
    pub screening_type_id: ScreeningTypeId,
    pub processed: usize,
    pub matched: usize,
    pub skipped: usize,
    pub unfunded: usize,
    pub failed: usize,
}

impl ScreeningTypeSummary {
    pub fn new(screening_type_id: ScreeningTypeId) -> Self {
        Self {
            screening_type_id,
            processed: 0,
            matched: 0,
            skipped: 0,
            unfunded: 0,
            failed: 0,
        }
    }

    pub fn record(&mut self, result: &MatchResult) {
        self.processed += 1;
        match result {
            MatchResult::Matched { .. } => self.matched += 1,
            MatchResult::Skipped { .. } => self.skipped += 1,
            MatchResult::Unfunded => self.unfunded += 1,
            MatchResult::Failed { .. } => self.failed += 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MatchRunSummary {
    pub run_at: u64,
    pub outcomes: Vec<MatchOutcome>,
    pub per_type: Vec<ScreeningTypeSummary>,
}

impl MatchRunSummary {
    pub fn matched_count(&self) -> usize {
        self.per_type.iter().map(|s| s.matched).sum()
    }

    pub fn processed_count(&self) -> usize {
        self.per_type.iter().map(|s| s.processed).sum()
    }

    /// Allocation ids created in this run, in processing order.
    pub fn allocation_ids(&self) -> Vec<AllocationId> {
        self.outcomes
            .iter()
            .filter_map(|o| match o.result {
                MatchResult::Matched { allocation_id, .. } => Some(allocation_id),
                _ => None,
            })
            .collect()
    }
}
