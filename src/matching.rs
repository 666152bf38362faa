//! Waitlist-to-campaign matching.
//!
//! [`run_matching`] makes one pass over the pending waitlist: per screening type (ascending
//! id), the first `batch_size` entries in FCFS order are examined. Each is skipped if the
//! patient already holds too many unclaimed allocations, otherwise funded from the best
//! ranked campaign or the general pool. Every match commits as one transaction.

use crate::config::EngineConfig;
use crate::ranking::select_source;
use crate::report::{MatchOutcome, MatchResult, MatchRunSummary, ScreeningTypeSummary, SkipReason};
use crate::store::{PlatformStore, Transaction, WriteOp};
use crate::types::{
    Allocation, AllocationId, AllocationStatus, FundingSource, Notification, NotificationId,
    NotificationKind, WaitlistEntry,
};

/// Run one matching pass at time `now`.
pub fn run_matching(store: &mut PlatformStore, config: &EngineConfig, now: u64) -> MatchRunSummary {
    let mut outcomes = Vec::new();
    let mut per_type = Vec::new();

    for screening_type_id in store.screening_types_with_pending() {
        let mut summary = ScreeningTypeSummary::new(screening_type_id);
        // Matches only remove entries from the queue, so the head of the queue is the batch.
        let batch: Vec<WaitlistEntry> = store
            .pending_entries(screening_type_id)
            .into_iter()
            .take(config.batch_size)
            .cloned()
            .collect();
        for entry in batch {
            let result = match_entry(store, config, &entry, now);
            summary.record(&result);
            outcomes.push(MatchOutcome {
                waitlist_id: entry.waitlist_id,
                patient_id: entry.patient_id,
                screening_type_id,
                result,
            });
        }
        per_type.push(summary);
    }

    MatchRunSummary {
        run_at: now,
        outcomes,
        per_type,
    }
}

fn match_entry(
    store: &mut PlatformStore,
    config: &EngineConfig,
    entry: &WaitlistEntry,
    now: u64,
) -> MatchResult {
    let unclaimed = store.unclaimed_count(entry.patient_id);
    if unclaimed >= config.max_unclaimed_allocations {
        return MatchResult::Skipped {
            reason: SkipReason::TooManyUnclaimed { unclaimed },
        };
    }
    let Some(source) = select_source(store, entry) else {
        return MatchResult::Unfunded;
    };
    let allocation_id = store.sequences().allocation();
    let notification_id = store.sequences().notification();
    let tx = match_transaction(
        entry,
        source,
        allocation_id,
        notification_id,
        now,
        config.allocation_ttl_secs,
    );
    match store.commit(tx) {
        Ok(()) => MatchResult::Matched {
            allocation_id,
            source,
            amount: entry.estimated_cost,
        },
        Err(e) => MatchResult::Failed { error: e.to_string() },
    }
}

/// Writes for one match: debit the source, create the allocation, mark the entry
/// matched, notify the patient.
pub fn match_transaction(
    entry: &WaitlistEntry,
    source: FundingSource,
    allocation_id: AllocationId,
    notification_id: NotificationId,
    now: u64,
    ttl_secs: u64,
) -> Transaction {
    let amount = entry.estimated_cost;
    let expires_at = now.saturating_add(ttl_secs);
    let (debit, sponsor) = match source {
        FundingSource::Campaign(campaign_id) => (
            WriteOp::DebitCampaign { campaign_id, amount },
            format!("campaign {}", campaign_id.0),
        ),
        FundingSource::GeneralPool => (WriteOp::DebitPool { amount }, "the general donor pool".to_string()),
    };
    let mut tx = Transaction::new();
    tx.push(debit)
        .push(WriteOp::InsertAllocation(Allocation {
            allocation_id,
            waitlist_id: entry.waitlist_id,
            patient_id: entry.patient_id,
            screening_type_id: entry.screening_type_id,
            source,
            amount,
            status: AllocationStatus::Pending,
            created_at: now,
            expires_at,
        }))
        .push(WriteOp::MarkWaitlistMatched {
            waitlist_id: entry.waitlist_id,
            allocation_id,
        })
        .push(WriteOp::PushNotification(Notification {
            notification_id,
            patient_id: entry.patient_id,
            kind: NotificationKind::MatchFound,
            message: format!(
                "Your screening is sponsored by {} (allocation {}, {}). Book an appointment before {}.",
                sponsor, allocation_id.0, amount, expires_at
            ),
            allocation_id: Some(allocation_id),
            created_at: now,
        }));
    tx
}
