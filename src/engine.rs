//! Single-entry engine facade.
//!
//! Holds the platform store, config and check-in code generator so the protocol layer
//! can drive the full lifecycle (waitlist, campaigns, matching, booking, check-in,
//! completion, expiry, payout) without touching [`PlatformStore`] directly.

use crate::checkin::{normalize_code, CodeGenerator};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::matching;
use crate::report::{MatchResult, MatchRunSummary};
use crate::store::{EngineSnapshot, PlatformStore, Transaction, WriteOp};
use crate::types::{
    Allocation, AllocationId, AllocationStatus, Appointment, AppointmentId, AppointmentStatus,
    Campaign, CampaignId, CampaignRequest, CampaignStatus, CenterId, DonorId, FundingSource,
    Notification, NotificationKind, PatientId, Payout, ScreeningTypeId, WaitlistEntry,
    WaitlistId, WaitlistRequest, WaitlistStatus,
};
use log::{info, warn};
use rust_decimal::Decimal;

/// Minimal surface needed to feed a waitlist and trigger matching. Used by replay helpers.
pub trait MatchingEngine {
    fn enqueue(&mut self, request: WaitlistRequest, now: u64) -> Result<WaitlistEntry, EngineError>;
    fn run_matching(&mut self, now: u64) -> MatchRunSummary;
}

/// Sponsorship matching engine.
///
/// Use [`Engine::enqueue`] to add patients, [`Engine::create_campaign`] and
/// [`Engine::donate_to_pool`] to add money, and [`Engine::run_matching`] to allocate it.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    store: PlatformStore,
    codes: CodeGenerator,
}

fn require_positive(what: &str, amount: Decimal) -> Result<(), EngineError> {
    if amount <= Decimal::ZERO {
        return Err(EngineError::Validation(format!("{} must be positive, got {}", what, amount)));
    }
    Ok(())
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self::from_snapshot(config, EngineSnapshot::default())
    }

    /// Restores an engine from persisted state.
    pub fn from_snapshot(config: EngineConfig, snapshot: EngineSnapshot) -> Self {
        let codes = CodeGenerator::new(config.rng_seed, config.check_in_code_len);
        Self {
            config,
            store: PlatformStore::from_snapshot(snapshot),
            codes,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        self.store.snapshot()
    }

    // ---- waitlist ----

    /// Adds a patient to the waitlist for one screening type.
    ///
    /// Returns `Err` for a non-positive cost, an empty region, or when the patient already
    /// has an open entry for that screening type.
    pub fn enqueue(&mut self, request: WaitlistRequest, now: u64) -> Result<WaitlistEntry, EngineError> {
        info!(
            "waitlist enqueue patient_id={} screening_type_id={} region={} cost={}",
            request.patient_id.0, request.screening_type_id.0, request.region, request.estimated_cost
        );
        require_positive("estimated_cost", request.estimated_cost)?;
        let region = request.region.trim();
        if region.is_empty() {
            return Err(EngineError::Validation("region must not be empty".into()));
        }
        if self
            .store
            .has_open_entry(request.patient_id, request.screening_type_id)
        {
            return Err(EngineError::Conflict(format!(
                "patient {} already waiting for screening type {}",
                request.patient_id.0, request.screening_type_id.0
            )));
        }
        let entry = WaitlistEntry {
            waitlist_id: self.store.sequences().waitlist(),
            patient_id: request.patient_id,
            screening_type_id: request.screening_type_id,
            region: region.to_string(),
            estimated_cost: request.estimated_cost,
            joined_at: now,
            status: WaitlistStatus::Pending,
            allocation_id: None,
        };
        self.store.insert_waitlist(entry.clone());
        Ok(entry)
    }

    /// Removes a pending entry from the waitlist.
    pub fn withdraw(&mut self, waitlist_id: WaitlistId) -> Result<WaitlistEntry, EngineError> {
        let entry = self.store.withdraw_waitlist(waitlist_id)?;
        info!(
            "waitlist withdraw waitlist_id={} patient_id={}",
            waitlist_id.0, entry.patient_id.0
        );
        Ok(entry)
    }

    /// Pending entries for a screening type, in the order matching will visit them.
    pub fn pending_waitlist(&self, screening_type_id: ScreeningTypeId) -> Vec<WaitlistEntry> {
        self.store
            .pending_entries(screening_type_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn waitlist_entry(&self, waitlist_id: WaitlistId) -> Option<&WaitlistEntry> {
        self.store.waitlist_entry(waitlist_id)
    }

    // ---- campaigns and pool ----

    pub fn create_campaign(&mut self, request: CampaignRequest, now: u64) -> Result<Campaign, EngineError> {
        if request.title.trim().is_empty() {
            return Err(EngineError::Validation("title must not be empty".into()));
        }
        if request.initial_amount < Decimal::ZERO {
            return Err(EngineError::Validation("initial_amount must not be negative".into()));
        }
        let mut screening_type_ids = request.screening_type_ids;
        screening_type_ids.sort();
        screening_type_ids.dedup();
        let regions: Vec<String> = request
            .regions
            .iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        let campaign = Campaign {
            campaign_id: self.store.sequences().campaign(),
            donor_id: request.donor_id,
            title: request.title.trim().to_string(),
            screening_type_ids,
            regions,
            funded_amount: request.initial_amount,
            available_amount: request.initial_amount,
            status: CampaignStatus::Active,
            created_at: now,
        };
        info!(
            "campaign created campaign_id={} donor_id={} amount={} types={:?} regions={:?}",
            campaign.campaign_id.0,
            campaign.donor_id.0,
            campaign.funded_amount,
            campaign.screening_type_ids,
            campaign.regions
        );
        self.store.insert_campaign(campaign.clone());
        Ok(campaign)
    }

    /// Adds money to a campaign that is not closed.
    pub fn fund_campaign(&mut self, campaign_id: CampaignId, amount: Decimal) -> Result<Campaign, EngineError> {
        require_positive("amount", amount)?;
        let campaign = self
            .store
            .campaign_mut(campaign_id)
            .ok_or(EngineError::NotFound("campaign", campaign_id.0))?;
        if campaign.status == CampaignStatus::Closed {
            return Err(EngineError::Conflict(format!("campaign {} is closed", campaign_id.0)));
        }
        let overflow = || {
            EngineError::Validation(format!(
                "campaign {} balance would overflow adding {}",
                campaign_id.0, amount
            ))
        };
        let funded = campaign.funded_amount.checked_add(amount).ok_or_else(overflow)?;
        let available = campaign.available_amount.checked_add(amount).ok_or_else(overflow)?;
        campaign.funded_amount = funded;
        campaign.available_amount = available;
        info!(
            "campaign funded campaign_id={} amount={} available={}",
            campaign_id.0, amount, campaign.available_amount
        );
        Ok(campaign.clone())
    }

    /// Pause, resume or close a campaign. `Closed` is terminal.
    pub fn set_campaign_status(
        &mut self,
        campaign_id: CampaignId,
        status: CampaignStatus,
    ) -> Result<Campaign, EngineError> {
        let campaign = self
            .store
            .campaign_mut(campaign_id)
            .ok_or(EngineError::NotFound("campaign", campaign_id.0))?;
        if campaign.status == CampaignStatus::Closed && status != CampaignStatus::Closed {
            return Err(EngineError::Conflict(format!("campaign {} is closed", campaign_id.0)));
        }
        info!(
            "campaign status campaign_id={} from={:?} to={:?}",
            campaign_id.0, campaign.status, status
        );
        campaign.status = status;
        Ok(campaign.clone())
    }

    pub fn campaign(&self, campaign_id: CampaignId) -> Option<&Campaign> {
        self.store.campaign(campaign_id)
    }

    pub fn campaigns(&self) -> Vec<Campaign> {
        self.store.campaigns().cloned().collect()
    }

    /// Adds untargeted money to the general pool. Returns the new pool balance.
    pub fn donate_to_pool(&mut self, donor_id: DonorId, amount: Decimal) -> Result<Decimal, EngineError> {
        require_positive("amount", amount)?;
        let balance = self.store.credit_pool(amount)?;
        info!(
            "pool donation donor_id={} amount={} balance={}",
            donor_id.0, amount, balance
        );
        Ok(balance)
    }

    pub fn general_pool_balance(&self) -> Decimal {
        self.store.general_pool()
    }

    // ---- matching ----

    /// Runs one matching pass. See [`crate::matching::run_matching`].
    pub fn run_matching(&mut self, now: u64) -> MatchRunSummary {
        let summary = matching::run_matching(&mut self.store, &self.config, now);
        for outcome in &summary.outcomes {
            match &outcome.result {
                MatchResult::Matched { allocation_id, source, amount } => info!(
                    "allocation created allocation_id={} waitlist_id={} patient_id={} source={:?} amount={}",
                    allocation_id.0, outcome.waitlist_id.0, outcome.patient_id.0, source, amount
                ),
                MatchResult::Skipped { reason } => info!(
                    "waitlist skipped waitlist_id={} patient_id={} reason={:?}",
                    outcome.waitlist_id.0, outcome.patient_id.0, reason
                ),
                MatchResult::Unfunded => info!(
                    "waitlist unfunded waitlist_id={} patient_id={}",
                    outcome.waitlist_id.0, outcome.patient_id.0
                ),
                MatchResult::Failed { error } => warn!(
                    "match failed waitlist_id={} patient_id={} error={}",
                    outcome.waitlist_id.0, outcome.patient_id.0, error
                ),
            }
        }
        info!(
            "matching run at={} processed={} matched={}",
            now,
            summary.processed_count(),
            summary.matched_count()
        );
        summary
    }

    // ---- allocations and appointments ----

    /// Claims a pending allocation by booking an appointment at a center.
    ///
    /// Returns the booked appointment carrying a fresh check-in code.
    pub fn claim_allocation(
        &mut self,
        allocation_id: AllocationId,
        patient_id: PatientId,
        center_id: CenterId,
        scheduled_at: u64,
        now: u64,
    ) -> Result<Appointment, EngineError> {
        let allocation = self
            .store
            .allocation(allocation_id)
            .ok_or(EngineError::NotFound("allocation", allocation_id.0))?
            .clone();
        if allocation.patient_id != patient_id {
            return Err(EngineError::Forbidden(format!(
                "allocation {} belongs to another patient",
                allocation_id.0
            )));
        }
        if allocation.status != AllocationStatus::Pending {
            return Err(EngineError::Conflict(format!(
                "allocation {} is {:?}",
                allocation_id.0, allocation.status
            )));
        }
        if now >= allocation.expires_at {
            return Err(EngineError::Expired(allocation_id.0));
        }
        if scheduled_at < now {
            return Err(EngineError::Validation("scheduled_at is in the past".into()));
        }
        let store = &self.store;
        let code = self
            .codes
            .unique_code(|c| store.code_in_use(c))
            .ok_or_else(|| EngineError::Conflict("no free check-in code".into()))?;
        let appointment = Appointment {
            appointment_id: self.store.sequences().appointment(),
            allocation_id,
            patient_id,
            center_id,
            screening_type_id: allocation.screening_type_id,
            scheduled_at,
            check_in_code: code,
            amount: allocation.amount,
            status: AppointmentStatus::Booked,
            checked_in_at: None,
            completed_at: None,
            result_summary: None,
            paid_out: false,
        };
        let notification_id = self.store.sequences().notification();
        let mut tx = Transaction::new();
        tx.push(WriteOp::InsertAppointment(appointment.clone()))
            .push(WriteOp::SetAllocationStatus {
                allocation_id,
                status: AllocationStatus::Claimed,
            })
            .push(WriteOp::PushNotification(Notification {
                notification_id,
                patient_id,
                kind: NotificationKind::AppointmentBooked,
                message: format!(
                    "Appointment {} booked at center {}. Your check-in code is {}.",
                    appointment.appointment_id.0, center_id.0, appointment.check_in_code
                ),
                allocation_id: Some(allocation_id),
                created_at: now,
            }));
        self.store.commit(tx)?;
        info!(
            "allocation claimed allocation_id={} appointment_id={} center_id={} scheduled_at={}",
            allocation_id.0, appointment.appointment_id.0, center_id.0, scheduled_at
        );
        Ok(appointment)
    }

    /// Starts an appointment at the center from the patient's check-in code.
    pub fn check_in(&mut self, center_id: CenterId, code: &str, now: u64) -> Result<Appointment, EngineError> {
        let code = normalize_code(code);
        let appointment = self
            .store
            .appointment_by_code(&code)
            .ok_or_else(|| EngineError::UnknownCheckInCode(code.clone()))?;
        if appointment.center_id != center_id {
            return Err(EngineError::Forbidden(format!(
                "check-in code belongs to another center ({})",
                appointment.center_id.0
            )));
        }
        if appointment.status != AppointmentStatus::Booked {
            return Err(EngineError::Conflict(format!(
                "appointment {} is {:?}",
                appointment.appointment_id.0, appointment.status
            )));
        }
        let mut updated = appointment.clone();
        updated.status = AppointmentStatus::CheckedIn;
        updated.checked_in_at = Some(now);
        let mut tx = Transaction::new();
        tx.push(WriteOp::UpdateAppointment(updated.clone()));
        self.store.commit(tx)?;
        info!(
            "appointment checked in appointment_id={} center_id={}",
            updated.appointment_id.0, center_id.0
        );
        Ok(updated)
    }

    /// Marks a checked-in appointment completed; the center earns its amount.
    pub fn complete_screening(
        &mut self,
        appointment_id: AppointmentId,
        center_id: CenterId,
        result_summary: Option<String>,
        now: u64,
    ) -> Result<Appointment, EngineError> {
        let appointment = self
            .store
            .appointment(appointment_id)
            .ok_or(EngineError::NotFound("appointment", appointment_id.0))?;
        if appointment.center_id != center_id {
            return Err(EngineError::Forbidden(format!(
                "appointment {} is at another center",
                appointment_id.0
            )));
        }
        if appointment.status != AppointmentStatus::CheckedIn {
            return Err(EngineError::Conflict(format!(
                "appointment {} is {:?}, must be checked in",
                appointment_id.0, appointment.status
            )));
        }
        let waitlist_id = self
            .store
            .allocation(appointment.allocation_id)
            .ok_or(EngineError::NotFound("allocation", appointment.allocation_id.0))?
            .waitlist_id;
        let mut updated = appointment.clone();
        updated.status = AppointmentStatus::Completed;
        updated.completed_at = Some(now);
        updated.result_summary = result_summary;
        let notification_id = self.store.sequences().notification();
        let mut tx = Transaction::new();
        tx.push(WriteOp::UpdateAppointment(updated.clone()))
            .push(WriteOp::SetAllocationStatus {
                allocation_id: updated.allocation_id,
                status: AllocationStatus::Completed,
            })
            .push(WriteOp::FulfillWaitlist { waitlist_id })
            .push(WriteOp::PushNotification(Notification {
                notification_id,
                patient_id: updated.patient_id,
                kind: NotificationKind::ScreeningCompleted,
                message: format!(
                    "Your screening (appointment {}) is complete. Results are available from center {}.",
                    appointment_id.0, center_id.0
                ),
                allocation_id: Some(updated.allocation_id),
                created_at: now,
            }));
        self.store.commit(tx)?;
        info!(
            "screening completed appointment_id={} center_id={} amount={}",
            appointment_id.0, center_id.0, updated.amount
        );
        Ok(updated)
    }

    /// Expires every pending allocation with `expires_at <= now`.
    ///
    /// Funds go back to their source and the waitlist entry returns to the queue at its
    /// original position. Returns the expired allocations.
    pub fn expire_allocations(&mut self, now: u64) -> Vec<Allocation> {
        let due: Vec<Allocation> = self
            .store
            .allocations()
            .filter(|a| a.is_unclaimed() && a.expires_at <= now)
            .cloned()
            .collect();
        let mut expired = Vec::with_capacity(due.len());
        for mut allocation in due {
            let credit = match allocation.source {
                FundingSource::Campaign(campaign_id) => WriteOp::CreditCampaign {
                    campaign_id,
                    amount: allocation.amount,
                },
                FundingSource::GeneralPool => WriteOp::CreditPool {
                    amount: allocation.amount,
                },
            };
            let notification_id = self.store.sequences().notification();
            let mut tx = Transaction::new();
            tx.push(WriteOp::SetAllocationStatus {
                allocation_id: allocation.allocation_id,
                status: AllocationStatus::Expired,
            })
            .push(credit)
            .push(WriteOp::RequeueWaitlist {
                waitlist_id: allocation.waitlist_id,
            })
            .push(WriteOp::PushNotification(Notification {
                notification_id,
                patient_id: allocation.patient_id,
                kind: NotificationKind::AllocationExpired,
                message: format!(
                    "Allocation {} expired before an appointment was booked. You are back on the waitlist.",
                    allocation.allocation_id.0
                ),
                allocation_id: Some(allocation.allocation_id),
                created_at: now,
            }));
            match self.store.commit(tx) {
                Ok(()) => {
                    info!(
                        "allocation expired allocation_id={} patient_id={} amount={} source={:?}",
                        allocation.allocation_id.0,
                        allocation.patient_id.0,
                        allocation.amount,
                        allocation.source
                    );
                    allocation.status = AllocationStatus::Expired;
                    expired.push(allocation);
                }
                Err(e) => warn!(
                    "allocation expiry failed allocation_id={} error={}",
                    allocation.allocation_id.0, e
                ),
            }
        }
        expired
    }

    pub fn allocation(&self, allocation_id: AllocationId) -> Option<&Allocation> {
        self.store.allocation(allocation_id)
    }

    pub fn allocations_for(&self, patient_id: PatientId) -> Vec<Allocation> {
        self.store
            .allocations()
            .filter(|a| a.patient_id == patient_id)
            .cloned()
            .collect()
    }

    pub fn appointment(&self, appointment_id: AppointmentId) -> Option<&Appointment> {
        self.store.appointment(appointment_id)
    }

    // ---- payouts ----

    /// Aggregates every completed, unpaid appointment of a center into one payout.
    pub fn create_payout(&mut self, center_id: CenterId, now: u64) -> Result<Payout, EngineError> {
        let due: Vec<Appointment> = self
            .store
            .appointments()
            .filter(|a| {
                a.center_id == center_id && a.status == AppointmentStatus::Completed && !a.paid_out
            })
            .cloned()
            .collect();
        if due.is_empty() {
            return Err(EngineError::Validation(format!(
                "center {} has no completed unpaid screenings",
                center_id.0
            )));
        }
        let amount = due
            .iter()
            .try_fold(Decimal::ZERO, |total, a| total.checked_add(a.amount))
            .ok_or_else(|| {
                EngineError::Validation(format!("payout total for center {} overflows", center_id.0))
            })?;
        let payout = Payout {
            payout_id: self.store.sequences().payout(),
            center_id,
            amount,
            appointment_ids: due.iter().map(|a| a.appointment_id).collect(),
            created_at: now,
        };
        let mut tx = Transaction::new();
        for mut appointment in due {
            appointment.paid_out = true;
            tx.push(WriteOp::UpdateAppointment(appointment));
        }
        tx.push(WriteOp::InsertPayout(payout.clone()));
        self.store.commit(tx)?;
        info!(
            "payout created payout_id={} center_id={} amount={} appointments={}",
            payout.payout_id.0,
            center_id.0,
            amount,
            payout.appointment_ids.len()
        );
        Ok(payout)
    }

    pub fn payouts(&self) -> &[Payout] {
        self.store.payouts()
    }

    // ---- notifications ----

    pub fn notifications_for(&self, patient_id: PatientId) -> Vec<Notification> {
        self.store
            .notifications()
            .iter()
            .filter(|n| n.patient_id == patient_id)
            .cloned()
            .collect()
    }

    /// Total notifications ever written; use with [`Engine::notifications_since`] to tail.
    pub fn notification_count(&self) -> usize {
        self.store.notifications().len()
    }

    pub fn notifications_since(&self, index: usize) -> &[Notification] {
        self.store.notifications().get(index..).unwrap_or(&[])
    }

    /// Money not yet paid to centers. Constant across matching, claim and expiry.
    /// `None` if the total does not fit in a `Decimal`.
    pub fn total_committed_funds(&self) -> Option<Decimal> {
        self.store.total_committed_funds()
    }
}

impl MatchingEngine for Engine {
    fn enqueue(&mut self, request: WaitlistRequest, now: u64) -> Result<WaitlistEntry, EngineError> {
        Engine::enqueue(self, request, now)
    }

    fn run_matching(&mut self, now: u64) -> MatchRunSummary {
        Engine::run_matching(self, now)
    }
}
