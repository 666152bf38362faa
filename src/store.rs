//! Platform state: waitlist queues, campaigns, general pool, allocations, appointments.
//!
//! Pending waitlist entries sit in one FCFS queue per screening type, keyed by
//! `(joined_at, waitlist_id)`. Multi-row writes go through a [`Transaction`]: all
//! staged ops are validated against current state (including the effect of earlier ops
//! in the same transaction) before any is applied, so a commit is all-or-nothing.

use crate::error::EngineError;
use crate::types::{
    Allocation, AllocationId, AllocationStatus, Appointment, AppointmentId, AppointmentStatus,
    Campaign, CampaignId, CampaignStatus, Notification, NotificationId, PatientId, Payout,
    PayoutId, ScreeningTypeId, WaitlistEntry, WaitlistId, WaitlistStatus,
};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// FCFS key: earliest join first, ties by id.
type QueueKey = (u64, WaitlistId);

fn overflow(what: &str, amount: Decimal) -> EngineError {
    EngineError::Validation(format!("{} balance would overflow adding {}", what, amount))
}

/// Next-id counters. Ids are never reused, even when a transaction fails.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Sequences {
    pub next_waitlist: u64,
    pub next_campaign: u64,
    pub next_allocation: u64,
    pub next_notification: u64,
    pub next_appointment: u64,
    pub next_payout: u64,
}

impl Default for Sequences {
    fn default() -> Self {
        Self {
            next_waitlist: 1,
            next_campaign: 1,
            next_allocation: 1,
            next_notification: 1,
            next_appointment: 1,
            next_payout: 1,
        }
    }
}

fn bump(counter: &mut u64) -> u64 {
    let id = *counter;
    *counter += 1;
    id
}

impl Sequences {
    pub fn waitlist(&mut self) -> WaitlistId {
        WaitlistId(bump(&mut self.next_waitlist))
    }

    pub fn campaign(&mut self) -> CampaignId {
        CampaignId(bump(&mut self.next_campaign))
    }

    pub fn allocation(&mut self) -> AllocationId {
        AllocationId(bump(&mut self.next_allocation))
    }

    pub fn notification(&mut self) -> NotificationId {
        NotificationId(bump(&mut self.next_notification))
    }

    pub fn appointment(&mut self) -> AppointmentId {
        AppointmentId(bump(&mut self.next_appointment))
    }

    pub fn payout(&mut self) -> PayoutId {
        PayoutId(bump(&mut self.next_payout))
    }
}

/// One staged write.
#[derive(Clone, Debug)]
pub enum WriteOp {
    DebitCampaign { campaign_id: CampaignId, amount: Decimal },
    CreditCampaign { campaign_id: CampaignId, amount: Decimal },
    DebitPool { amount: Decimal },
    CreditPool { amount: Decimal },
    InsertAllocation(Allocation),
    SetAllocationStatus { allocation_id: AllocationId, status: AllocationStatus },
    MarkWaitlistMatched { waitlist_id: WaitlistId, allocation_id: AllocationId },
    /// Matched entry goes back to pending, keeping its original `joined_at`.
    RequeueWaitlist { waitlist_id: WaitlistId },
    /// Matched entry whose screening completed. Frees the patient to join again.
    FulfillWaitlist { waitlist_id: WaitlistId },
    PushNotification(Notification),
    InsertAppointment(Appointment),
    /// Replaces an existing appointment. Completing it retires its check-in code.
    UpdateAppointment(Appointment),
    InsertPayout(Payout),
}

/// Ordered batch of writes committed with [`PlatformStore::commit`].
#[derive(Clone, Debug, Default)]
pub struct Transaction {
    ops: Vec<WriteOp>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Serializable copy of the full store, for persistence and restart.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EngineSnapshot {
    pub waitlist: Vec<WaitlistEntry>,
    pub campaigns: Vec<Campaign>,
    pub general_pool: Decimal,
    pub allocations: Vec<Allocation>,
    pub notifications: Vec<Notification>,
    pub appointments: Vec<Appointment>,
    pub payouts: Vec<Payout>,
    pub sequences: Sequences,
}

#[derive(Debug, Default)]
pub struct PlatformStore {
    waitlist: BTreeMap<WaitlistId, WaitlistEntry>,
    queues: BTreeMap<ScreeningTypeId, BTreeSet<QueueKey>>,
    /// (patient, screening type) pairs with a pending or matched entry.
    open: HashSet<(PatientId, ScreeningTypeId)>,
    campaigns: BTreeMap<CampaignId, Campaign>,
    general_pool: Decimal,
    allocations: BTreeMap<AllocationId, Allocation>,
    /// Pending allocation count per patient.
    unclaimed: HashMap<PatientId, usize>,
    notifications: Vec<Notification>,
    appointments: BTreeMap<AppointmentId, Appointment>,
    /// Check-in codes of appointments not yet completed.
    active_codes: HashMap<String, AppointmentId>,
    payouts: Vec<Payout>,
    seq: Sequences,
}

impl PlatformStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sequences(&mut self) -> &mut Sequences {
        &mut self.seq
    }

    // ---- waitlist ----

    pub fn insert_waitlist(&mut self, entry: WaitlistEntry) {
        if entry.status == WaitlistStatus::Pending {
            self.queues
                .entry(entry.screening_type_id)
                .or_default()
                .insert((entry.joined_at, entry.waitlist_id));
        }
        if entry.is_open() {
            self.open.insert((entry.patient_id, entry.screening_type_id));
        }
        self.waitlist.insert(entry.waitlist_id, entry);
    }

    pub fn waitlist_entry(&self, waitlist_id: WaitlistId) -> Option<&WaitlistEntry> {
        self.waitlist.get(&waitlist_id)
    }

    /// Mark a pending entry withdrawn and drop it from its queue.
    pub fn withdraw_waitlist(&mut self, waitlist_id: WaitlistId) -> Result<WaitlistEntry, EngineError> {
        let entry = self
            .waitlist
            .get_mut(&waitlist_id)
            .ok_or(EngineError::NotFound("waitlist entry", waitlist_id.0))?;
        if entry.status != WaitlistStatus::Pending {
            return Err(EngineError::Conflict(format!(
                "waitlist entry {} is {:?}, only pending entries can be withdrawn",
                waitlist_id.0, entry.status
            )));
        }
        entry.status = WaitlistStatus::Withdrawn;
        let key = (entry.joined_at, entry.waitlist_id);
        let screening_type_id = entry.screening_type_id;
        let entry = entry.clone();
        self.open.remove(&(entry.patient_id, screening_type_id));
        self.remove_from_queue(screening_type_id, key);
        Ok(entry)
    }

    /// True if the patient already has a pending or matched entry for this screening type.
    pub fn has_open_entry(&self, patient_id: PatientId, screening_type_id: ScreeningTypeId) -> bool {
        self.open.contains(&(patient_id, screening_type_id))
    }

    /// Screening types that currently have pending entries, ascending.
    pub fn screening_types_with_pending(&self) -> Vec<ScreeningTypeId> {
        self.queues
            .iter()
            .filter(|(_, q)| !q.is_empty())
            .map(|(t, _)| *t)
            .collect()
    }

    /// Pending entries of one screening type in FCFS order.
    pub fn pending_entries(&self, screening_type_id: ScreeningTypeId) -> Vec<&WaitlistEntry> {
        self.queues
            .get(&screening_type_id)
            .map(|q| q.iter().filter_map(|(_, id)| self.waitlist.get(id)).collect())
            .unwrap_or_default()
    }

    fn remove_from_queue(&mut self, screening_type_id: ScreeningTypeId, key: QueueKey) {
        if let Some(queue) = self.queues.get_mut(&screening_type_id) {
            queue.remove(&key);
            if queue.is_empty() {
                self.queues.remove(&screening_type_id);
            }
        }
    }

    // ---- campaigns and pool ----

    pub fn insert_campaign(&mut self, campaign: Campaign) {
        self.campaigns.insert(campaign.campaign_id, campaign);
    }

    pub fn campaign(&self, campaign_id: CampaignId) -> Option<&Campaign> {
        self.campaigns.get(&campaign_id)
    }

    pub fn campaign_mut(&mut self, campaign_id: CampaignId) -> Option<&mut Campaign> {
        self.campaigns.get_mut(&campaign_id)
    }

    pub fn campaigns(&self) -> impl Iterator<Item = &Campaign> {
        self.campaigns.values()
    }

    pub fn general_pool(&self) -> Decimal {
        self.general_pool
    }

    // ---- allocations ----

    pub fn allocation(&self, allocation_id: AllocationId) -> Option<&Allocation> {
        self.allocations.get(&allocation_id)
    }

    pub fn allocations(&self) -> impl Iterator<Item = &Allocation> {
        self.allocations.values()
    }

    pub fn unclaimed_count(&self, patient_id: PatientId) -> usize {
        self.unclaimed.get(&patient_id).copied().unwrap_or(0)
    }

    fn adjust_unclaimed(&mut self, patient_id: PatientId, was_pending: bool, is_pending: bool) {
        match (was_pending, is_pending) {
            (false, true) => *self.unclaimed.entry(patient_id).or_insert(0) += 1,
            (true, false) => {
                if let Some(n) = self.unclaimed.get_mut(&patient_id) {
                    *n = n.saturating_sub(1);
                    if *n == 0 {
                        self.unclaimed.remove(&patient_id);
                    }
                }
            }
            _ => {}
        }
    }

    // ---- notifications, appointments, payouts ----

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn appointment(&self, appointment_id: AppointmentId) -> Option<&Appointment> {
        self.appointments.get(&appointment_id)
    }

    pub fn appointments(&self) -> impl Iterator<Item = &Appointment> {
        self.appointments.values()
    }

    pub fn appointment_by_code(&self, code: &str) -> Option<&Appointment> {
        self.active_codes
            .get(code)
            .and_then(|id| self.appointments.get(id))
    }

    pub fn code_in_use(&self, code: &str) -> bool {
        self.active_codes.contains_key(code)
    }

    pub fn payouts(&self) -> &[Payout] {
        &self.payouts
    }

    /// Direct pool credit for donations. Amount must already be validated positive.
    /// Returns the new balance; the pool is unchanged if it would overflow.
    pub fn credit_pool(&mut self, amount: Decimal) -> Result<Decimal, EngineError> {
        self.general_pool = self
            .general_pool
            .checked_add(amount)
            .ok_or_else(|| overflow("general pool", amount))?;
        Ok(self.general_pool)
    }

    // ---- transactions ----

    /// Validate every op, then apply all of them. On error nothing is applied.
    pub fn commit(&mut self, tx: Transaction) -> Result<(), EngineError> {
        self.validate(&tx)?;
        for op in tx.ops {
            self.apply(op);
        }
        Ok(())
    }

    fn validate(&self, tx: &Transaction) -> Result<(), EngineError> {
        let mut campaign_balance: HashMap<CampaignId, Decimal> = HashMap::new();
        let mut pool = self.general_pool;
        let mut waitlist_status: HashMap<WaitlistId, WaitlistStatus> = HashMap::new();
        let mut new_allocations: HashSet<AllocationId> = HashSet::new();
        let mut new_appointments: HashSet<AppointmentId> = HashSet::new();

        let positive = |amount: Decimal| -> Result<(), EngineError> {
            if amount <= Decimal::ZERO {
                return Err(EngineError::Validation(format!("amount must be positive, got {}", amount)));
            }
            Ok(())
        };

        for op in &tx.ops {
            match op {
                WriteOp::DebitCampaign { campaign_id, amount }
                | WriteOp::CreditCampaign { campaign_id, amount } => {
                    positive(*amount)?;
                    let campaign = self
                        .campaigns
                        .get(campaign_id)
                        .ok_or(EngineError::NotFound("campaign", campaign_id.0))?;
                    let balance = campaign_balance
                        .entry(*campaign_id)
                        .or_insert(campaign.available_amount);
                    if matches!(op, WriteOp::DebitCampaign { .. }) {
                        if *balance < *amount {
                            return Err(EngineError::InsufficientFunds(format!(
                                "campaign {} has {} available, needs {}",
                                campaign_id.0, balance, amount
                            )));
                        }
                        *balance -= *amount;
                    } else {
                        *balance = balance
                            .checked_add(*amount)
                            .ok_or_else(|| overflow(&format!("campaign {}", campaign_id.0), *amount))?;
                    }
                }
                WriteOp::DebitPool { amount } => {
                    positive(*amount)?;
                    if pool < *amount {
                        return Err(EngineError::InsufficientFunds(format!(
                            "general pool has {}, needs {}",
                            pool, amount
                        )));
                    }
                    pool -= *amount;
                }
                WriteOp::CreditPool { amount } => {
                    positive(*amount)?;
                    pool = pool
                        .checked_add(*amount)
                        .ok_or_else(|| overflow("general pool", *amount))?;
                }
                WriteOp::InsertAllocation(a) => {
                    positive(a.amount)?;
                    if self.allocations.contains_key(&a.allocation_id)
                        || !new_allocations.insert(a.allocation_id)
                    {
                        return Err(EngineError::Conflict(format!(
                            "allocation {} already exists",
                            a.allocation_id.0
                        )));
                    }
                }
                WriteOp::SetAllocationStatus { allocation_id, .. } => {
                    if !self.allocations.contains_key(allocation_id)
                        && !new_allocations.contains(allocation_id)
                    {
                        return Err(EngineError::NotFound("allocation", allocation_id.0));
                    }
                }
                WriteOp::MarkWaitlistMatched { waitlist_id, .. }
                | WriteOp::RequeueWaitlist { waitlist_id }
                | WriteOp::FulfillWaitlist { waitlist_id } => {
                    let entry = self
                        .waitlist
                        .get(waitlist_id)
                        .ok_or(EngineError::NotFound("waitlist entry", waitlist_id.0))?;
                    let status = waitlist_status.entry(*waitlist_id).or_insert(entry.status);
                    let (required, next) = match op {
                        WriteOp::MarkWaitlistMatched { .. } => {
                            (WaitlistStatus::Pending, WaitlistStatus::Matched)
                        }
                        WriteOp::FulfillWaitlist { .. } => {
                            (WaitlistStatus::Matched, WaitlistStatus::Fulfilled)
                        }
                        _ => (WaitlistStatus::Matched, WaitlistStatus::Pending),
                    };
                    if *status != required {
                        return Err(EngineError::Conflict(format!(
                            "waitlist entry {} is {:?}, expected {:?}",
                            waitlist_id.0, status, required
                        )));
                    }
                    *status = next;
                }
                WriteOp::PushNotification(_) => {}
                WriteOp::InsertAppointment(a) => {
                    if self.appointments.contains_key(&a.appointment_id)
                        || !new_appointments.insert(a.appointment_id)
                    {
                        return Err(EngineError::Conflict(format!(
                            "appointment {} already exists",
                            a.appointment_id.0
                        )));
                    }
                    if self.active_codes.contains_key(&a.check_in_code) {
                        return Err(EngineError::Conflict("check-in code already in use".into()));
                    }
                }
                WriteOp::UpdateAppointment(a) => {
                    if !self.appointments.contains_key(&a.appointment_id)
                        && !new_appointments.contains(&a.appointment_id)
                    {
                        return Err(EngineError::NotFound("appointment", a.appointment_id.0));
                    }
                }
                WriteOp::InsertPayout(p) => positive(p.amount)?,
            }
        }
        Ok(())
    }

    fn apply(&mut self, op: WriteOp) {
        match op {
            WriteOp::DebitCampaign { campaign_id, amount } => {
                if let Some(c) = self.campaigns.get_mut(&campaign_id) {
                    c.available_amount -= amount;
                }
            }
            WriteOp::CreditCampaign { campaign_id, amount } => {
                if let Some(c) = self.campaigns.get_mut(&campaign_id) {
                    c.available_amount += amount;
                }
            }
            WriteOp::DebitPool { amount } => self.general_pool -= amount,
            WriteOp::CreditPool { amount } => self.general_pool += amount,
            WriteOp::InsertAllocation(a) => {
                self.adjust_unclaimed(a.patient_id, false, a.is_unclaimed());
                self.allocations.insert(a.allocation_id, a);
            }
            WriteOp::SetAllocationStatus { allocation_id, status } => {
                let Some(a) = self.allocations.get_mut(&allocation_id) else {
                    return;
                };
                let was_pending = a.is_unclaimed();
                a.status = status;
                let (patient_id, is_pending) = (a.patient_id, a.is_unclaimed());
                self.adjust_unclaimed(patient_id, was_pending, is_pending);
            }
            WriteOp::MarkWaitlistMatched { waitlist_id, allocation_id } => {
                let Some(entry) = self.waitlist.get_mut(&waitlist_id) else {
                    return;
                };
                entry.status = WaitlistStatus::Matched;
                entry.allocation_id = Some(allocation_id);
                let (screening_type_id, key) =
                    (entry.screening_type_id, (entry.joined_at, entry.waitlist_id));
                self.remove_from_queue(screening_type_id, key);
            }
            WriteOp::RequeueWaitlist { waitlist_id } => {
                let Some(entry) = self.waitlist.get_mut(&waitlist_id) else {
                    return;
                };
                entry.status = WaitlistStatus::Pending;
                entry.allocation_id = None;
                self.queues
                    .entry(entry.screening_type_id)
                    .or_default()
                    .insert((entry.joined_at, entry.waitlist_id));
            }
            WriteOp::FulfillWaitlist { waitlist_id } => {
                let Some(entry) = self.waitlist.get_mut(&waitlist_id) else {
                    return;
                };
                entry.status = WaitlistStatus::Fulfilled;
                self.open.remove(&(entry.patient_id, entry.screening_type_id));
            }
            WriteOp::PushNotification(n) => self.notifications.push(n),
            WriteOp::InsertAppointment(a) => {
                if a.status != AppointmentStatus::Completed {
                    self.active_codes.insert(a.check_in_code.clone(), a.appointment_id);
                }
                self.appointments.insert(a.appointment_id, a);
            }
            WriteOp::UpdateAppointment(a) => {
                if a.status == AppointmentStatus::Completed {
                    self.active_codes.remove(&a.check_in_code);
                }
                self.appointments.insert(a.appointment_id, a);
            }
            WriteOp::InsertPayout(p) => self.payouts.push(p),
        }
    }

    // ---- snapshot ----

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            waitlist: self.waitlist.values().cloned().collect(),
            campaigns: self.campaigns.values().cloned().collect(),
            general_pool: self.general_pool,
            allocations: self.allocations.values().cloned().collect(),
            notifications: self.notifications.clone(),
            appointments: self.appointments.values().cloned().collect(),
            payouts: self.payouts.clone(),
            sequences: self.seq.clone(),
        }
    }

    /// Rebuild a store (queues, unclaimed counts, active codes) from a snapshot.
    pub fn from_snapshot(snapshot: EngineSnapshot) -> Self {
        let mut store = Self {
            general_pool: snapshot.general_pool,
            notifications: snapshot.notifications,
            payouts: snapshot.payouts,
            seq: snapshot.sequences,
            ..Self::default()
        };
        for entry in snapshot.waitlist {
            store.insert_waitlist(entry);
        }
        for campaign in snapshot.campaigns {
            store.insert_campaign(campaign);
        }
        for a in snapshot.allocations {
            store.adjust_unclaimed(a.patient_id, false, a.is_unclaimed());
            store.allocations.insert(a.allocation_id, a);
        }
        for a in snapshot.appointments {
            if a.status != AppointmentStatus::Completed {
                store.active_codes.insert(a.check_in_code.clone(), a.appointment_id);
            }
            store.appointments.insert(a.appointment_id, a);
        }
        store
    }

    /// Sum of money not yet spent: campaign balances, pool, and allocations still pending or
    /// claimed. `None` if the total does not fit in a `Decimal`.
    pub fn total_committed_funds(&self) -> Option<Decimal> {
        let held = self
            .allocations
            .values()
            .filter(|a| matches!(a.status, AllocationStatus::Pending | AllocationStatus::Claimed))
            .map(|a| a.amount);
        self.campaigns
            .values()
            .map(|c| c.available_amount)
            .chain(held)
            .try_fold(self.general_pool, |total, amount| total.checked_add(amount))
    }

    /// True if the campaign is `Active`.
    pub fn campaign_is_active(&self, campaign_id: CampaignId) -> bool {
        self.campaigns
            .get(&campaign_id)
            .map(|c| c.status == CampaignStatus::Active)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DonorId, FundingSource, NotificationKind};

    fn entry(id: u64, patient: u64, screening: u64, joined_at: u64) -> WaitlistEntry {
        WaitlistEntry {
            waitlist_id: WaitlistId(id),
            patient_id: PatientId(patient),
            screening_type_id: ScreeningTypeId(screening),
            region: "Lagos".into(),
            estimated_cost: Decimal::from(50),
            joined_at,
            status: WaitlistStatus::Pending,
            allocation_id: None,
        }
    }

    fn campaign(id: u64, available: i64) -> Campaign {
        Campaign {
            campaign_id: CampaignId(id),
            donor_id: DonorId(1),
            title: format!("campaign {}", id),
            screening_type_ids: vec![],
            regions: vec![],
            funded_amount: Decimal::from(available),
            available_amount: Decimal::from(available),
            status: CampaignStatus::Active,
            created_at: 0,
        }
    }

    fn allocation(id: u64, waitlist: u64, patient: u64, amount: i64) -> Allocation {
        Allocation {
            allocation_id: AllocationId(id),
            waitlist_id: WaitlistId(waitlist),
            patient_id: PatientId(patient),
            screening_type_id: ScreeningTypeId(1),
            source: FundingSource::Campaign(CampaignId(1)),
            amount: Decimal::from(amount),
            status: AllocationStatus::Pending,
            created_at: 0,
            expires_at: 100,
        }
    }

    #[test]
    fn pending_entries_are_fcfs_with_id_tiebreak() {
        let mut store = PlatformStore::new();
        store.insert_waitlist(entry(3, 3, 1, 20));
        store.insert_waitlist(entry(2, 2, 1, 10));
        store.insert_waitlist(entry(1, 1, 1, 10));
        let ids: Vec<u64> = store
            .pending_entries(ScreeningTypeId(1))
            .iter()
            .map(|e| e.waitlist_id.0)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn withdraw_removes_from_queue_and_rejects_twice() {
        let mut store = PlatformStore::new();
        store.insert_waitlist(entry(1, 1, 1, 10));
        store.withdraw_waitlist(WaitlistId(1)).unwrap();
        assert!(store.pending_entries(ScreeningTypeId(1)).is_empty());
        assert!(store.screening_types_with_pending().is_empty());
        let err = store.withdraw_waitlist(WaitlistId(1)).unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[test]
    fn commit_applies_all_ops() {
        let mut store = PlatformStore::new();
        store.insert_waitlist(entry(1, 7, 1, 10));
        store.insert_campaign(campaign(1, 100));
        let mut tx = Transaction::new();
        tx.push(WriteOp::DebitCampaign { campaign_id: CampaignId(1), amount: Decimal::from(50) })
            .push(WriteOp::InsertAllocation(allocation(1, 1, 7, 50)))
            .push(WriteOp::MarkWaitlistMatched { waitlist_id: WaitlistId(1), allocation_id: AllocationId(1) });
        store.commit(tx).unwrap();
        assert_eq!(store.campaign(CampaignId(1)).unwrap().available_amount, Decimal::from(50));
        assert_eq!(store.unclaimed_count(PatientId(7)), 1);
        assert_eq!(store.waitlist_entry(WaitlistId(1)).unwrap().status, WaitlistStatus::Matched);
        assert!(store.pending_entries(ScreeningTypeId(1)).is_empty());
    }

    #[test]
    fn commit_is_all_or_nothing_on_cumulative_overdraft() {
        let mut store = PlatformStore::new();
        store.insert_campaign(campaign(1, 80));
        let mut tx = Transaction::new();
        tx.push(WriteOp::DebitCampaign { campaign_id: CampaignId(1), amount: Decimal::from(50) })
            .push(WriteOp::PushNotification(Notification {
                notification_id: NotificationId(1),
                patient_id: PatientId(1),
                kind: NotificationKind::MatchFound,
                message: "m".into(),
                allocation_id: None,
                created_at: 0,
            }))
            .push(WriteOp::DebitCampaign { campaign_id: CampaignId(1), amount: Decimal::from(50) });
        let err = store.commit(tx).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFunds(_)));
        assert_eq!(store.campaign(CampaignId(1)).unwrap().available_amount, Decimal::from(80));
        assert!(store.notifications().is_empty());
    }

    #[test]
    fn matching_a_non_pending_entry_is_rejected() {
        let mut store = PlatformStore::new();
        store.insert_waitlist(entry(1, 1, 1, 10));
        let mut tx = Transaction::new();
        tx.push(WriteOp::MarkWaitlistMatched { waitlist_id: WaitlistId(1), allocation_id: AllocationId(1) })
            .push(WriteOp::MarkWaitlistMatched { waitlist_id: WaitlistId(1), allocation_id: AllocationId(2) });
        assert!(matches!(store.commit(tx), Err(EngineError::Conflict(_))));
        assert_eq!(store.waitlist_entry(WaitlistId(1)).unwrap().status, WaitlistStatus::Pending);
    }

    #[test]
    fn pool_debit_beyond_balance_rejected() {
        let mut store = PlatformStore::new();
        store.credit_pool(Decimal::from(10)).unwrap();
        let mut tx = Transaction::new();
        tx.push(WriteOp::DebitPool { amount: Decimal::from(11) });
        assert!(store.commit(tx).is_err());
        assert_eq!(store.general_pool(), Decimal::from(10));
    }

    #[test]
    fn allocation_status_change_updates_unclaimed_count() {
        let mut store = PlatformStore::new();
        let mut tx = Transaction::new();
        tx.push(WriteOp::InsertAllocation(allocation(1, 1, 5, 10)))
            .push(WriteOp::InsertAllocation(allocation(2, 2, 5, 10)));
        store.commit(tx).unwrap();
        assert_eq!(store.unclaimed_count(PatientId(5)), 2);
        let mut tx = Transaction::new();
        tx.push(WriteOp::SetAllocationStatus {
            allocation_id: AllocationId(1),
            status: AllocationStatus::Claimed,
        });
        store.commit(tx).unwrap();
        assert_eq!(store.unclaimed_count(PatientId(5)), 1);
    }

    #[test]
    fn snapshot_roundtrip_rebuilds_indexes() {
        let mut store = PlatformStore::new();
        store.insert_waitlist(entry(1, 1, 2, 10));
        store.insert_campaign(campaign(1, 100));
        store.credit_pool(Decimal::from(30)).unwrap();
        let mut tx = Transaction::new();
        tx.push(WriteOp::InsertAllocation(allocation(1, 9, 4, 10)));
        store.commit(tx).unwrap();
        store.sequences().allocation();

        let restored = PlatformStore::from_snapshot(store.snapshot());
        assert_eq!(restored.pending_entries(ScreeningTypeId(2)).len(), 1);
        assert_eq!(restored.unclaimed_count(PatientId(4)), 1);
        assert_eq!(restored.general_pool(), Decimal::from(30));
        assert_eq!(restored.snapshot(), store.snapshot());
        assert!(restored.has_open_entry(PatientId(1), ScreeningTypeId(2)));
    }

    #[test]
    fn open_entry_index_follows_status() {
        let mut store = PlatformStore::new();
        store.insert_waitlist(entry(1, 7, 1, 10));
        store.insert_waitlist(entry(2, 8, 1, 11));
        assert!(store.has_open_entry(PatientId(7), ScreeningTypeId(1)));
        assert!(!store.has_open_entry(PatientId(7), ScreeningTypeId(2)));

        store.withdraw_waitlist(WaitlistId(2)).unwrap();
        assert!(!store.has_open_entry(PatientId(8), ScreeningTypeId(1)));

        let mut tx = Transaction::new();
        tx.push(WriteOp::MarkWaitlistMatched { waitlist_id: WaitlistId(1), allocation_id: AllocationId(1) });
        store.commit(tx).unwrap();
        assert!(store.has_open_entry(PatientId(7), ScreeningTypeId(1)));

        let mut tx = Transaction::new();
        tx.push(WriteOp::FulfillWaitlist { waitlist_id: WaitlistId(1) });
        store.commit(tx).unwrap();
        assert_eq!(store.waitlist_entry(WaitlistId(1)).unwrap().status, WaitlistStatus::Fulfilled);
        assert!(!store.has_open_entry(PatientId(7), ScreeningTypeId(1)));
        assert!(store.pending_entries(ScreeningTypeId(1)).is_empty());
    }

    #[test]
    fn fulfilling_a_pending_entry_is_rejected() {
        let mut store = PlatformStore::new();
        store.insert_waitlist(entry(1, 1, 1, 10));
        let mut tx = Transaction::new();
        tx.push(WriteOp::FulfillWaitlist { waitlist_id: WaitlistId(1) });
        assert!(matches!(store.commit(tx), Err(EngineError::Conflict(_))));
        assert!(store.has_open_entry(PatientId(1), ScreeningTypeId(1)));
    }

    #[test]
    fn credit_overflow_is_rejected_without_change() {
        let mut store = PlatformStore::new();
        store.credit_pool(Decimal::MAX).unwrap();
        let err = store.credit_pool(Decimal::ONE).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(store.general_pool(), Decimal::MAX);

        let mut tx = Transaction::new();
        tx.push(WriteOp::CreditPool { amount: Decimal::ONE });
        assert!(matches!(store.commit(tx), Err(EngineError::Validation(_))));
        assert_eq!(store.general_pool(), Decimal::MAX);

        store.insert_campaign(campaign(1, 10));
        let mut tx = Transaction::new();
        tx.push(WriteOp::CreditCampaign { campaign_id: CampaignId(1), amount: Decimal::MAX });
        assert!(matches!(store.commit(tx), Err(EngineError::Validation(_))));
        assert_eq!(store.campaign(CampaignId(1)).unwrap().available_amount, Decimal::from(10));
    }

    #[test]
    fn committed_funds_total_is_none_on_overflow() {
        let mut store = PlatformStore::new();
        store.credit_pool(Decimal::MAX).unwrap();
        assert_eq!(store.total_committed_funds(), Some(Decimal::MAX));
        store.insert_campaign(campaign(1, 10));
        assert_eq!(store.total_committed_funds(), None);
    }
}
