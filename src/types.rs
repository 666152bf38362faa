//! Core types and IDs for the sponsorship matching engine.
//!
//! All identifiers are newtype wrappers over `u64`. Money is [`Decimal`]; times are
//! seconds as `u64`. [`WaitlistEntry`], [`Campaign`], [`Allocation`], [`Appointment`]
//! and [`Payout`] define the lifecycle from waiting patient to paid center.

use rust_decimal::Decimal;

/// Patient identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct PatientId(pub u64);

/// Donor identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct DonorId(pub u64);

/// Screening center identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct CenterId(pub u64);

/// Screening type (e.g. cervical, breast, prostate).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct ScreeningTypeId(pub u64);

/// Waitlist entry identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct WaitlistId(pub u64);

/// Campaign identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct CampaignId(pub u64);

/// Allocation identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct AllocationId(pub u64);

/// Notification identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct NotificationId(pub u64);

/// Appointment identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct AppointmentId(pub u64);

/// Payout identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct PayoutId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum WaitlistStatus {
    Pending,
    Matched,
    Withdrawn,
    /// The sponsored screening was completed. The patient may join again.
    Fulfilled,
}

/// A patient waiting for a sponsor for one screening type.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WaitlistEntry {
    pub waitlist_id: WaitlistId,
    pub patient_id: PatientId,
    pub screening_type_id: ScreeningTypeId,
    pub region: String,
    pub estimated_cost: Decimal,
    /// FCFS key. Kept when an expired allocation sends the entry back to pending.
    pub joined_at: u64,
    pub status: WaitlistStatus,
    #[serde(default)]
    pub allocation_id: Option<AllocationId>,
}

impl WaitlistEntry {
    /// Pending or matched: the patient still has an open request for this screening type.
    pub fn is_open(&self) -> bool {
        matches!(self.status, WaitlistStatus::Pending | WaitlistStatus::Matched)
    }
}

/// Campaign lifecycle. Only `Active` campaigns are eligible for matching.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CampaignStatus {
    Active,
    Paused,
    /// Terminal.
    Closed,
}

/// Donor-funded pool of money earmarked for screenings.
///
/// Empty `screening_type_ids` or `regions` means the campaign is unrestricted on that axis.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Campaign {
    pub campaign_id: CampaignId,
    pub donor_id: DonorId,
    pub title: String,
    pub screening_type_ids: Vec<ScreeningTypeId>,
    pub regions: Vec<String>,
    /// Total ever raised.
    pub funded_amount: Decimal,
    /// Not yet allocated.
    pub available_amount: Decimal,
    pub status: CampaignStatus,
    pub created_at: u64,
}

/// Where an allocation's money comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FundingSource {
    Campaign(CampaignId),
    GeneralPool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AllocationStatus {
    /// Matched but not yet claimed by booking an appointment.
    Pending,
    Claimed,
    Completed,
    Expired,
}

/// Claim linking a patient to sponsor funds for one screening.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Allocation {
    pub allocation_id: AllocationId,
    pub waitlist_id: WaitlistId,
    pub patient_id: PatientId,
    pub screening_type_id: ScreeningTypeId,
    pub source: FundingSource,
    pub amount: Decimal,
    pub status: AllocationStatus,
    pub created_at: u64,
    pub expires_at: u64,
}

impl Allocation {
    pub fn is_unclaimed(&self) -> bool {
        matches!(self.status, AllocationStatus::Pending)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum NotificationKind {
    MatchFound,
    AppointmentBooked,
    ScreeningCompleted,
    AllocationExpired,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Notification {
    pub notification_id: NotificationId,
    pub patient_id: PatientId,
    pub kind: NotificationKind,
    pub message: String,
    #[serde(default)]
    pub allocation_id: Option<AllocationId>,
    pub created_at: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AppointmentStatus {
    Booked,
    CheckedIn,
    Completed,
}

/// A sponsored screening booked at a center.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Appointment {
    pub appointment_id: AppointmentId,
    pub allocation_id: AllocationId,
    pub patient_id: PatientId,
    pub center_id: CenterId,
    pub screening_type_id: ScreeningTypeId,
    pub scheduled_at: u64,
    pub check_in_code: String,
    /// Amount the center earns on completion.
    pub amount: Decimal,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub checked_in_at: Option<u64>,
    #[serde(default)]
    pub completed_at: Option<u64>,
    #[serde(default)]
    pub result_summary: Option<String>,
    #[serde(default)]
    pub paid_out: bool,
}

/// Aggregated transfer of earned funds to a center.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Payout {
    pub payout_id: PayoutId,
    pub center_id: CenterId,
    pub amount: Decimal,
    pub appointment_ids: Vec<AppointmentId>,
    pub created_at: u64,
}

/// Request to join the waitlist.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct WaitlistRequest {
    pub patient_id: PatientId,
    pub screening_type_id: ScreeningTypeId,
    pub region: String,
    pub estimated_cost: Decimal,
}

/// Request to open a campaign.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct CampaignRequest {
    pub donor_id: DonorId,
    pub title: String,
    #[serde(default)]
    pub screening_type_ids: Vec<ScreeningTypeId>,
    #[serde(default)]
    pub regions: Vec<String>,
    pub initial_amount: Decimal,
}
