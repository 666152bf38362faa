//! # Screening Match Engine
//!
//! Deterministic waitlist-to-campaign matching for subsidized cancer screenings:
//! FCFS waitlists per screening type, campaign ranking with a general donor pool as
//! fallback, transactional allocation writes, and the follow-on lifecycle (claim with
//! check-in code, check-in, completion, expiry, center payout).
//!
//! ## Entry point
//!
//! Use [`Engine`] as the single entry point: create with [`Engine::new`], then
//! [`Engine::enqueue`], [`Engine::create_campaign`], and [`Engine::run_matching`].
//!
//! ## Example
//!
//! ```rust
//! use screening_match_engine::{
//!     CampaignRequest, DonorId, Engine, EngineConfig, PatientId, ScreeningTypeId, WaitlistRequest,
//! };
//! use rust_decimal::Decimal;
//!
//! let mut engine = Engine::new(EngineConfig::seeded(1));
//! engine
//!     .enqueue(
//!         WaitlistRequest {
//!             patient_id: PatientId(1),
//!             screening_type_id: ScreeningTypeId(1),
//!             region: "Lagos".into(),
//!             estimated_cost: Decimal::from(50),
//!         },
//!         1,
//!     )
//!     .unwrap();
//! engine
//!     .create_campaign(
//!         CampaignRequest {
//!             donor_id: DonorId(1),
//!             title: "Cervical screening drive".into(),
//!             screening_type_ids: vec![ScreeningTypeId(1)],
//!             regions: vec![],
//!             initial_amount: Decimal::from(500),
//!         },
//!         1,
//!     )
//!     .unwrap();
//! let summary = engine.run_matching(2);
//! assert_eq!(summary.matched_count(), 1);
//! ```
//!
//! ## Lower-level API
//!
//! You can also use [`PlatformStore`] and [`run_matching`] directly if you manage the
//! store yourself.

pub mod api;
pub mod audit;
pub mod auth;
pub mod checkin;
pub mod config;
pub mod engine;
pub mod error;
pub mod matching;
pub mod persistence;
pub mod ranking;
pub mod report;
pub mod store;
pub mod types;
pub mod waitlist_gen;

pub use auth::{AuthConfig, AuthUser, Role};
pub use config::EngineConfig;
pub use engine::{Engine, MatchingEngine};
pub use error::{EngineError, PersistenceError};
pub use matching::run_matching;
pub use report::{MatchOutcome, MatchResult, MatchRunSummary, ScreeningTypeSummary, SkipReason};
pub use store::{EngineSnapshot, PlatformStore, Transaction, WriteOp};
pub use types::{
    Allocation, AllocationId, AllocationStatus, Appointment, AppointmentId, AppointmentStatus,
    Campaign, CampaignId, CampaignRequest, CampaignStatus, CenterId, DonorId, FundingSource,
    Notification, NotificationId, NotificationKind, PatientId, Payout, PayoutId, ScreeningTypeId,
    WaitlistEntry, WaitlistId, WaitlistRequest, WaitlistStatus,
};
pub use waitlist_gen::{replay_into_engine, Generator, GeneratorConfig};
