//! Synthetic waitlist and campaign generator.
//!
//! Deterministic, configurable request streams for replay tests, demos, and benchmarks.
//! Same seed ⇒ same sequence of requests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

use crate::engine::MatchingEngine;
use crate::error::EngineError;
use crate::types::{CampaignRequest, DonorId, PatientId, ScreeningTypeId, WaitlistRequest};

/// Configuration for the synthetic generator.
/// All ranges are inclusive. Same config + seed produces the same stream.
#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    /// RNG seed. Same seed ⇒ same stream.
    pub seed: u64,
    /// Number of waitlist requests produced by [`Generator::all_requests`].
    pub num_entries: usize,
    /// Patient ids are drawn from 1..=num_patients. Duplicates per screening type are
    /// possible and rejected by the engine on enqueue.
    pub num_patients: u64,
    /// Screening type ids are drawn from 1..=num_screening_types.
    pub num_screening_types: u64,
    pub regions: Vec<String>,
    /// Estimated cost range, whole currency units.
    pub cost_min: u64,
    pub cost_max: u64,
    /// Probability that a generated campaign targets a screening type / a region.
    pub campaign_type_ratio: f64,
    pub campaign_region_ratio: f64,
    /// Campaign size range, whole currency units.
    pub campaign_amount_min: u64,
    pub campaign_amount_max: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            num_entries: 200,
            num_patients: 150,
            num_screening_types: 4,
            regions: vec!["Lagos".into(), "Kano".into(), "Abuja".into(), "Enugu".into()],
            cost_min: 20,
            cost_max: 150,
            campaign_type_ratio: 0.5,
            campaign_region_ratio: 0.3,
            campaign_amount_min: 100,
            campaign_amount_max: 2_000,
        }
    }
}

/// Deterministic request stream. Create with [`Generator::new`].
pub struct Generator {
    rng: StdRng,
    config: GeneratorConfig,
    next_timestamp: u64,
    next_donor: u64,
}

impl Generator {
    pub fn new(config: GeneratorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            rng,
            config,
            next_timestamp: 1,
            next_donor: 1,
        }
    }

    fn region(&mut self) -> String {
        if self.config.regions.is_empty() {
            return "Unknown".into();
        }
        let i = self.rng.gen_range(0..self.config.regions.len());
        self.config.regions[i].clone()
    }

    fn screening_type(&mut self) -> ScreeningTypeId {
        ScreeningTypeId(self.rng.gen_range(1..=self.config.num_screening_types.max(1)))
    }

    /// Next waitlist request and its join time. Join times strictly increase.
    pub fn next_request(&mut self) -> (WaitlistRequest, u64) {
        let patient_id = PatientId(self.rng.gen_range(1..=self.config.num_patients.max(1)));
        let screening_type_id = self.screening_type();
        let region = self.region();
        let cost_max = self.config.cost_max.max(self.config.cost_min.max(1));
        let estimated_cost = Decimal::from(self.rng.gen_range(self.config.cost_min.max(1)..=cost_max));
        let joined_at = self.next_timestamp;
        self.next_timestamp += 1;
        (
            WaitlistRequest {
                patient_id,
                screening_type_id,
                region,
                estimated_cost,
            },
            joined_at,
        )
    }

    pub fn take_requests(&mut self, n: usize) -> Vec<(WaitlistRequest, u64)> {
        (0..n).map(|_| self.next_request()).collect()
    }

    /// The full stream as defined by `config.num_entries`.
    pub fn all_requests(&mut self) -> Vec<(WaitlistRequest, u64)> {
        self.take_requests(self.config.num_entries)
    }

    pub fn next_campaign(&mut self) -> CampaignRequest {
        let donor_id = DonorId(self.next_donor);
        self.next_donor += 1;
        let screening_type_ids = if self.rng.gen::<f64>() < self.config.campaign_type_ratio {
            vec![self.screening_type()]
        } else {
            Vec::new()
        };
        let regions = if self.rng.gen::<f64>() < self.config.campaign_region_ratio {
            vec![self.region()]
        } else {
            Vec::new()
        };
        let max = self.config.campaign_amount_max.max(self.config.campaign_amount_min);
        let initial_amount = Decimal::from(self.rng.gen_range(self.config.campaign_amount_min..=max));
        CampaignRequest {
            donor_id,
            title: format!("gen-campaign-{}", donor_id.0),
            screening_type_ids,
            regions,
            initial_amount,
        }
    }

    pub fn campaigns(&mut self, n: usize) -> Vec<CampaignRequest> {
        (0..n).map(|_| self.next_campaign()).collect()
    }
}

/// Enqueues a request stream into the engine. Returns (accepted, rejected) counts.
///
/// Duplicate open requests are counted as rejected; any other error aborts the replay.
pub fn replay_into_engine<E>(
    engine: &mut E,
    requests: impl IntoIterator<Item = (WaitlistRequest, u64)>,
) -> Result<(usize, usize), EngineError>
where
    E: MatchingEngine,
{
    let mut accepted = 0usize;
    let mut rejected = 0usize;
    for (request, joined_at) in requests {
        match engine.enqueue(request, joined_at) {
            Ok(_) => accepted += 1,
            Err(EngineError::Conflict(_)) => rejected += 1,
            Err(e) => return Err(e),
        }
    }
    Ok((accepted, rejected))
}
