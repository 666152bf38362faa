//! Campaign eligibility and ranking for one waitlist entry.
//!
//! Ranking order: specificity (most targeted first), then available amount (largest
//! first), then age (oldest first), then campaign id. When no campaign qualifies, the
//! general donor pool is the fallback.

use crate::store::PlatformStore;
use crate::types::{Campaign, CampaignStatus, FundingSource, WaitlistEntry};
use std::cmp::Ordering;

/// Active, has enough money, and covers the entry's screening type and region.
pub fn is_eligible(campaign: &Campaign, entry: &WaitlistEntry) -> bool {
    campaign.status == CampaignStatus::Active
        && campaign.available_amount >= entry.estimated_cost
        && (campaign.screening_type_ids.is_empty()
            || campaign.screening_type_ids.contains(&entry.screening_type_id))
        && (campaign.regions.is_empty()
            || campaign
                .regions
                .iter()
                .any(|r| r.trim().eq_ignore_ascii_case(entry.region.trim())))
}

/// 2 for a screening-type restriction, plus 1 for a region restriction.
pub fn specificity(campaign: &Campaign) -> u8 {
    let mut score = 0;
    if !campaign.screening_type_ids.is_empty() {
        score += 2;
    }
    if !campaign.regions.is_empty() {
        score += 1;
    }
    score
}

fn compare(a: &Campaign, b: &Campaign) -> Ordering {
    specificity(b)
        .cmp(&specificity(a))
        .then_with(|| b.available_amount.cmp(&a.available_amount))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.campaign_id.cmp(&b.campaign_id))
}

/// Eligible campaigns for `entry`, best first.
pub fn rank_campaigns<'a>(
    campaigns: impl IntoIterator<Item = &'a Campaign>,
    entry: &WaitlistEntry,
) -> Vec<&'a Campaign> {
    let mut eligible: Vec<&Campaign> = campaigns
        .into_iter()
        .filter(|c| is_eligible(c, entry))
        .collect();
    eligible.sort_by(|a, b| compare(a, b));
    eligible
}

/// Best campaign, else the general pool if it covers the cost, else `None`.
pub fn select_source(store: &PlatformStore, entry: &WaitlistEntry) -> Option<FundingSource> {
    if let Some(best) = rank_campaigns(store.campaigns(), entry).first() {
        return Some(FundingSource::Campaign(best.campaign_id));
    }
    if store.general_pool() >= entry.estimated_cost {
        return Some(FundingSource::GeneralPool);
    }
    None
}
