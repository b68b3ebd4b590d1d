use lf_core::types::{Lead, LeadSource};

const PHONE_BONUS: f64 = 1.2;
const INTEREST_STEP: f64 = 0.1;
const MAX_COUNTED_INTERESTS: usize = 3;

/// Typical first-year value of a converted lead from each source.
pub fn base_value(source: LeadSource) -> f64 {
    match source {
        LeadSource::Website => 2500.0,
        LeadSource::Referral => 5000.0,
        LeadSource::SocialMedia => 1500.0,
        LeadSource::PaidAd => 2000.0,
        LeadSource::Event => 3000.0,
        LeadSource::Recruiting => 3000.0,
        LeadSource::Other => 1000.0,
    }
}

/// Opening value for a deal created from `lead`, rounded to cents.
///
/// `base(source) * score/100 * phone_bonus * interest_bonus`; a reachable
/// phone number is worth 20% and each interest tag 10%, capped at three tags.
pub fn estimate_deal_value(lead: &Lead) -> f64 {
    let score = f64::from(lead.lead_score.min(100)) / 100.0;
    let phone = if lead.has_phone() { PHONE_BONUS } else { 1.0 };
    let tags = lead.interests.len().min(MAX_COUNTED_INTERESTS) as f64;
    let interest = 1.0 + INTEREST_STEP * tags;
    let raw = base_value(lead.source) * score * phone * interest;
    (raw * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn referral_with_phone_and_interests() {
        let lead = Lead::new("Ann", LeadSource::Referral, 80)
            .with_phone("555-0101")
            .with_interests(["life", "auto"]);
        // 5000 * 0.8 * 1.2 * 1.2
        assert_eq!(estimate_deal_value(&lead), 5760.0);
    }

    #[test]
    fn interests_are_capped() {
        let lead = Lead::new("Bo", LeadSource::Website, 50).with_interests(["a", "b", "c", "d", "e"]);
        // 2500 * 0.5 * 1.3
        assert_eq!(estimate_deal_value(&lead), 1625.0);
    }

    #[test]
    fn zero_score_is_worth_nothing() {
        let lead = Lead::new("Cy", LeadSource::Event, 0).with_phone("1");
        assert_eq!(estimate_deal_value(&lead), 0.0);
    }
}
