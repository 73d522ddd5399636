//! Scraped campaign artifact.

use serde::{Deserialize, Serialize};

/// How a campaign's discount is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Percentage => "percentage",
            Self::Fixed => "fixed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "percentage" => Some(Self::Percentage),
            "fixed" => Some(Self::Fixed),
            _ => None,
        }
    }
}

/// A scraped promotional campaign.
///
/// Constructed by the target fetcher from a rendered page, or by the
/// orchestrator's aggregation step from completed child results. Item ids
/// are not deduplicated at construction; aggregation dedups the union.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignResult {
    /// Campaign identifier on the target site.
    pub id: String,
    /// Short promotional description (headline).
    pub description: String,
    /// Longer detail text, if present.
    pub details: String,
    /// Discount form parsed from the headline.
    pub discount_type: DiscountType,
    /// Discount magnitude; percentage points or fixed currency units.
    pub discount_value: f64,
    /// Campaign start, if a schedule was found on the page.
    pub start_date: Option<chrono::NaiveDate>,
    /// Campaign end, if a schedule was found on the page.
    pub end_date: Option<chrono::NaiveDate>,
    /// Identifiers of items participating in the campaign.
    pub item_ids: Vec<String>,
}

impl CampaignResult {
    pub fn new(
        id: String,
        description: String,
        details: String,
        discount_type: DiscountType,
        discount_value: f64,
    ) -> Self {
        Self {
            id,
            description,
            details,
            discount_type,
            discount_value: discount_value.max(0.0),
            start_date: None,
            end_date: None,
            item_ids: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discount_type_round_trips() {
        assert_eq!(DiscountType::from_str("percentage"), Some(DiscountType::Percentage));
        assert_eq!(DiscountType::from_str("fixed"), Some(DiscountType::Fixed));
        assert_eq!(DiscountType::from_str("bogus"), None);
        assert_eq!(DiscountType::Percentage.as_str(), "percentage");
    }

    #[test]
    fn negative_discount_clamped_to_zero() {
        let r = CampaignResult::new(
            "c1".into(),
            "10% off".into(),
            String::new(),
            DiscountType::Percentage,
            -5.0,
        );
        assert_eq!(r.discount_value, 0.0);
    }
}
