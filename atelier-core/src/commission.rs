use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

/// Platform share of an order, fixed by order origin
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommissionRate {
    /// Order built from a curated design
    Curated,
    /// Bespoke order
    Custom,
}

impl CommissionRate {
    pub fn for_template(template_id: Option<&str>) -> Self {
        match template_id.map(str::trim) {
            Some(id) if !id.is_empty() && !id.to_lowercase().starts_with("custom") => {
                CommissionRate::Curated
            }
            _ => CommissionRate::Custom,
        }
    }

    pub fn basis_points(&self) -> i64 {
        match self {
            CommissionRate::Curated => 2000,
            CommissionRate::Custom => 1500,
        }
    }

    /// `max(0, price - delivery_fee) * rate`, truncated to whole minor units
    pub fn apply(&self, price: i64, delivery_fee: i64) -> i64 {
        let base = price.saturating_sub(delivery_fee).max(0);
        // Never exceeds `base`, so narrowing back is lossless
        (i128::from(base) * i128::from(self.basis_points()) / 10_000) as i64
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommissionPaymentStatus {
    Pending,
    Approved,
    Declined,
}

/// A designer's remittance of commission to the platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionPayment {
    pub id: Uuid,
    pub designer_id: Uuid,
    pub amount: i64,
    pub status: CommissionPaymentStatus,
    pub proof_url: String,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl CommissionPayment {
    pub fn new(designer_id: Uuid, amount: i64, proof_url: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            designer_id,
            amount,
            status: CommissionPaymentStatus::Pending,
            proof_url,
            submitted_at: Utc::now(),
            reviewed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curated_and_custom_rates() {
        let curated = CommissionRate::for_template(Some("curated-1"));
        assert_eq!(curated, CommissionRate::Curated);
        assert_eq!(curated.apply(105000, 5000), 20000);

        for template in [None, Some(""), Some("custom-template"), Some("custom")] {
            let rate = CommissionRate::for_template(template);
            assert_eq!(rate, CommissionRate::Custom);
            assert_eq!(rate.apply(105000, 5000), 15000);
        }
    }

    #[test]
    fn test_fee_above_price_yields_zero() {
        assert_eq!(CommissionRate::Curated.apply(3000, 5000), 0);
    }

    #[test]
    fn test_large_prices_do_not_overflow() {
        assert_eq!(CommissionRate::Curated.apply(i64::MAX, 0), i64::MAX / 5);
        assert_eq!(CommissionRate::Custom.apply(i64::MAX / 1000, 0), (i64::MAX / 1000) * 3 / 20);
        assert_eq!(CommissionRate::Curated.apply(i64::MIN, 5000), 0);
    }
}
