use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use crate::commission::CommissionRate;

/// Where an order sits in the designer assignment flow
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Unassigned,
    Shortlisted,
    Assigned,
    Completed,
}

/// Order lifecycle, driven mostly outside the matching core
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Reviewing,
    InProduction,
    Shipped,
    Delivered,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Refunded,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    #[default]
    Simple,
    Moderate,
    Detailed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SkillLevel {
    Basic,
    Advanced,
    Premium,
}

impl Complexity {
    /// Skill gate: simple admits everyone, moderate drops basic, detailed is premium-only
    pub fn admits(&self, skill: SkillLevel) -> bool {
        match self {
            Complexity::Simple => true,
            Complexity::Moderate => skill != SkillLevel::Basic,
            Complexity::Detailed => skill == SkillLevel::Premium,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DesignerStatus {
    Available,
    Busy,
    Offline,
}

/// Denormalized view of the active dispute, stored on the order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderDisputeStatus {
    Opened,
    AwaitingAdmin,
    Resolved,
    Closed,
}

/// A custom apparel order as seen by the matching, ledger and dispute services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub category: Option<String>,
    pub style: Option<String>,
    pub complexity: Option<Complexity>,
    pub urgency: Option<String>,
    /// Curated design reference; absent or `custom*` for bespoke orders
    pub template_id: Option<String>,
    /// Free-text template name carried by older orders without a category
    pub template_name: Option<String>,
    pub assignment_status: AssignmentStatus,
    pub shortlisted_designer_ids: Vec<Uuid>,
    pub assignment_expires_at: Option<DateTime<Utc>>,
    pub assigned_designer_id: Option<Uuid>,
    pub status: OrderStatus,
    pub price: i64,
    pub total: i64,
    pub commission_rate: Option<CommissionRate>,
    pub payment_status: PaymentStatus,
    pub dispute_status: Option<OrderDisputeStatus>,
    pub dispute_resolution: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(customer_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            customer_id,
            category: None,
            style: None,
            complexity: None,
            urgency: None,
            template_id: None,
            template_name: None,
            assignment_status: AssignmentStatus::Unassigned,
            shortlisted_designer_ids: Vec::new(),
            assignment_expires_at: None,
            assigned_designer_id: None,
            status: OrderStatus::Pending,
            price: 0,
            total: 0,
            commission_rate: None,
            payment_status: PaymentStatus::Unpaid,
            dispute_status: None,
            dispute_resolution: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the price and lock the commission rate for the order's origin.
    /// Once locked, a later template change does not move the rate.
    pub fn set_price(&mut self, price: i64) {
        self.price = price;
        if self.commission_rate.is_none() {
            self.commission_rate = Some(CommissionRate::for_template(self.template_id.as_deref()));
        }
        self.updated_at = Utc::now();
    }

    pub fn commission_rate(&self) -> CommissionRate {
        self.commission_rate
            .unwrap_or_else(|| CommissionRate::for_template(self.template_id.as_deref()))
    }

    pub fn is_shortlisted_for(&self, designer_id: Uuid) -> bool {
        self.assignment_status == AssignmentStatus::Shortlisted
            && self.shortlisted_designer_ids.contains(&designer_id)
    }

    pub fn complexity(&self) -> Complexity {
        self.complexity.unwrap_or_default()
    }
}

/// Shallow merge applied by `OrderStore::update_order`. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub assignment_status: Option<AssignmentStatus>,
    pub shortlisted_designer_ids: Option<Vec<Uuid>>,
    pub assignment_expires_at: Option<Option<DateTime<Utc>>>,
    pub assigned_designer_id: Option<Option<Uuid>>,
    pub payment_status: Option<PaymentStatus>,
    pub dispute_status: Option<Option<OrderDisputeStatus>>,
    pub dispute_resolution: Option<Option<String>>,
}

impl OrderPatch {
    pub fn apply(&self, order: &mut Order) {
        if let Some(status) = self.status {
            order.status = status;
        }
        if let Some(status) = self.assignment_status {
            order.assignment_status = status;
        }
        if let Some(ids) = &self.shortlisted_designer_ids {
            order.shortlisted_designer_ids = ids.clone();
        }
        if let Some(expires_at) = self.assignment_expires_at {
            order.assignment_expires_at = expires_at;
        }
        if let Some(designer) = self.assigned_designer_id {
            order.assigned_designer_id = designer;
        }
        if let Some(status) = self.payment_status {
            order.payment_status = status;
        }
        if let Some(status) = self.dispute_status {
            order.dispute_status = status;
        }
        if let Some(resolution) = &self.dispute_resolution {
            order.dispute_resolution = resolution.clone();
        }
        order.updated_at = Utc::now();
    }
}

/// Field lookups supported by `OrderStore::find_orders`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderQuery {
    Customer(Uuid),
    AssignedDesigner(Uuid),
    Status(OrderStatus),
    AssignmentStatus(AssignmentStatus),
}

impl OrderQuery {
    pub fn matches(&self, order: &Order) -> bool {
        match self {
            OrderQuery::Customer(id) => order.customer_id == *id,
            OrderQuery::AssignedDesigner(id) => order.assigned_designer_id == Some(*id),
            OrderQuery::Status(status) => order.status == *status,
            OrderQuery::AssignmentStatus(status) => order.assignment_status == *status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignerProfile {
    pub user_id: Uuid,
    pub specialties: Vec<String>,
    pub skill_level: SkillLevel,
    pub max_capacity: i32,
    /// Never exceeds `max_capacity`; changed only by guarded assignment commits
    pub current_load: i32,
    pub rating: f64,
    pub status: DesignerStatus,
    pub updated_at: DateTime<Utc>,
}

impl DesignerProfile {
    pub fn new(user_id: Uuid, specialties: Vec<String>, skill_level: SkillLevel, max_capacity: i32) -> Self {
        Self {
            user_id,
            specialties,
            skill_level,
            max_capacity,
            current_load: 0,
            rating: 0.0,
            status: DesignerStatus::Available,
            updated_at: Utc::now(),
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.current_load < self.max_capacity
    }

    pub fn has_specialty(&self, tag: &str) -> bool {
        let tag = normalize_tag(tag);
        self.specialties.iter().any(|s| normalize_tag(s) == tag)
    }
}

/// Profile fields an admin or the designer may change. Load is not among them.
#[derive(Debug, Clone, Default)]
pub struct DesignerPatch {
    pub specialties: Option<Vec<String>>,
    pub skill_level: Option<SkillLevel>,
    pub max_capacity: Option<i32>,
    pub rating: Option<f64>,
    pub status: Option<DesignerStatus>,
}

impl DesignerPatch {
    pub fn apply(&self, profile: &mut DesignerProfile) {
        if let Some(specialties) = &self.specialties {
            profile.specialties = specialties.clone();
        }
        if let Some(skill) = self.skill_level {
            profile.skill_level = skill;
        }
        if let Some(max) = self.max_capacity {
            profile.max_capacity = max;
        }
        if let Some(rating) = self.rating {
            profile.rating = rating;
        }
        if let Some(status) = self.status {
            profile.status = status;
        }
        profile.updated_at = Utc::now();
    }
}

pub fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_locks_commission_rate() {
        let mut order = Order::new(Uuid::new_v4());
        order.template_id = Some("curated-1".to_string());
        order.set_price(105000);
        assert_eq!(order.commission_rate(), CommissionRate::Curated);

        // Re-pointing the template after pricing keeps the locked rate
        order.template_id = None;
        order.set_price(110000);
        assert_eq!(order.commission_rate(), CommissionRate::Curated);
    }

    #[test]
    fn test_skill_gate() {
        assert!(Complexity::Simple.admits(SkillLevel::Basic));
        assert!(!Complexity::Moderate.admits(SkillLevel::Basic));
        assert!(Complexity::Moderate.admits(SkillLevel::Advanced));
        assert!(!Complexity::Detailed.admits(SkillLevel::Advanced));
        assert!(Complexity::Detailed.admits(SkillLevel::Premium));
    }

    #[test]
    fn test_patch_clears_expiry() {
        let mut order = Order::new(Uuid::new_v4());
        order.assignment_expires_at = Some(Utc::now());
        let patch = OrderPatch {
            assignment_expires_at: Some(None),
            ..Default::default()
        };
        patch.apply(&mut order);
        assert!(order.assignment_expires_at.is_none());
        assert_eq!(order.assignment_status, AssignmentStatus::Unassigned);
    }

    #[test]
    fn test_specialty_match_ignores_case() {
        let designer = DesignerProfile::new(Uuid::new_v4(), vec!["Dress".into()], SkillLevel::Basic, 2);
        assert!(designer.has_specialty(" dress"));
        assert!(!designer.has_specialty("suit"));
    }
}
