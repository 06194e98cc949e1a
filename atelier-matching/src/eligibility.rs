use atelier_core::models::normalize_tag;
use atelier_core::{DesignerProfile, DesignerStatus, Order};

/// Narrows a candidate pool to the designers who can take an order, best first.
///
/// Stages run in order and each only ever shrinks the set:
/// availability, capacity headroom, category (hard), style (soft), skill gate.
/// An empty result is a normal outcome.
pub struct EligibilityFilter<'a> {
    order: &'a Order,
}

impl<'a> EligibilityFilter<'a> {
    pub fn new(order: &'a Order) -> Self {
        Self { order }
    }

    pub fn apply(&self, candidates: Vec<DesignerProfile>) -> Vec<DesignerProfile> {
        let available: Vec<DesignerProfile> = candidates
            .into_iter()
            .filter(|d| d.status == DesignerStatus::Available)
            .filter(DesignerProfile::has_capacity)
            .filter(|d| self.matches_category(d))
            .collect();

        let complexity = self.order.complexity();
        let mut eligible: Vec<DesignerProfile> = self
            .refine_by_style(available)
            .into_iter()
            .filter(|d| complexity.admits(d.skill_level))
            .collect();

        eligible.sort_by(|a, b| {
            b.rating
                .total_cmp(&a.rating)
                .then_with(|| a.current_load.cmp(&b.current_load))
        });
        eligible
    }

    fn matches_category(&self, designer: &DesignerProfile) -> bool {
        match non_empty(self.order.category.as_deref()) {
            Some(category) => designer.has_specialty(category),
            // Older orders only carry a free-text template name
            None => match non_empty(self.order.template_name.as_deref()) {
                Some(name) => {
                    let name = normalize_tag(name);
                    designer
                        .specialties
                        .iter()
                        .map(|s| normalize_tag(s))
                        .any(|s| !s.is_empty() && name.contains(&s))
                }
                None => false,
            },
        }
    }

    /// Prefer designers who also list the order's style; keep everyone if nobody does
    fn refine_by_style(&self, candidates: Vec<DesignerProfile>) -> Vec<DesignerProfile> {
        let Some(style) = non_empty(self.order.style.as_deref()) else {
            return candidates;
        };
        if !candidates.iter().any(|d| d.has_specialty(style)) {
            return candidates;
        }
        candidates.into_iter().filter(|d| d.has_specialty(style)).collect()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
