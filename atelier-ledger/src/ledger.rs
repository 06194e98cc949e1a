use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use atelier_core::notification::{dispatch_all, Notification, NotificationGateway, NotificationKind};
use atelier_core::repository::{CommissionPaymentStore, OrderStore, SettingsStore};
use atelier_core::{
    CommissionPayment, CommissionPaymentStatus, CommissionRate, CoreError, CoreResult, Order,
    OrderQuery, OrderStatus,
};

/// Commission position of one designer, in minor units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommissionSummary {
    pub accrued: i64,
    pub paid: i64,
    pub pending: i64,
    pub balance: i64,
}

/// Commission owed on one delivered order
#[derive(Debug, Clone, Serialize)]
pub struct CommissionLine {
    pub order_id: Uuid,
    pub price: i64,
    pub base: i64,
    pub rate: CommissionRate,
    pub commission: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommissionStatement {
    pub designer_id: Uuid,
    pub delivery_fee: i64,
    pub lines: Vec<CommissionLine>,
    pub payments: Vec<CommissionPayment>,
    pub summary: CommissionSummary,
}

/// Derives what each designer owes the platform from delivered orders and
/// the payments they have submitted. Nothing is cached: every figure is
/// recomputed from the stores on each call.
pub struct CommissionLedger {
    orders: Arc<dyn OrderStore>,
    payments: Arc<dyn CommissionPaymentStore>,
    settings: Arc<dyn SettingsStore>,
    notifier: Arc<dyn NotificationGateway>,
    default_delivery_fee: i64,
}

impl CommissionLedger {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        payments: Arc<dyn CommissionPaymentStore>,
        settings: Arc<dyn SettingsStore>,
        notifier: Arc<dyn NotificationGateway>,
        default_delivery_fee: i64,
    ) -> Self {
        Self { orders, payments, settings, notifier, default_delivery_fee }
    }

    /// Platform delivery fee, falling back to the configured default
    pub async fn delivery_fee(&self) -> CoreResult<i64> {
        Ok(self.settings.delivery_fee().await?.unwrap_or(self.default_delivery_fee))
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_delivery_fee(&self, fee: i64) -> CoreResult<()> {
        if fee < 0 {
            return Err(CoreError::ValidationError(format!("delivery fee must not be negative, got {}", fee)));
        }
        self.settings.set_delivery_fee(fee).await?;
        info!(fee, "Delivery fee updated");
        Ok(())
    }

    pub async fn summary(&self, designer_id: Uuid) -> CoreResult<CommissionSummary> {
        Ok(self.statement(designer_id).await?.summary)
    }

    #[tracing::instrument(skip(self))]
    pub async fn statement(&self, designer_id: Uuid) -> CoreResult<CommissionStatement> {
        let delivery_fee = self.delivery_fee().await?;
        let delivered: Vec<Order> = self
            .orders
            .find_orders(&OrderQuery::AssignedDesigner(designer_id))
            .await?
            .into_iter()
            .filter(|o| o.status == OrderStatus::Delivered)
            .collect();

        let lines: Vec<CommissionLine> = delivered
            .iter()
            .map(|order| {
                let rate = order.commission_rate();
                CommissionLine {
                    order_id: order.id,
                    price: order.price,
                    base: order.price.saturating_sub(delivery_fee).max(0),
                    rate,
                    commission: rate.apply(order.price, delivery_fee),
                }
            })
            .collect();
        let payments = self.payments.list_payments(designer_id).await?;

        let accrued = checked_total(lines.iter().map(|l| l.commission), "accrued commission")?;
        let paid = total(&payments, CommissionPaymentStatus::Approved)?;
        let pending = total(&payments, CommissionPaymentStatus::Pending)?;
        let summary = CommissionSummary {
            accrued,
            paid,
            pending,
            balance: accrued.saturating_sub(paid).saturating_sub(pending).max(0),
        };
        debug!(?summary, orders = lines.len(), "Commission statement computed");

        Ok(CommissionStatement { designer_id, delivery_fee, lines, payments, summary })
    }

    /// Record a designer's payment as pending review
    #[tracing::instrument(skip(self, proof_url))]
    pub async fn submit_commission_payment(
        &self,
        designer_id: Uuid,
        amount: i64,
        proof_url: &str,
    ) -> CoreResult<CommissionPayment> {
        if amount <= 0 {
            return Err(CoreError::ValidationError(format!("payment amount must be positive, got {}", amount)));
        }
        let proof_url = proof_url.trim();
        if proof_url.is_empty() {
            return Err(CoreError::ValidationError("payment proof is required".into()));
        }
        let submitted = self.payments.list_payments(designer_id).await?;
        checked_total(
            submitted
                .iter()
                .filter(|p| p.status != CommissionPaymentStatus::Declined)
                .map(|p| p.amount)
                .chain(std::iter::once(amount)),
            "submitted payments",
        )?;

        let payment = CommissionPayment::new(designer_id, amount, proof_url.to_string());
        self.payments.insert_payment(&payment).await?;
        info!(payment_id = %payment.id, "Commission payment submitted");
        Ok(payment)
    }

    #[tracing::instrument(skip(self))]
    pub async fn approve_commission_payment(&self, payment_id: Uuid) -> CoreResult<CommissionPayment> {
        self.review(payment_id, CommissionPaymentStatus::Approved).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn decline_commission_payment(&self, payment_id: Uuid) -> CoreResult<CommissionPayment> {
        self.review(payment_id, CommissionPaymentStatus::Declined).await
    }

    async fn review(&self, payment_id: Uuid, to: CommissionPaymentStatus) -> CoreResult<CommissionPayment> {
        let reviewed = self
            .payments
            .transition_payment(payment_id, CommissionPaymentStatus::Pending, to, Utc::now())
            .await?;
        if let Some(payment) = reviewed {
            info!(status = ?payment.status, amount = payment.amount, "Commission payment reviewed");
            let notice = Notification::new(
                payment.designer_id,
                NotificationKind::CommissionPaymentReviewed,
                format!("Your commission payment of {} was {:?}", payment.amount, payment.status),
            );
            dispatch_all(self.notifier.as_ref(), vec![notice]).await;
            return Ok(payment);
        }

        match self.payments.get_payment(payment_id).await? {
            None => Err(CoreError::NotFound(format!("commission payment {}", payment_id))),
            Some(payment) => Err(CoreError::InvalidState(format!(
                "commission payment {} is already {:?}",
                payment_id, payment.status
            ))),
        }
    }
}

fn total(payments: &[CommissionPayment], status: CommissionPaymentStatus) -> CoreResult<i64> {
    checked_total(
        payments.iter().filter(|p| p.status == status).map(|p| p.amount),
        "payment total",
    )
}

fn checked_total(amounts: impl IntoIterator<Item = i64>, what: &str) -> CoreResult<i64> {
    amounts
        .into_iter()
        .try_fold(0i64, |acc, amount| acc.checked_add(amount))
        .ok_or_else(|| CoreError::ValidationError(format!("{} exceeds the representable amount", what)))
}
