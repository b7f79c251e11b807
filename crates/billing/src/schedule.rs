//! Schedule reconciliation
//!
//! A customer may hold at most one schedule that still governs future
//! billing. The reconciler runs before every plan change and releases
//! whatever pending schedules exist, so the change that follows starts
//! from a clean slate.

use std::sync::Arc;

use crate::error::BillingResult;
use crate::gateway::ProviderGateway;

#[derive(Clone)]
pub struct ScheduleReconciler {
    gateway: Arc<dyn ProviderGateway>,
}

impl ScheduleReconciler {
    pub fn new(gateway: Arc<dyn ProviderGateway>) -> Self {
        Self { gateway }
    }

    /// Release every `active` or `not_started` schedule the customer
    /// has. Any gateway failure aborts the caller's change; a partially
    /// reconciled state is not safe to continue from.
    pub async fn reconcile(&self, customer_id: &str) -> BillingResult<()> {
        let schedules = self.gateway.list_schedules(customer_id).await?;

        for schedule in schedules {
            if schedule.status.is_pending() {
                tracing::info!(
                    customer_id,
                    schedule_id = %schedule.id,
                    status = ?schedule.status,
                    "Releasing pending subscription schedule"
                );
                self.gateway.release_schedule(&schedule.id).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BillingError;
    use crate::testing::MockGateway;
    use crate::types::{Schedule, ScheduleStatus};

    fn schedule(id: &str, status: ScheduleStatus) -> Schedule {
        Schedule {
            id: id.to_string(),
            customer_id: "cus_123".to_string(),
            status,
            phases: vec![],
        }
    }

    #[tokio::test]
    async fn releases_only_pending_schedules() {
        let mock = MockGateway::new();
        mock.add_schedule(schedule("sub_sched_active", ScheduleStatus::Active));
        mock.add_schedule(schedule("sub_sched_waiting", ScheduleStatus::NotStarted));
        mock.add_schedule(schedule("sub_sched_done", ScheduleStatus::Completed));
        mock.add_schedule(schedule("sub_sched_old", ScheduleStatus::Released));
        let gateway = Arc::new(mock);

        ScheduleReconciler::new(gateway.clone())
            .reconcile("cus_123")
            .await
            .unwrap();

        let released = gateway.released_schedules();
        assert_eq!(released, vec!["sub_sched_active", "sub_sched_waiting"]);
    }

    #[tokio::test]
    async fn no_schedules_is_a_no_op() {
        let gateway = Arc::new(MockGateway::new());
        ScheduleReconciler::new(gateway.clone())
            .reconcile("cus_123")
            .await
            .unwrap();
        assert!(gateway.released_schedules().is_empty());
    }

    #[tokio::test]
    async fn release_failure_aborts() {
        let mock = MockGateway::new();
        mock.add_schedule(schedule("sub_sched_active", ScheduleStatus::Active));
        mock.fail_next("release_schedule");

        let err = ScheduleReconciler::new(Arc::new(mock))
            .reconcile("cus_123")
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Provider { .. }));
    }
}
