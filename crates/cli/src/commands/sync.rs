//! Manual replay of the order and customer handlers.
//!
//! Replaying an order that already carries a lead id reports
//! `lead-already-exists` instead of creating a second lead.

use kommo_sync_core::{CustomerId, OrderId};
use kommo_sync_kommo::SyncOutcome;

use crate::commands::{with_runtime, CommandResult, Failure, EXIT_SYNC};

pub fn order(order_id: i64) -> CommandResult {
    with_runtime("sync-order", |runtime| async move {
        let outcome = runtime.sync.handle_new_order(OrderId(order_id)).await;
        Ok::<_, Failure>(report("sync-order", &format!("order {order_id}"), outcome))
    })
}

pub fn customer(customer_id: i64) -> CommandResult {
    with_runtime("sync-customer", |runtime| async move {
        let outcome = runtime.sync.handle_customer_update(CustomerId(customer_id)).await;
        Ok::<_, Failure>(report("sync-customer", &format!("customer {customer_id}"), outcome))
    })
}

fn report(command: &str, subject: &str, outcome: SyncOutcome) -> CommandResult {
    match outcome {
        SyncOutcome::Failed { error_class, message } => {
            CommandResult::failure(command, error_class, message, EXIT_SYNC)
        }
        SyncOutcome::Skipped { reason } => {
            let message = format!("{subject} skipped: {reason}");
            CommandResult::success_with(command, message, SyncOutcome::Skipped { reason })
        }
        synced => CommandResult::success_with(command, format!("{subject} synced"), synced),
    }
}
