use super::*;
use std::sync::atomic::{AtomicBool, Ordering};
use futures_util::future::join_all;

use crate::domain::order::{ErrorKind, OrderEvent, Transition};
use crate::repository::InMemoryOrderRepository;

// ============================================================================
// Helpers
// ============================================================================

fn engine_with(config: EngineConfig) -> OrderLifecycleEngine {
    OrderLifecycleEngine::new(Arc::new(InMemoryOrderRepository::new()), config).unwrap()
}

fn engine() -> OrderLifecycleEngine {
    engine_with(EngineConfig::default())
}

fn money(text: &str) -> Money {
    text.parse().unwrap()
}

fn widget(quantity: u32) -> LineItem {
    LineItem::new("PROD-001", "Widget", quantity, money("9.99"))
}

async fn john_doe(engine: &OrderLifecycleEngine) -> Order {
    engine
        .create_order(CreateOrder::new("CUST-001", "John Doe"))
        .await
        .unwrap()
}

/// Drive a fresh order with one widget into `status`
async fn order_in(engine: &OrderLifecycleEngine, status: OrderStatus) -> OrderId {
    let id = john_doe(engine).await.id;
    engine.add_item(id, widget(2)).await.unwrap();

    let steps: &[OrderCommand] = match status {
        OrderStatus::Created => &[],
        OrderStatus::Confirmed => &[OrderCommand::Confirm],
        OrderStatus::Processed => &[OrderCommand::Confirm, OrderCommand::Process],
        OrderStatus::Shipped => &[
            OrderCommand::Confirm,
            OrderCommand::Process,
            OrderCommand::Ship { tracking_number: "TRK-1".into() },
        ],
        OrderStatus::Delivered => &[
            OrderCommand::Confirm,
            OrderCommand::Process,
            OrderCommand::Ship { tracking_number: "TRK-1".into() },
            OrderCommand::Deliver,
        ],
        OrderStatus::Cancelled => &[OrderCommand::Cancel { reason: "changed mind".into() }],
    };
    for command in steps {
        engine.execute(id, command.clone(), None).await.unwrap();
    }

    assert_eq!(engine.get_order(id).await.unwrap().status, status);
    id
}

fn command_for(transition: Transition) -> OrderCommand {
    match transition {
        Transition::Confirm => OrderCommand::Confirm,
        Transition::Process => OrderCommand::Process,
        Transition::Ship => OrderCommand::Ship { tracking_number: "TRK-9".into() },
        Transition::Cancel => OrderCommand::Cancel { reason: "no longer needed".into() },
        Transition::Deliver => OrderCommand::Deliver,
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_create_order() {
    let engine = engine();
    let order = john_doe(&engine).await;

    assert_eq!(order.status, OrderStatus::Created);
    assert!(order.items.is_empty());
    assert_eq!(order.total_amount.to_string(), "0.00");
    assert_eq!(engine.get_order(order.id).await.unwrap(), order);
}

#[tokio::test]
async fn test_add_widget_and_confirm() {
    let engine = engine();
    let id = john_doe(&engine).await.id;

    let order = engine.add_item(id, widget(2)).await.unwrap();
    assert_eq!(order.total_amount, money("19.98"));

    let order = engine.confirm(id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Confirmed);
    assert_eq!(order.total_amount, money("19.98"));
}

#[tokio::test]
async fn test_confirm_empty_order() {
    let engine = engine();
    let id = john_doe(&engine).await.id;

    assert_eq!(engine.confirm(id).await, Err(OrderError::EmptyOrder));
    assert_eq!(engine.get_order(id).await.unwrap().status, OrderStatus::Created);
}

#[tokio::test]
async fn test_ship_with_blank_tracking_number() {
    let engine = engine();
    let id = order_in(&engine, OrderStatus::Processed).await;

    let result = engine.ship(id, "   ").await;
    assert!(matches!(result, Err(OrderError::InvalidInput(_))));
    assert_eq!(engine.get_order(id).await.unwrap().status, OrderStatus::Processed);
}

#[tokio::test]
async fn test_cancel_shipped_order() {
    let engine = engine();
    let id = order_in(&engine, OrderStatus::Shipped).await;

    let result = engine.cancel(id, "Customer changed mind").await;
    assert_eq!(result, Err(OrderError::invalid_state("cancel", OrderStatus::Shipped)));
    assert_eq!(engine.get_order(id).await.unwrap().status, OrderStatus::Shipped);
}

#[tokio::test]
async fn test_duplicate_product() {
    let engine = engine();
    let id = john_doe(&engine).await.id;
    engine.add_item(id, widget(2)).await.unwrap();

    let result = engine.add_item(id, widget(1)).await;
    assert_eq!(result, Err(OrderError::DuplicateItem("PROD-001".to_string())));

    let order = engine.get_order(id).await.unwrap();
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.total_amount, money("19.98"));
}

// ============================================================================
// Lifecycle properties
// ============================================================================

#[tokio::test]
async fn test_full_lifecycle_to_delivered() {
    let engine = engine();
    let id = order_in(&engine, OrderStatus::Delivered).await;

    let order = engine.get_order(id).await.unwrap();
    assert_eq!(order.tracking_number.as_deref(), Some("TRK-1"));
    assert!(order.check_invariants().is_ok());
    assert_eq!(order.version, 6);
}

#[tokio::test]
async fn test_illegal_transitions_leave_order_unchanged() {
    let engine = engine();

    for status in OrderStatus::ALL {
        for transition in Transition::ALL {
            let id = order_in(&engine, status).await;
            let before = engine.get_order(id).await.unwrap();
            let result = engine.execute(id, command_for(transition), None).await;

            match transition.target(status) {
                Some(target) => assert_eq!(result.unwrap().status, target),
                None => {
                    assert_eq!(result, Err(OrderError::invalid_state(transition.as_str(), status)));
                    assert_eq!(engine.get_order(id).await.unwrap(), before);
                }
            }
        }
    }
}

#[tokio::test]
async fn test_confirm_twice() {
    let engine = engine();
    let id = order_in(&engine, OrderStatus::Created).await;

    assert!(engine.confirm(id).await.is_ok());
    let second = engine.confirm(id).await;
    assert!(matches!(second, Err(OrderError::InvalidState { .. })));

    // Same failure on repeat against the unchanged order
    assert_eq!(engine.confirm(id).await, second);
}

#[tokio::test]
async fn test_items_locked_once_confirmed() {
    let engine = engine();

    for status in [
        OrderStatus::Confirmed,
        OrderStatus::Processed,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ] {
        let id = order_in(&engine, status).await;
        let extra = LineItem::new("PROD-002", "Gadget", 1, money("1.00"));

        assert_eq!(engine.add_item(id, extra).await.unwrap_err().kind(), ErrorKind::InvalidState);
        assert_eq!(
            engine.remove_item(id, "PROD-001").await.unwrap_err().kind(),
            ErrorKind::InvalidState
        );
    }
}

#[tokio::test]
async fn test_remove_item_updates_total() {
    let engine = engine();
    let id = order_in(&engine, OrderStatus::Created).await;
    engine
        .add_item(id, LineItem::new("PROD-002", "Gadget", 3, money("0.10")))
        .await
        .unwrap();

    let order = engine.remove_item(id, "PROD-001").await.unwrap();
    assert_eq!(order.total_amount, money("0.30"));

    let missing = engine.remove_item(id, "PROD-404").await;
    assert_eq!(missing.unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_unknown_order_is_not_found() {
    let engine = engine();
    let unknown = OrderId::new();

    assert_eq!(engine.get_order(unknown).await, Err(OrderError::OrderNotFound(unknown)));
    assert_eq!(engine.confirm(unknown).await, Err(OrderError::OrderNotFound(unknown)));
    assert_eq!(engine.add_item(unknown, widget(1)).await, Err(OrderError::OrderNotFound(unknown)));
    assert_eq!(engine.order_history(unknown).unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(engine.replay_order(unknown).unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_create_order_validation() {
    let engine = engine();

    let result = engine.create_order(CreateOrder::new("  ", "John Doe")).await;
    assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidInput);
    assert!(engine.list_orders(None).await.unwrap().is_empty());

    let order = engine
        .create_order(
            CreateOrder::new(" CUST-002 ", "Jane Roe")
                .with_email("")
                .with_shipping_address("1 Infinite Loop"),
        )
        .await
        .unwrap();
    assert_eq!(order.customer_id, "CUST-002");
    assert_eq!(order.customer_email, None);
    assert_eq!(order.shipping_address.as_deref(), Some("1 Infinite Loop"));
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_are_serialized() {
    let engine = Arc::new(engine());
    let id = john_doe(&engine).await.id;

    let tasks: Vec<_> = (0..50)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                let item = LineItem::new(format!("PROD-{i:03}"), "Part", 1, money("0.10"));
                engine.add_item(id, item).await
            })
        })
        .collect();

    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    let order = engine.get_order(id).await.unwrap();
    assert_eq!(order.items.len(), 50);
    assert_eq!(order.total_amount, money("5.00"));
    assert_eq!(order.version, 51);
    assert_eq!(engine.order_history(id).unwrap().len(), 51);
    assert!(engine.locks.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_see_whole_snapshots_during_writes() {
    let engine = Arc::new(engine());
    let id = john_doe(&engine).await.id;
    let writing = Arc::new(AtomicBool::new(true));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            let writing = writing.clone();
            tokio::spawn(async move {
                let mut last_total = Money::ZERO;
                let mut snapshots = 0u32;
                while writing.load(Ordering::Acquire) || snapshots == 0 {
                    let order = engine.get_order(id).await.unwrap();
                    assert!(order.check_invariants().is_ok(), "{order:?}");
                    assert!(order.total_amount >= last_total);
                    assert_eq!(order.items.len() as u64 + 1, order.version);
                    last_total = order.total_amount;

                    for listed in engine.list_orders(None).await.unwrap() {
                        assert!(listed.check_invariants().is_ok(), "{listed:?}");
                    }
                    snapshots += 1;
                    tokio::task::yield_now().await;
                }
                snapshots
            })
        })
        .collect();

    let writers: Vec<_> = (0..50)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                let item = LineItem::new(format!("PROD-{i:03}"), "Part", 1, money("0.10"));
                engine.add_item(id, item).await
            })
        })
        .collect();

    for result in join_all(writers).await {
        result.unwrap().unwrap();
    }
    writing.store(false, Ordering::Release);

    for snapshots in join_all(readers).await {
        assert!(snapshots.unwrap() > 0);
    }
    assert_eq!(engine.get_order(id).await.unwrap().total_amount, money("5.00"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_abandoned_commands_leave_no_lock_slots() {
    let engine = Arc::new(engine());
    let id = order_in(&engine, OrderStatus::Created).await;

    let held = engine.locks.acquire(id, None).await.unwrap();
    let waiters: Vec<_> = (0..5)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.execute(id, OrderCommand::Confirm, None).await })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(20)).await;

    for waiter in &waiters {
        waiter.abort();
    }
    for waiter in waiters {
        let _ = waiter.await;
    }
    drop(held);

    assert!(engine.locks.is_empty());
    assert_eq!(engine.get_order(id).await.unwrap().status, OrderStatus::Created);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_confirms_have_one_winner() {
    let engine = Arc::new(engine());
    let id = order_in(&engine, OrderStatus::Created).await;

    let results = join_all((0..10).map(|_| {
        let engine = engine.clone();
        async move { engine.confirm(id).await }
    }))
    .await;

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| e.kind() == ErrorKind::InvalidState));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_orders_run_in_parallel() {
    let engine = Arc::new(engine());
    let first = order_in(&engine, OrderStatus::Created).await;
    let second = order_in(&engine, OrderStatus::Created).await;

    // Holding one order's lock must not block the other
    let _held = engine.locks.acquire(first, None).await.unwrap();
    let confirmed = engine
        .execute(second, OrderCommand::Confirm, Some(Duration::from_millis(100)))
        .await
        .unwrap();
    assert_eq!(confirmed.status, OrderStatus::Confirmed);
}

#[tokio::test]
async fn test_busy_when_lock_is_held() {
    let engine = engine_with(EngineConfig::strict());
    let id = order_in(&engine, OrderStatus::Created).await;

    let held = engine.locks.acquire(id, None).await.unwrap();
    let result = engine
        .execute(id, OrderCommand::Confirm, Some(Duration::from_millis(20)))
        .await;
    assert!(matches!(result, Err(OrderError::Busy { .. })));
    assert_eq!(engine.metrics().lock_timeouts.get(), 1);

    // Busy had no effect
    drop(held);
    assert_eq!(engine.get_order(id).await.unwrap().status, OrderStatus::Created);
    assert!(engine.confirm(id).await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_queued_command_records_its_wait() {
    let engine = Arc::new(engine());
    let id = order_in(&engine, OrderStatus::Created).await;
    let before = engine.metrics().lock_wait.get_sample_sum();

    let held = engine.locks.acquire(id, None).await.unwrap();
    let queued = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.confirm(id).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(held);

    assert_eq!(queued.await.unwrap().unwrap().status, OrderStatus::Confirmed);
    assert!(engine.metrics().lock_wait.get_sample_sum() - before >= 0.05);
    assert!(engine.locks.is_empty());
}

#[tokio::test]
async fn test_dropped_command_has_no_effect() {
    let engine = engine();
    let id = order_in(&engine, OrderStatus::Created).await;

    let held = engine.locks.acquire(id, None).await.unwrap();
    {
        // Waits on the lock, then is abandoned before running
        let pending = engine.execute(id, OrderCommand::Confirm, None);
        let outcome = tokio::time::timeout(Duration::from_millis(20), pending).await;
        assert!(outcome.is_err());
    }
    drop(held);

    let order = engine.get_order(id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Created);
    assert_eq!(engine.order_history(id).unwrap().len(), 2);
}

// ============================================================================
// Event log
// ============================================================================

#[tokio::test]
async fn test_history_replays_to_stored_order() {
    let engine = engine();
    let id = order_in(&engine, OrderStatus::Shipped).await;

    let history = engine.order_history(id).unwrap();
    let types: Vec<_> = history.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(
        types,
        vec!["OrderCreated", "ItemAdded", "OrderConfirmed", "OrderProcessed", "OrderShipped"]
    );
    assert!(history.windows(2).all(|w| w[1].sequence_number == w[0].sequence_number + 1));
    assert_eq!(history[4].metadata.get("command").map(String::as_str), Some("ship"));

    assert_eq!(engine.replay_order(id).unwrap(), engine.get_order(id).await.unwrap());
}

#[tokio::test]
async fn test_history_matches_version_after_each_command() {
    let engine = engine();
    let id = john_doe(&engine).await.id;

    let mut versions = vec![engine.get_order(id).await.unwrap().version];
    for command in [
        OrderCommand::AddItem { item: widget(2) },
        OrderCommand::Confirm,
        OrderCommand::Process,
        OrderCommand::Ship { tracking_number: "TRK-7".into() },
    ] {
        let order = engine.execute(id, command, None).await.unwrap();
        assert_eq!(engine.order_history(id).unwrap().len() as u64, order.version);
        assert_eq!(engine.replay_order(id).unwrap(), order);
        versions.push(order.version);
    }
    assert_eq!(versions, vec![1, 2, 3, 4, 5]);

    let history = engine.order_history(id).unwrap();
    assert!(history.iter().all(|e| e.correlation_id == id.as_uuid()));

    // One causation id per command, never shared between commands
    let mut causes: Vec<_> = history.iter().map(|e| e.causation_id.unwrap()).collect();
    causes.dedup();
    assert_eq!(causes.len(), history.len());
}

#[tokio::test]
async fn test_rejected_command_appends_nothing() {
    let engine = engine();
    let id = order_in(&engine, OrderStatus::Created).await;
    let before = engine.order_history(id).unwrap().len();

    let _ = engine.ship(id, "TRK-1").await;
    let _ = engine.add_item(id, widget(1)).await;

    assert_eq!(engine.order_history(id).unwrap().len(), before);
}

#[tokio::test]
async fn test_subscribers_see_committed_events() {
    let engine = engine();
    let id = order_in(&engine, OrderStatus::Created).await;
    let other = order_in(&engine, OrderStatus::Created).await;

    let mut all = engine.subscribe();
    let mut mine = engine.subscribe_order(id);
    assert_eq!(mine.order_id(), id);

    engine.confirm(other).await.unwrap();
    engine.confirm(id).await.unwrap();

    let first = all.recv().await.unwrap();
    assert_eq!(first.aggregate_id, other.as_uuid());

    let envelope = mine.recv().await.unwrap();
    assert_eq!(envelope.aggregate_id, id.as_uuid());
    assert!(matches!(envelope.event_data, OrderEvent::Confirmed(_)));
    assert_eq!(envelope.sequence_number, 3);
}

// ============================================================================
// Queries and statistics
// ============================================================================

#[tokio::test]
async fn test_list_orders_in_creation_order() {
    let engine = engine();
    let first = order_in(&engine, OrderStatus::Confirmed).await;
    let second = order_in(&engine, OrderStatus::Created).await;
    let third = order_in(&engine, OrderStatus::Confirmed).await;

    let all: Vec<_> = engine.list_orders(None).await.unwrap().into_iter().map(|o| o.id).collect();
    assert_eq!(all, vec![first, second, third]);

    let confirmed: Vec<_> = engine
        .list_orders(Some(OrderStatus::Confirmed))
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.id)
        .collect();
    assert_eq!(confirmed, vec![first, third]);
}

#[tokio::test]
async fn test_find_orders_and_statistics() {
    let engine = engine();

    let ada = engine
        .create_order(CreateOrder::new("CUST-100", "Ada Lovelace"))
        .await
        .unwrap()
        .id;
    engine
        .add_item(ada, LineItem::new("BOOK", "Notes", 1, money("10.00")))
        .await
        .unwrap();

    let grace = engine
        .create_order(CreateOrder::new("CUST-200", "Grace Hopper"))
        .await
        .unwrap()
        .id;
    engine
        .add_item(grace, LineItem::new("BOOK", "Manual", 1, money("5.01")))
        .await
        .unwrap();

    let found = engine
        .find_orders(&OrderFilter::new().with_customer_name_containing("lovelace"))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, ada);

    let found = engine
        .find_orders(&OrderFilter::new().with_min_total(money("5.00")))
        .await
        .unwrap();
    assert_eq!(found.len(), 2);

    assert_eq!(engine.count_by_status(OrderStatus::Created).await.unwrap(), 2);
    assert_eq!(engine.count_by_status(OrderStatus::Shipped).await.unwrap(), 0);

    // (10.00 + 5.01) / 2 = 7.505 rounds half-up
    assert_eq!(
        engine.average_total_by_status(OrderStatus::Created).await.unwrap(),
        Some(money("7.51"))
    );
    assert_eq!(engine.average_total_by_status(OrderStatus::Cancelled).await.unwrap(), None);
}

#[tokio::test]
async fn test_allowed_actions_follow_guards() {
    let engine = engine();

    let empty = john_doe(&engine).await.id;
    let actions = engine.allowed_actions(empty).await.unwrap();
    assert!(actions.can_add_items);
    assert!(!actions.can_remove_items);
    assert!(!actions.can_confirm);
    assert!(actions.can_cancel);

    let shipped = order_in(&engine, OrderStatus::Shipped).await;
    let actions = engine.allowed_actions(shipped).await.unwrap();
    assert!(!actions.can_add_items);
    assert!(!actions.can_cancel);
    assert!(actions.can_deliver);

    let delivered = order_in(&engine, OrderStatus::Delivered).await;
    let actions = engine.allowed_actions(delivered).await.unwrap();
    assert_eq!(
        actions,
        AllowedActions {
            can_add_items: false,
            can_remove_items: false,
            can_confirm: false,
            can_process: false,
            can_ship: false,
            can_cancel: false,
            can_deliver: false,
        }
    );
}

#[tokio::test]
async fn test_metrics_track_commands() {
    let engine = engine();
    let id = order_in(&engine, OrderStatus::Created).await;
    let _ = engine.ship(id, "TRK-1").await;

    let metrics = engine.metrics();
    assert_eq!(metrics.orders_created.get(), 1);
    assert_eq!(metrics.commands_total.with_label_values(&["add_item"]).get(), 1);
    assert_eq!(
        metrics.command_failures.with_label_values(&["ship", "invalid_state"]).get(),
        1
    );
}
