use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_lifecycle::event_sourcing::serialize_event;
use order_lifecycle::{
    CreateOrder, EngineConfig, InMemoryOrderRepository, LineItem, OrderLifecycleEngine, OrderStatus,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_lifecycle=debug"))
        )
        .init();

    tracing::info!("🚀 Starting Order Lifecycle Engine demo");

    // === 1. Configuration and engine ===
    let config = EngineConfig::from_env()?;
    let repository = Arc::new(InMemoryOrderRepository::new());
    let engine = Arc::new(OrderLifecycleEngine::new(repository, config)?);
    tracing::info!(
        "📊 Metrics registry created with {} metrics",
        engine.metrics().registry().gather().len()
    );

    // === 2. Watch the event log ===
    let mut events = engine.subscribe();
    let watcher = tokio::spawn(async move {
        while let Ok(envelope) = events.recv().await {
            tracing::info!(
                order_id = %envelope.aggregate_id,
                sequence = envelope.sequence_number,
                event_type = %envelope.event_type,
                "📤 Event recorded"
            );
        }
    });

    // === 3. Happy path ===
    tracing::info!("📝 Demonstrating order lifecycle");

    let order = engine
        .create_order(
            CreateOrder::new("CUST-001", "John Doe")
                .with_email("john.doe@example.com")
                .with_shipping_address("42 Main Street"),
        )
        .await?;
    let order_id = order.id;

    engine
        .add_item(order_id, LineItem::new("PROD-001", "Widget", 2, "9.99".parse()?))
        .await?;
    engine
        .add_item(order_id, LineItem::new("PROD-002", "Gadget", 1, "24.50".parse()?))
        .await?;
    engine.remove_item(order_id, "PROD-002").await?;
    engine.confirm(order_id).await?;
    engine.process(order_id).await?;
    engine.ship(order_id, "TRK-123456").await?;
    let delivered = engine.deliver(order_id).await?;

    tracing::info!(
        order_id = %delivered.id,
        status = %delivered.status,
        total = %delivered.total_amount,
        "✅ Order delivered"
    );

    // === 4. Rejected commands leave the order alone ===
    if let Err(e) = engine.cancel(order_id, "Customer changed mind").await {
        tracing::info!(kind = e.kind().as_str(), "Expected rejection: {}", e);
    }

    let empty = engine.create_order(CreateOrder::new("CUST-002", "Jane Roe")).await?;
    if let Err(e) = engine.confirm(empty.id).await {
        tracing::info!(kind = e.kind().as_str(), "Expected rejection: {}", e);
    }
    engine.cancel(empty.id, "Abandoned cart").await?;

    // === 5. Queries ===
    for status in OrderStatus::ALL {
        let count = engine.count_by_status(status).await?;
        if count > 0 {
            let average = engine.average_total_by_status(status).await?;
            tracing::info!(
                status = %status,
                count = count,
                average = ?average.map(|m| m.to_string()),
                "Orders by status"
            );
        }
    }

    let history = engine.order_history(order_id)?;
    tracing::info!(events = history.len(), "📜 Order history loaded");
    for envelope in &history {
        println!("{:>2} {}", envelope.sequence_number, serialize_event(&envelope.event_data)?);
    }
    println!("{}", serde_json::to_string_pretty(&engine.get_order(order_id).await?)?);

    // Let the watcher drain, then stop
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    watcher.abort();

    tracing::info!("👋 Demo finished");
    Ok(())
}
