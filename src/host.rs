//! Module wiring for the headless host.
//!
//! Registers the handlers each business module keeps on the bus and
//! provides a small scripted session used by the binary.

use bizdesk_core::{
    DispatchMode, Event, EventBus, EventFilter, NewEvent, Priority, PublishError,
    SubscribeOptions, SubscriptionError, SubscriptionId,
};
use parking_lot::Mutex;
use serde_json::json;
use std::time::Duration;

/// One line of the audit trail
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub event_type: String,
    pub source: Option<String>,
    pub priority: Priority,
}

/// Audit trail fed by a global subscriber
#[derive(Debug, Default)]
pub struct AuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, event: &Event) {
        self.entries.lock().push(AuditEntry {
            event_type: event.event_type().to_string(),
            source: event.source().map(str::to_string),
            priority: event.priority(),
        });
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Register the module handlers on `bus`
///
/// Returns the subscription ids so the caller can detach them on teardown.
pub fn wire_modules(
    bus: &EventBus,
    audit: std::sync::Arc<AuditLog>,
) -> Result<Vec<SubscriptionId>, SubscriptionError> {
    let mut ids = Vec::new();

    ids.push(bus.subscribe("customer_created", |event| {
        let name = event.data()["name"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("customer_created without a name"))?;
        tracing::info!(event_id = %event.id(), "Customer module: new customer {}", name);
        Ok(())
    })?);

    ids.push(bus.subscribe_with(
        "order_created",
        SubscribeOptions::new().filter(EventFilter::min_priority(Priority::High)),
        |event| {
            tracing::info!(
                event_id = %event.id(),
                "Finance module: fast-tracking order {}",
                event.data()["id"]
            );
            Ok(())
        },
    )?);

    ids.push(bus.subscribe_with(
        "report_requested",
        SubscribeOptions::new()
            .mode(DispatchMode::Async)
            .owner("reports"),
        |event| {
            // Stand-in for the report renderer
            std::thread::sleep(Duration::from_millis(20));
            tracing::info!(
                event_id = %event.id(),
                "Report module: generated {}",
                event.data()["report"]
            );
            Ok(())
        },
    )?);

    ids.push(bus.subscribe_global(move |event| {
        audit.record(event);
        Ok(())
    })?);

    tracing::debug!("Wired {} module handlers", ids.len());
    Ok(ids)
}

/// Publish a short scripted session touching every module
pub fn run_session(bus: &EventBus) -> Result<usize, PublishError> {
    let events = [
        NewEvent::new("customer_created")
            .data(json!({"id": 42, "name": "Acme Ltd"}))
            .source("customer_panel"),
        NewEvent::new("order_created")
            .data(json!({"id": 1, "customer": 42, "total": 1250.0}))
            .source("order_panel")
            .priority(Priority::High),
        NewEvent::new("order_created")
            .data(json!({"id": 2, "customer": 42, "total": 80.0}))
            .source("order_panel"),
        NewEvent::new("report_requested")
            .data(json!({"report": "monthly_sales"}))
            .source("dashboard")
            .target("reports")
            .priority(Priority::Low),
        NewEvent::new("contract_signed")
            .data(json!({"contract": "C-2024-007"}))
            .source("contract_panel")
            .priority(Priority::Critical)
            .sync(true),
    ];

    let count = events.len();
    for event in events {
        bus.publish(event)?;
    }
    Ok(count)
}
