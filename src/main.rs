use anyhow::Context;
use bizdesk::host::{run_session, wire_modules, AuditLog};
use bizdesk::{init_logging, Config, EventBus, BUILD_DATE, VERSION};
use std::path::PathBuf;
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("Failed to load settings from {}", config_path.display()))?;

    // Initialize logging
    init_logging(&config.logging)?;
    tracing::info!("BizDesk {} (built {})", VERSION, BUILD_DATE);

    let bus = EventBus::with_config(config.event_bus.clone())?;
    let audit = Arc::new(AuditLog::new());
    let subscriptions = wire_modules(&bus, Arc::clone(&audit))?;

    let published = run_session(&bus)?;
    if !bus.flush(bus.config().shutdown_timeout()) {
        tracing::warn!("Event bus did not settle, {} events pending", bus.pending_count());
    }

    let mut stats: Vec<_> = bus.get_processing_stats().into_iter().collect();
    stats.sort_by(|a, b| a.0.cmp(&b.0));
    for (event_type, stat) in stats {
        tracing::info!(
            count = stat.count,
            errors = stat.errors,
            avg_us = stat.avg_time().as_micros() as u64,
            "Processed {}",
            event_type
        );
    }
    tracing::info!(
        "Published {} events, {} audit entries",
        published,
        audit.len()
    );

    for id in subscriptions {
        bus.unsubscribe(id);
    }
    bus.shutdown();
    Ok(())
}
