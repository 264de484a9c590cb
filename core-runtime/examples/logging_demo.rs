//! Logging runtime demonstration
//!
//! Stands up a manager with a console sink and a rotating text file sink,
//! emits a handful of typed events, and shows the activity-ID slot in use.
//!
//! Run with:
//! ```bash
//! cargo run --example logging_demo
//!
//! # Custom log directory
//! DATADIR=/tmp cargo run --example logging_demo
//! ```

use anyhow::Result;
use core_events::{Level, ProviderDescriptor, Subscription, TraceEvent};
use core_runtime::{LogConfig, LogManager, LoggingConfig};
use core_sinks::SinkKind;

fn main() -> Result<()> {
    // The runtime's own diagnostics go through `tracing`.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let manager = LogManager::new();
    manager.start()?;

    let provider = ProviderDescriptor::from_name("DemoService")?;

    let mut console = LogConfig::new("", SinkKind::Console);
    console.add_subscription(Subscription::for_provider(&provider, Level::Verbose, 0))?;

    let mut file = LogConfig::new("demo", SinkKind::Text);
    file.add_subscription(Subscription::for_provider(&provider, Level::Informational, 0))?;
    file.set_rotation_interval(3600)?;
    file.set_maximum_age(7 * 86_400)?;

    manager.set_configuration(
        LoggingConfig::new().with_log(console).with_log(file),
    )?;

    manager.write_event(
        TraceEvent::builder(&provider, 1, "Startup")
            .level(Level::Informational)
            .param("version", "1.4.2")
            .build()?,
    );

    // Everything emitted inside an activity carries its identifier.
    let activity = manager.new_activity_id();
    manager.write_event(
        TraceEvent::builder(&provider, 2, "RequestReceived")
            .level(Level::Informational)
            .param("path", "/library/scan")
            .build()?,
    );
    manager.write_event(
        TraceEvent::builder(&provider, 3, "RequestCompleted")
            .level(Level::Informational)
            .param("status", 200u32)
            .param("elapsed_ms", 42u64)
            .build()?,
    );
    manager.clear_activity_id();
    println!("emitted request events under activity {}", activity);

    manager.write_event(
        TraceEvent::builder(&provider, 4, "Shutdown")
            .level(Level::Warning)
            .param("reason", "demo complete")
            .build()?,
    );

    println!(
        "text log written under {}",
        manager.default_directory().display()
    );
    manager.shutdown();
    Ok(())
}
