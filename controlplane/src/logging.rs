use std::path::Path;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt};

pub type ReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

/// Builds the global subscriber: ansi fmt layer to stderr, optionally a
/// non-blocking rolling file layer, both gated by a reloadable `EnvFilter`
/// seeded from `log_level` plus the `RUST_LOG` environment variable.
pub fn init(log_level: &str, log_dir: Option<&Path>) -> anyhow::Result<ReloadHandle> {
    let mut filter = EnvFilter::new(log_level);
    if let Ok(env) = std::env::var("RUST_LOG") {
        for directive in env.split(',') {
            if let Ok(directive) = directive.parse() {
                filter = filter.add_directive(directive);
            }
        }
    }
    let (filter, handle) = reload::Layer::new(filter);

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true));

    if let Some(dir) = log_dir {
        std::fs::create_dir_all(dir)?;
        let appender = tracing_appender::rolling::daily(dir, "fleet-controlplane.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        // Leak the guard: logging lives for the process lifetime.
        std::mem::forget(guard);
        registry
            .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
            .try_init()?;
    } else {
        registry.try_init()?;
    }

    Ok(handle)
}
