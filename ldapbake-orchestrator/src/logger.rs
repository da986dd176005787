use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Install the fmt subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// One in-flight action, logged on start and on completion with its duration.
pub struct ActionLog {
    pub id: Uuid,
    action_type: &'static str,
    started: Instant,
}

/// Log the start of an action with metadata (context info)
pub fn log_event_with_metadata(
    action_type: &'static str,
    metadata: Option<serde_json::Value>,
) -> ActionLog {
    let id = Uuid::new_v4();
    match &metadata {
        Some(m) => info!("📝 [{}] in_progress ({}) {}", action_type, id, m),
        None => info!("📝 [{}] in_progress ({})", action_type, id),
    }
    ActionLog {
        id,
        action_type,
        started: Instant::now(),
    }
}

impl ActionLog {
    pub fn duration_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }

    pub fn complete(self) {
        info!(
            "✅ [{}] success in {}ms ({})",
            self.action_type,
            self.duration_ms(),
            self.id
        );
    }

    pub fn fail(self, error_message: &str) {
        error!(
            "❌ [{}] failed in {}ms ({}): {}",
            self.action_type,
            self.duration_ms(),
            self.id,
            error_message
        );
    }

    /// Complete or fail depending on `result`, passing it through.
    pub fn finish<T>(self, result: anyhow::Result<T>) -> anyhow::Result<T> {
        match &result {
            Ok(_) => self.complete(),
            Err(e) => self.fail(&format!("{:#}", e)),
        }
        result
    }
}
