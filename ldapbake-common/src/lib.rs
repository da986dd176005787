use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod error;
pub mod stage;

pub use error::BakeError;
pub use stage::WorkflowStage;

// --- Enums ---

/// Lifecycle state of a provider instance.
///
/// Unknown provider values are kept verbatim in `Other` so nothing is lost in logs.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
    Other(String),
}

impl InstanceState {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "shutting-down" => Self::ShuttingDown,
            "terminated" => Self::Terminated,
            "stopping" => Self::Stopping,
            "stopped" => Self::Stopped,
            _ => Self::Other(s.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::ShuttingDown => "shutting-down",
            Self::Terminated => "terminated",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Other(s) => s.as_str(),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a machine image.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ImageState {
    Pending,
    Available,
    Failed,
    Invalid,
    Deregistered,
    Error,
    Other(String),
}

impl ImageState {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "available" => Self::Available,
            "failed" => Self::Failed,
            "invalid" => Self::Invalid,
            "deregistered" => Self::Deregistered,
            "error" => Self::Error,
            _ => Self::Other(s.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Available => "available",
            Self::Failed => "failed",
            Self::Invalid => "invalid",
            Self::Deregistered => "deregistered",
            Self::Error => "error",
            Self::Other(s) => s.as_str(),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for ImageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Entities ---

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Instance {
    pub id: String,
    pub public_ip: Option<String>,
    pub state: InstanceState,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Image {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub state: ImageState,
}

/// Everything the provider needs to start the build instance.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub base_image: String,
    pub instance_type: String,
    pub key_pair: String,
    pub security_groups: Vec<String>,
}

/// One recorded step of the workflow state machine.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StageTransition {
    pub from: WorkflowStage,
    pub to: WorkflowStage,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Summary of a bake run, printed as JSON by the CLI.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BakeReport {
    pub run_id: Uuid,
    pub provider: String,
    pub region: String,
    pub instance_id: Option<String>,
    pub image_id: Option<String>,
    pub image_name: Option<String>,
    pub image_state: Option<ImageState>,
    pub instance_terminated: bool,
    pub stages: Vec<StageTransition>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BakeReport {
    pub fn new(provider: &str, region: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            provider: provider.to_string(),
            region: region.to_string(),
            instance_id: None,
            image_id: None,
            image_name: None,
            image_state: None,
            instance_terminated: false,
            stages: vec![],
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}
