use serde::{Deserialize, Serialize};

/// Stages of a bake run. Transitions only move forward by one step.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    Init,
    InstanceRequested,
    InstanceRunning,
    Configured,
    ImageRequested,
    ImageAvailable,
    InstanceTerminated,
}

impl WorkflowStage {
    pub const ALL: [WorkflowStage; 7] = [
        WorkflowStage::Init,
        WorkflowStage::InstanceRequested,
        WorkflowStage::InstanceRunning,
        WorkflowStage::Configured,
        WorkflowStage::ImageRequested,
        WorkflowStage::ImageAvailable,
        WorkflowStage::InstanceTerminated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::InstanceRequested => "instance_requested",
            Self::InstanceRunning => "instance_running",
            Self::Configured => "configured",
            Self::ImageRequested => "image_requested",
            Self::ImageAvailable => "image_available",
            Self::InstanceTerminated => "instance_terminated",
        }
    }

    /// The only stage reachable from `self`, or `None` once terminal.
    pub fn next(&self) -> Option<WorkflowStage> {
        let idx = Self::ALL.iter().position(|s| s == self)?;
        Self::ALL.get(idx + 1).copied()
    }

    pub fn is_terminal(&self) -> bool {
        self.next().is_none()
    }

    pub fn can_transition_to(&self, to: WorkflowStage) -> bool {
        self.next() == Some(to)
    }
}

impl std::fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_only_move_forward_by_one() {
        assert!(WorkflowStage::Init.can_transition_to(WorkflowStage::InstanceRequested));
        assert!(!WorkflowStage::Init.can_transition_to(WorkflowStage::InstanceRunning));
        assert!(!WorkflowStage::Configured.can_transition_to(WorkflowStage::InstanceRunning));
        assert!(!WorkflowStage::Configured.can_transition_to(WorkflowStage::Configured));
        assert!(WorkflowStage::ImageAvailable.can_transition_to(WorkflowStage::InstanceTerminated));
    }

    #[test]
    fn terminal_stage() {
        assert!(WorkflowStage::InstanceTerminated.is_terminal());
        assert_eq!(WorkflowStage::InstanceTerminated.next(), None);
        assert!(!WorkflowStage::ImageAvailable.is_terminal());
    }

    #[test]
    fn walking_next_visits_every_stage_in_order() {
        let mut seen = vec![WorkflowStage::Init];
        let mut cur = WorkflowStage::Init;
        while let Some(n) = cur.next() {
            assert!(n > cur);
            seen.push(n);
            cur = n;
        }
        assert_eq!(seen, WorkflowStage::ALL.to_vec());
    }
}
