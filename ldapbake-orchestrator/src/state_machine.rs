use chrono::Utc;
use ldapbake_common::{BakeError, StageTransition, WorkflowStage};
use tracing::info;

/// Tracks the stage of a bake run and the transitions taken so far.
#[derive(Debug, Clone)]
pub struct StageTracker {
    current: WorkflowStage,
    history: Vec<StageTransition>,
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            current: WorkflowStage::Init,
            history: vec![],
        }
    }

    pub fn current(&self) -> WorkflowStage {
        self.current
    }

    pub fn history(&self) -> &[StageTransition] {
        &self.history
    }

    /// Move to `to`, which must be the next stage. Anything else is an
    /// `InvalidTransition` and leaves the tracker unchanged.
    pub fn advance(&mut self, to: WorkflowStage, reason: &str) -> Result<(), BakeError> {
        let from = self.current;
        if !from.can_transition_to(to) {
            return Err(BakeError::InvalidTransition { from, to });
        }
        self.current = to;
        self.history.push(StageTransition {
            from,
            to,
            reason: reason.to_string(),
            at: Utc::now(),
        });
        info!("📊 State transition: {} -> {} ({})", from, to, reason);
        Ok(())
    }
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_forward_walk_is_recorded() {
        let mut t = StageTracker::new();
        for stage in &WorkflowStage::ALL[1..] {
            t.advance(*stage, "ok").unwrap();
        }
        assert_eq!(t.current(), WorkflowStage::InstanceTerminated);
        assert_eq!(t.history().len(), 6);
        assert_eq!(t.history()[0].from, WorkflowStage::Init);
        assert_eq!(t.history()[5].to, WorkflowStage::InstanceTerminated);
    }

    #[test]
    fn skipping_a_stage_is_rejected() {
        let mut t = StageTracker::new();
        let err = t.advance(WorkflowStage::Configured, "skip").unwrap_err();
        assert!(matches!(
            err,
            BakeError::InvalidTransition {
                from: WorkflowStage::Init,
                to: WorkflowStage::Configured
            }
        ));
        assert_eq!(t.current(), WorkflowStage::Init);
        assert!(t.history().is_empty());
    }

    #[test]
    fn going_back_is_rejected() {
        let mut t = StageTracker::new();
        t.advance(WorkflowStage::InstanceRequested, "a").unwrap();
        assert!(t.advance(WorkflowStage::Init, "b").is_err());
    }
}
