use anyhow::Result;
use chrono::Utc;
use ldapbake_common::{BakeReport, WorkflowStage};
use ldapbake_providers::CloudProvider;
use serde_json::json;
use tracing::{error, info, warn};

use crate::config::BakeConfig;
use crate::configurator;
use crate::imager;
use crate::logger;
use crate::provisioner;
use crate::remote::SessionConnector;
use crate::state_machine::StageTracker;

/// Provision, configure and capture in one run.
///
/// Any failure aborts the run with the underlying error. The build instance
/// is left running on failure unless `terminate_on_failure` is set, and it is
/// never terminated while its image is still pending.
pub async fn run(
    provider: &dyn CloudProvider,
    connector: &dyn SessionConnector,
    config: &BakeConfig,
) -> Result<BakeReport> {
    let mut report = BakeReport::new(provider.name(), &config.region);
    let mut tracker = StageTracker::new();

    let log = logger::log_event_with_metadata(
        "BAKE_OPENLDAP_IMAGE",
        Some(json!({
            "run_id": report.run_id,
            "provider": provider.name(),
            "region": config.region,
            "ami_name": config.ami_name,
            "terminate_on_failure": config.terminate_on_failure,
        })),
    );

    let result = run_stages(provider, connector, config, &mut tracker, &mut report).await;

    report.stages = tracker.history().to_vec();
    report.finished_at = Some(Utc::now());

    if let Err(e) = &result {
        handle_failure(provider, config, &tracker, &mut report, e).await;
    }

    log.finish(result.map(|_| report))
}

async fn run_stages(
    provider: &dyn CloudProvider,
    connector: &dyn SessionConnector,
    config: &BakeConfig,
    tracker: &mut StageTracker,
    report: &mut BakeReport,
) -> Result<()> {
    let instance = provisioner::request_instance(provider, config).await?;
    report.instance_id = Some(instance.id.clone());
    tracker.advance(WorkflowStage::InstanceRequested, "run instances accepted")?;

    let instance = provisioner::wait_for_running(provider, config, instance).await?;
    tracker.advance(WorkflowStage::InstanceRunning, "instance reported running")?;

    let instance = configurator::setup_instance(connector, instance, config).await?;
    tracker.advance(WorkflowStage::Configured, "openldap installed")?;

    let image_id = imager::request_image(
        provider,
        &instance.id,
        &config.ami_name,
        &config.ami_description,
    )
    .await?;
    report.image_id = Some(image_id.clone());
    tracker.advance(WorkflowStage::ImageRequested, "create image accepted")?;

    let image = imager::wait_for_image(provider, config, &image_id).await?;
    report.image_state = Some(image.state.clone());
    report.image_name = Some(config.ami_name.clone());
    tracker.advance(WorkflowStage::ImageAvailable, "image left pending")?;

    report.instance_terminated =
        imager::finalize_image(provider, &instance.id, &image, &config.ami_name).await?;
    tracker.advance(WorkflowStage::InstanceTerminated, "source instance terminated")?;

    info!(
        "🎉 Image {} ({}) baked from instance {}",
        image.id, config.ami_name, instance.id
    );
    Ok(())
}

async fn handle_failure(
    provider: &dyn CloudProvider,
    config: &BakeConfig,
    tracker: &StageTracker,
    report: &mut BakeReport,
    err: &anyhow::Error,
) {
    let stage = tracker.current();
    error!("❌ Bake run {} aborted at stage {}: {:#}", report.run_id, stage, err);

    let Some(instance_id) = report.instance_id.clone() else {
        return;
    };
    if report.instance_terminated || stage == WorkflowStage::InstanceTerminated {
        return;
    }

    // Terminating while the image is still being written would capture a torn snapshot.
    if stage == WorkflowStage::ImageRequested {
        warn!(
            "⚠️ Instance {} left running: image {} has not left pending",
            instance_id,
            report.image_id.as_deref().unwrap_or("-")
        );
        return;
    }

    if !config.terminate_on_failure {
        warn!(
            "⚠️ Instance {} left running (terminate_on_failure is off); terminate it manually",
            instance_id
        );
        return;
    }

    match provider.terminate_instance(&instance_id).await {
        Ok(acknowledged) => {
            report.instance_terminated = acknowledged;
            info!(
                "🧹 Instance {} terminated after failure (acknowledged={})",
                instance_id, acknowledged
            );
        }
        Err(e) => error!(
            "❌ Failed to terminate instance {} after failure: {:#}",
            instance_id, e
        ),
    }
}
