use anyhow::Result;
use ldapbake_common::Instance;
use ldapbake_providers::CloudProvider;
use serde_json::json;
use tracing::info;

use crate::config::BakeConfig;
use crate::logger;
use crate::polling::wait_until;

/// Launch one build instance and wait for it to report `running`.
///
/// The state returned by the launch call is the first observation; each
/// non-running observation is followed by one sleep and one re-fetch.
pub async fn launch_instance(provider: &dyn CloudProvider, config: &BakeConfig) -> Result<Instance> {
    let spec = config.launch_spec();
    let log = logger::log_event_with_metadata(
        "LAUNCH_INSTANCE",
        Some(json!({
            "provider": provider.name(),
            "region": config.region,
            "base_image": spec.base_image,
            "instance_type": spec.instance_type,
            "key_pair": spec.key_pair,
            "security_groups": spec.security_groups,
        })),
    );

    let result = async {
        let instance = request_instance(provider, config).await?;
        wait_for_running(provider, config, instance).await
    }
    .await;

    log.finish(result)
}

/// Issue the single run-instances request.
pub async fn request_instance(provider: &dyn CloudProvider, config: &BakeConfig) -> Result<Instance> {
    let instance = provider.run_instance(&config.launch_spec()).await?;
    info!(
        "🚀 Instance {} requested (state={})",
        instance.id, instance.state
    );
    Ok(instance)
}

/// Poll `instance` until it is running, per `config.instance_poll`.
pub async fn wait_for_running(
    provider: &dyn CloudProvider,
    config: &BakeConfig,
    instance: Instance,
) -> Result<Instance> {
    let id = instance.id.clone();
    let instance_id: &str = &id;
    let what = format!("instance {} to be running", instance_id);

    let instance = wait_until(
        &config.instance_poll,
        &what,
        instance,
        || provider.describe_instance(instance_id),
        |i: &Instance| i.state.is_running(),
    )
    .await?;

    info!(
        "✅ Instance {} is running (public_ip={})",
        instance.id,
        instance.public_ip.as_deref().unwrap_or("-")
    );
    Ok(instance)
}
