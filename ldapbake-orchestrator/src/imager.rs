use anyhow::Result;
use ldapbake_common::{Image, ImageState};
use ldapbake_providers::CloudProvider;
use serde_json::json;
use tracing::{info, warn};

use crate::config::BakeConfig;
use crate::logger;
use crate::polling::wait_until;

pub const NAME_TAG: &str = "Name";

/// What `bundle_instance` produced.
#[derive(Debug, Clone)]
pub struct BundleOutcome {
    pub image: Image,
    pub instance_terminated: bool,
}

/// Issue the create-image request. Returns the new image id.
pub async fn request_image(
    provider: &dyn CloudProvider,
    instance_id: &str,
    name: &str,
    description: &str,
) -> Result<String> {
    let image_id = provider.create_image(instance_id, name, description).await?;
    info!("📸 Image {} requested from instance {}", image_id, instance_id);
    Ok(image_id)
}

/// Fetch the image's record, then poll until it leaves `pending`, per
/// `config.image_poll`.
pub async fn wait_for_image(
    provider: &dyn CloudProvider,
    config: &BakeConfig,
    image_id: &str,
) -> Result<Image> {
    let image = provider.describe_image(image_id).await?;
    let what = format!("image {} to leave pending", image_id);

    let image = wait_until(
        &config.image_poll,
        &what,
        image,
        || provider.describe_image(image_id),
        |i: &Image| !i.state.is_pending(),
    )
    .await?;

    if image.state != ImageState::Available {
        warn!(
            "⚠️ Image {} settled in state {} (expected available); continuing",
            image.id, image.state
        );
    } else {
        info!("✅ Image {} is available", image.id);
    }
    Ok(image)
}

/// Tag the finished image and terminate its source instance.
///
/// Only call once `image` has left `pending`.
pub async fn finalize_image(
    provider: &dyn CloudProvider,
    instance_id: &str,
    image: &Image,
    name: &str,
) -> Result<bool> {
    provider.tag_resource(&image.id, NAME_TAG, name).await?;
    let terminated = provider.terminate_instance(instance_id).await?;
    info!(
        "🧹 Instance {} terminated after capturing {} (acknowledged={})",
        instance_id, image.id, terminated
    );
    Ok(terminated)
}

/// Capture, tag, then terminate the source instance.
pub async fn bundle_instance(
    provider: &dyn CloudProvider,
    instance_id: &str,
    name: &str,
    description: &str,
    config: &BakeConfig,
) -> Result<BundleOutcome> {
    let log = logger::log_event_with_metadata(
        "BUNDLE_OPENLDAP_INSTANCE",
        Some(json!({
            "instance_id": instance_id,
            "ami_name": name,
            "ami_description": description,
        })),
    );

    let result = async {
        let image_id = request_image(provider, instance_id, name, description).await?;
        let image = wait_for_image(provider, config, &image_id).await?;
        let instance_terminated = finalize_image(provider, instance_id, &image, name).await?;
        Ok::<_, anyhow::Error>(BundleOutcome {
            image,
            instance_terminated,
        })
    }
    .await;

    log.finish(result)
}
