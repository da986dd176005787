use crate::CloudProvider;
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_ec2::error::DisplayErrorContext;
use aws_sdk_ec2::types::{InstanceType, Tag};
use aws_sdk_ec2::Client;
use ldapbake_common::{Image, ImageState, Instance, InstanceState, LaunchSpec};
use tracing::{error, info, warn};

pub struct Ec2Provider {
    client: Client,
    region: String,
}

impl Ec2Provider {
    /// Build a client for `region` using the SDK's default credential chain
    /// (environment, shared profile, instance role).
    pub async fn connect(region: &str) -> Self {
        let region = region.trim().to_string();
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.clone()))
            .load()
            .await;
        Self {
            client: Client::new(&sdk_config),
            region,
        }
    }

    fn to_instance(inst: &aws_sdk_ec2::types::Instance) -> Result<Instance> {
        let id = inst
            .instance_id()
            .ok_or_else(|| anyhow::anyhow!("No instance id in EC2 response"))?
            .to_string();
        let state = inst
            .state()
            .and_then(|s| s.name())
            .map(|n| InstanceState::parse(n.as_str()))
            .unwrap_or(InstanceState::Pending);
        Ok(Instance {
            id,
            public_ip: inst.public_ip_address().map(|s| s.to_string()),
            state,
        })
    }
}

#[async_trait]
impl CloudProvider for Ec2Provider {
    fn name(&self) -> &'static str {
        "ec2"
    }

    async fn run_instance(&self, spec: &LaunchSpec) -> Result<Instance> {
        info!(
            "🔵 [EC2 API] RunInstances - image={}, type={}, key_pair={}, security_groups={:?}, region={}",
            spec.base_image, spec.instance_type, spec.key_pair, spec.security_groups, self.region
        );

        let resp = self
            .client
            .run_instances()
            .image_id(&spec.base_image)
            .instance_type(InstanceType::from(spec.instance_type.as_str()))
            .key_name(&spec.key_pair)
            .set_security_groups(Some(spec.security_groups.clone()))
            .min_count(1)
            .max_count(1)
            .send()
            .await
            .map_err(|e| {
                error!("❌ [EC2 API] RunInstances failed: {}", DisplayErrorContext(&e));
                anyhow::anyhow!("EC2 RunInstances failed: {}", DisplayErrorContext(&e))
            })?;

        let first = resp
            .instances()
            .first()
            .ok_or(ldapbake_common::BakeError::NoInstanceReturned)?;
        let instance = Self::to_instance(first)?;

        info!(
            "✅ [EC2 API] RunInstances succeeded: instance_id={}, state={}",
            instance.id, instance.state
        );
        Ok(instance)
    }

    async fn describe_instance(&self, instance_id: &str) -> Result<Instance> {
        let resp = self
            .client
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "EC2 DescribeInstances failed for {}: {}",
                    instance_id,
                    DisplayErrorContext(&e)
                )
            })?;

        let inst = resp
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .find(|i| i.instance_id() == Some(instance_id))
            .with_context(|| format!("Instance {} not found in DescribeInstances", instance_id))?;

        Self::to_instance(inst)
    }

    async fn create_image(
        &self,
        instance_id: &str,
        name: &str,
        description: &str,
    ) -> Result<String> {
        info!(
            "🔵 [EC2 API] CreateImage - instance_id={}, name={}",
            instance_id, name
        );

        let resp = self
            .client
            .create_image()
            .instance_id(instance_id)
            .name(name)
            .description(description)
            .send()
            .await
            .map_err(|e| {
                error!("❌ [EC2 API] CreateImage failed: {}", DisplayErrorContext(&e));
                anyhow::anyhow!("EC2 CreateImage failed: {}", DisplayErrorContext(&e))
            })?;

        let image_id = resp
            .image_id()
            .ok_or(ldapbake_common::BakeError::MissingImageId)?
            .to_string();
        info!("✅ [EC2 API] CreateImage succeeded: image_id={}", image_id);
        Ok(image_id)
    }

    async fn describe_image(&self, image_id: &str) -> Result<Image> {
        let resp = self
            .client
            .describe_images()
            .image_ids(image_id)
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "EC2 DescribeImages failed for {}: {}",
                    image_id,
                    DisplayErrorContext(&e)
                )
            })?;

        let img = resp
            .images()
            .iter()
            .find(|i| i.image_id() == Some(image_id))
            .with_context(|| format!("Image {} not found in DescribeImages", image_id))?;

        // A freshly requested image can briefly come back without a state.
        let state = match img.state() {
            Some(s) => ImageState::parse(s.as_str()),
            None => {
                warn!("⚠️ [EC2 API] Image {} has no state yet, treating as pending", image_id);
                ImageState::Pending
            }
        };

        Ok(Image {
            id: image_id.to_string(),
            name: img.name().map(|s| s.to_string()),
            description: img.description().map(|s| s.to_string()),
            state,
        })
    }

    async fn tag_resource(&self, resource_id: &str, key: &str, value: &str) -> Result<()> {
        info!(
            "🔵 [EC2 API] CreateTags - resource={}, {}={}",
            resource_id, key, value
        );
        self.client
            .create_tags()
            .resources(resource_id)
            .tags(Tag::builder().key(key).value(value).build())
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "EC2 CreateTags failed for {}: {}",
                    resource_id,
                    DisplayErrorContext(&e)
                )
            })?;
        Ok(())
    }

    async fn terminate_instance(&self, instance_id: &str) -> Result<bool> {
        info!("🔵 [EC2 API] TerminateInstances - instance_id={}", instance_id);
        let resp = self
            .client
            .terminate_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|e| {
                error!(
                    "❌ [EC2 API] TerminateInstances failed for {}: {}",
                    instance_id,
                    DisplayErrorContext(&e)
                );
                anyhow::anyhow!(
                    "EC2 TerminateInstances failed for {}: {}",
                    instance_id,
                    DisplayErrorContext(&e)
                )
            })?;

        let acknowledged = resp
            .terminating_instances()
            .iter()
            .any(|c| c.instance_id() == Some(instance_id));
        if acknowledged {
            info!("✅ [EC2 API] TerminateInstances accepted for {}", instance_id);
        } else {
            warn!(
                "⚠️ [EC2 API] TerminateInstances response did not list {}",
                instance_id
            );
        }
        Ok(acknowledged)
    }
}
