use anyhow::Result;
use async_trait::async_trait;
use ldapbake_common::{Image, Instance, LaunchSpec};

/// Control-plane operations the bake workflow consumes.
///
/// Implementations surface provider errors unmodified (wrapped with context);
/// the workflow never retries a failed call.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Short provider code used in logs and reports (e.g. "ec2", "mock").
    fn name(&self) -> &'static str;

    /// Launch exactly one instance and return the first instance of the response.
    async fn run_instance(&self, spec: &LaunchSpec) -> Result<Instance>;

    async fn describe_instance(&self, instance_id: &str) -> Result<Instance>;

    /// Request an image of `instance_id`. Returns the new image id.
    async fn create_image(&self, instance_id: &str, name: &str, description: &str)
        -> Result<String>;

    async fn describe_image(&self, image_id: &str) -> Result<Image>;

    async fn tag_resource(&self, resource_id: &str, key: &str, value: &str) -> Result<()>;

    async fn terminate_instance(&self, instance_id: &str) -> Result<bool>;
}

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "ec2")]
pub mod ec2;
