use anyhow::Result;
use ldapbake_providers::CloudProvider;

use crate::config::BakeConfig;

pub struct ProviderManager;

impl ProviderManager {
    /// Build the provider named by `config.provider`.
    pub async fn get_provider(config: &BakeConfig) -> Result<Box<dyn CloudProvider>> {
        match config.provider.to_lowercase().as_str() {
            #[cfg(feature = "provider-ec2")]
            "ec2" => Ok(Box::new(
                ldapbake_providers::ec2::Ec2Provider::connect(&config.region).await,
            )),
            // Dry run: everything is immediately running/available.
            #[cfg(feature = "provider-mock")]
            "mock" => Ok(Box::new(ldapbake_providers::mock::MockProvider::new())),
            // Add other providers here.
            other => Err(anyhow::anyhow!(
                "provider '{}' is unknown or not compiled in (features: {})",
                other,
                Self::compiled_providers().join(", ")
            )),
        }
    }

    pub fn compiled_providers() -> Vec<&'static str> {
        let mut out = vec![];
        if cfg!(feature = "provider-ec2") {
            out.push("ec2");
        }
        if cfg!(feature = "provider-mock") {
            out.push("mock");
        }
        out
    }
}
