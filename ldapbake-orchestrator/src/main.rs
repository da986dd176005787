use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;

use ldapbake_orchestrator::provider_manager::ProviderManager;
use ldapbake_orchestrator::remote::OpenSshConnector;
use ldapbake_orchestrator::{configurator, imager, logger, provisioner, workflow, BakeConfig};

#[derive(Parser, Debug)]
#[command(name = "ldapbake", version, about = "Bake an OpenLDAP machine image for integration tests")]
struct Cli {
    /// Cloud provider (overrides LDAPBAKE_PROVIDER)
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Provider region (overrides LDAPBAKE_REGION)
    #[arg(long, global = true)]
    region: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Launch a build instance and wait until it is running
    Launch,
    /// Upgrade an instance and install OpenLDAP on it
    Setup {
        #[arg(long)]
        instance_id: String,
    },
    /// Capture an image of an instance, tag it, and terminate the instance
    Bundle {
        #[arg(long)]
        instance_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Launch, set up and bundle in one run
    Bake,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logger::init();

    let cli = Cli::parse();

    let mut config = BakeConfig::from_env().context("Failed to load configuration")?;
    if let Some(p) = cli.provider {
        config.provider = p.trim().to_ascii_lowercase();
    }
    if let Some(r) = cli.region {
        config.region = r.trim().to_string();
    }

    let provider = ProviderManager::get_provider(&config).await?;
    let connector = OpenSshConnector::default();

    match cli.command {
        Command::Launch => {
            let instance = provisioner::launch_instance(provider.as_ref(), &config).await?;
            println!("{}", serde_json::to_string_pretty(&instance)?);
        }
        Command::Setup { instance_id } => {
            let instance = provider
                .describe_instance(&instance_id)
                .await
                .with_context(|| format!("Failed to look up instance {}", instance_id))?;
            let instance = provisioner::wait_for_running(provider.as_ref(), &config, instance).await?;
            let instance = configurator::setup_instance(&connector, instance, &config).await?;
            println!("{}", serde_json::to_string_pretty(&instance)?);
        }
        Command::Bundle {
            instance_id,
            name,
            description,
        } => {
            let name = name.unwrap_or_else(|| config.ami_name.clone());
            let description = description.unwrap_or_else(|| config.ami_description.clone());
            let outcome =
                imager::bundle_instance(provider.as_ref(), &instance_id, &name, &description, &config)
                    .await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "image": outcome.image,
                    "instance_id": instance_id,
                    "instance_terminated": outcome.instance_terminated,
                }))?
            );
        }
        Command::Bake => {
            let report = workflow::run(provider.as_ref(), &connector, &config).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
