use anyhow::Result;
use ldapbake_common::{BakeError, Instance};
use serde_json::json;
use tracing::{info, warn};

use crate::config::{BakeConfig, DirectorySettings};
use crate::logger;
use crate::remote::{connect_with_retries, sh_escape_single, RemoteSession, SessionConnector, SshTarget};

pub const HOSTS_FILE: &str = "/etc/hosts";
pub const HOSTS_BACKUP: &str = "/etc/hosts.bak";
pub const UTILITY_PACKAGE: &str = "debconf-utils";
pub const DIRECTORY_PACKAGES: [&str; 2] = ["slapd", "ldap-utils"];

/// One debconf answer: `<owner> <question> <type> <value>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebconfAnswer {
    pub owner: &'static str,
    pub question: &'static str,
    pub kind: &'static str,
    pub value: String,
}

impl DebconfAnswer {
    pub fn selection_line(&self) -> String {
        format!("{} {} {} {}", self.owner, self.question, self.kind, self.value)
    }

    pub fn command(&self) -> String {
        format!(
            "echo {} | debconf-set-selections",
            sh_escape_single(&self.selection_line())
        )
    }
}

/// The slapd prompts answered ahead of the non-interactive install.
pub fn preseed_answers(dir: &DirectorySettings) -> Vec<DebconfAnswer> {
    vec![
        DebconfAnswer {
            owner: "slapd",
            question: "slapd/password1",
            kind: "password",
            value: dir.admin_password.clone(),
        },
        DebconfAnswer {
            owner: "slapd",
            question: "slapd/password2",
            kind: "password",
            value: dir.admin_password.clone(),
        },
        DebconfAnswer {
            owner: "slapd",
            question: "shared/organization",
            kind: "string",
            value: dir.organization.clone(),
        },
        DebconfAnswer {
            owner: "slapd",
            question: "slapd/organization",
            kind: "string",
            value: dir.organization.clone(),
        },
        DebconfAnswer {
            owner: "slapd",
            question: "slapd/domain",
            kind: "string",
            value: dir.domain.clone(),
        },
    ]
}

pub fn hosts_entry(dir: &DirectorySettings) -> String {
    format!("127.0.1.1 ldap.{} ldap", dir.domain)
}

/// Step A: refresh, upgrade, install the debconf tooling.
pub fn upgrade_commands() -> Vec<String> {
    vec![
        "apt-get update".to_string(),
        "apt-get -y upgrade".to_string(),
        format!("apt-get -y install {}", UTILITY_PACKAGE),
    ]
}

/// Step B: hosts entry, debconf answers, then the directory packages.
pub fn directory_service_commands(dir: &DirectorySettings) -> Vec<String> {
    let mut cmds = vec![
        format!("cp {} {}", HOSTS_FILE, HOSTS_BACKUP),
        format!(
            "sed -i {} {}",
            sh_escape_single(&format!("1i {}", hosts_entry(dir))),
            HOSTS_FILE
        ),
    ];
    cmds.extend(preseed_answers(dir).iter().map(|a| a.command()));
    cmds.push(format!(
        "DEBIAN_FRONTEND=noninteractive apt-get -y install {}",
        DIRECTORY_PACKAGES.join(" ")
    ));
    cmds
}

/// Every command of a setup run, in execution order.
pub fn setup_commands(dir: &DirectorySettings) -> Vec<String> {
    let mut cmds = upgrade_commands();
    cmds.extend(directory_service_commands(dir));
    cmds
}

async fn run_all(session: &mut dyn RemoteSession, commands: &[String]) -> Result<()> {
    for cmd in commands {
        session.sudo(cmd).await?;
    }
    Ok(())
}

/// Upgrade the instance and install the directory service over one session.
///
/// The session is closed whether or not the commands succeed. There is no
/// rollback: a failed command leaves the instance as it is.
pub async fn setup_instance(
    connector: &dyn SessionConnector,
    instance: Instance,
    config: &BakeConfig,
) -> Result<Instance> {
    let host = instance
        .public_ip
        .clone()
        .ok_or_else(|| BakeError::MissingPublicAddress {
            instance_id: instance.id.clone(),
        })?;
    let target = SshTarget::new(&host, &config.ssh_user, &config.key_file);

    let log = logger::log_event_with_metadata(
        "SETUP_OPENLDAP_INSTANCE",
        Some(json!({
            "instance_id": instance.id,
            "target": target.destination(),
            "key_file": config.key_file.display().to_string(),
            "connect_attempts": config.ssh_connect_attempts,
        })),
    );

    let result = async {
        let mut session = connect_with_retries(
            connector,
            &target,
            config.ssh_connect_attempts,
            config.ssh_retry_delay,
        )
        .await?;

        let outcome = async {
            info!("🔧 [setup] Upgrading packages on {}", instance.id);
            run_all(session.as_mut(), &upgrade_commands()).await?;
            info!("🔧 [setup] Installing OpenLDAP on {}", instance.id);
            run_all(session.as_mut(), &directory_service_commands(&config.directory)).await
        }
        .await;

        if let Err(e) = session.close().await {
            warn!("⚠️ [setup] Failed to close session to {}: {}", target.destination(), e);
        }
        outcome
    }
    .await;

    log.finish(result)?;
    Ok(instance)
}
