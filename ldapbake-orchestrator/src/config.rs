use ldapbake_common::{BakeError, LaunchSpec};
use std::path::PathBuf;
use std::time::Duration;

use crate::polling::PollPolicy;

pub const ENV_PREFIX: &str = "LDAPBAKE_";

pub const DEFAULT_PROVIDER: &str = "ec2";
pub const DEFAULT_REGION: &str = "eu-west-1";
pub const DEFAULT_BASE_IMAGE: &str = "ami-ce7b6fba";
pub const DEFAULT_KEY_PAIR: &str = "spring-ldap";
pub const DEFAULT_INSTANCE_TYPE: &str = "t1.micro";
pub const DEFAULT_SECURITY_GROUPS: &str = "spring-ldap";
pub const DEFAULT_SSH_USER: &str = "ubuntu";
pub const DEFAULT_KEY_FILE: &str = "~/.ssh/spring-ldap.pem";
pub const DEFAULT_AMI_NAME: &str = "spring-ldap-openldap";
pub const DEFAULT_AMI_DESCRIPTION: &str = "OpenLDAP server for Spring LDAP integration tests";

/// Answers fed to the slapd installer through debconf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorySettings {
    pub admin_password: String,
    pub organization: String,
    pub domain: String,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            admin_password: "secret".to_string(),
            organization: "261consulting.com".to_string(),
            domain: "261consulting.com".to_string(),
        }
    }
}

/// Every knob of a bake run. Built once and passed into each step.
#[derive(Debug, Clone)]
pub struct BakeConfig {
    pub provider: String,
    pub region: String,
    pub base_image: String,
    pub key_pair: String,
    pub instance_type: String,
    pub security_groups: Vec<String>,
    pub ssh_user: String,
    pub key_file: PathBuf,
    pub ami_name: String,
    pub ami_description: String,
    pub ssh_connect_attempts: u32,
    pub ssh_retry_delay: Duration,
    pub instance_poll: PollPolicy,
    pub image_poll: PollPolicy,
    pub terminate_on_failure: bool,
    pub directory: DirectorySettings,
}

impl Default for BakeConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            region: DEFAULT_REGION.to_string(),
            base_image: DEFAULT_BASE_IMAGE.to_string(),
            key_pair: DEFAULT_KEY_PAIR.to_string(),
            instance_type: DEFAULT_INSTANCE_TYPE.to_string(),
            security_groups: parse_list(DEFAULT_SECURITY_GROUPS),
            ssh_user: DEFAULT_SSH_USER.to_string(),
            key_file: expand_home(DEFAULT_KEY_FILE, None),
            ami_name: DEFAULT_AMI_NAME.to_string(),
            ami_description: DEFAULT_AMI_DESCRIPTION.to_string(),
            ssh_connect_attempts: 10,
            ssh_retry_delay: Duration::from_secs(10),
            instance_poll: PollPolicy::new(Duration::from_secs(10), Some(60)),
            image_poll: PollPolicy::new(Duration::from_secs(20), Some(180)),
            terminate_on_failure: false,
            directory: DirectorySettings::default(),
        }
    }
}

impl BakeConfig {
    /// Load from `LDAPBAKE_*` process environment variables.
    pub fn from_env() -> Result<Self, BakeError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Keys are full variable names
    /// (`LDAPBAKE_REGION`, ...). Missing or blank values keep the default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BakeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| -> Option<String> {
            lookup(&format!("{}{}", ENV_PREFIX, name))
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        let home = lookup("HOME");

        let mut cfg = Self::default();

        if let Some(v) = get("PROVIDER") {
            cfg.provider = v.to_ascii_lowercase();
        }
        if let Some(v) = get("REGION") {
            cfg.region = v;
        }
        if let Some(v) = get("BASE_IMAGE") {
            cfg.base_image = v;
        }
        if let Some(v) = get("KEY_PAIR") {
            cfg.key_pair = v;
        }
        if let Some(v) = get("INSTANCE_TYPE") {
            cfg.instance_type = v;
        }
        if let Some(v) = get("SECURITY_GROUPS") {
            cfg.security_groups = parse_list(&v);
        }
        if let Some(v) = get("SSH_USER") {
            cfg.ssh_user = v;
        }
        cfg.key_file = expand_home(
            get("KEY_FILE").as_deref().unwrap_or(DEFAULT_KEY_FILE),
            home.as_deref(),
        );
        if let Some(v) = get("AMI_NAME") {
            cfg.ami_name = v;
        }
        if let Some(v) = get("AMI_DESCRIPTION") {
            cfg.ami_description = v;
        }
        if let Some(v) = get("SSH_CONNECT_ATTEMPTS") {
            cfg.ssh_connect_attempts = parse_num("SSH_CONNECT_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("SSH_RETRY_DELAY_SECS") {
            cfg.ssh_retry_delay = Duration::from_secs(parse_num("SSH_RETRY_DELAY_SECS", &v)?);
        }
        if let Some(v) = get("INSTANCE_POLL_INTERVAL_SECS") {
            cfg.instance_poll.interval =
                Duration::from_secs(parse_num("INSTANCE_POLL_INTERVAL_SECS", &v)?);
        }
        if let Some(v) = get("INSTANCE_POLL_MAX_ATTEMPTS") {
            cfg.instance_poll.max_attempts =
                attempts_limit(parse_num("INSTANCE_POLL_MAX_ATTEMPTS", &v)?);
        }
        if let Some(v) = get("IMAGE_POLL_INTERVAL_SECS") {
            cfg.image_poll.interval =
                Duration::from_secs(parse_num("IMAGE_POLL_INTERVAL_SECS", &v)?);
        }
        if let Some(v) = get("IMAGE_POLL_MAX_ATTEMPTS") {
            cfg.image_poll.max_attempts = attempts_limit(parse_num("IMAGE_POLL_MAX_ATTEMPTS", &v)?);
        }
        if let Some(v) = get("TERMINATE_ON_FAILURE") {
            cfg.terminate_on_failure = parse_bool("TERMINATE_ON_FAILURE", &v)?;
        }
        if let Some(v) = get("LDAP_ADMIN_PASSWORD") {
            cfg.directory.admin_password = v;
        }
        if let Some(v) = get("LDAP_ORGANIZATION") {
            cfg.directory.organization = v;
        }
        if let Some(v) = get("LDAP_DOMAIN") {
            cfg.directory.domain = v;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), BakeError> {
        if self.security_groups.is_empty() {
            return Err(BakeError::InvalidConfig(
                "at least one security group is required".to_string(),
            ));
        }
        if self.ssh_connect_attempts == 0 {
            return Err(BakeError::InvalidConfig(
                "ssh_connect_attempts must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("base_image", &self.base_image),
            ("key_pair", &self.key_pair),
            ("instance_type", &self.instance_type),
            ("ssh_user", &self.ssh_user),
            ("ami_name", &self.ami_name),
        ] {
            if value.trim().is_empty() {
                return Err(BakeError::InvalidConfig(format!("{} must not be empty", name)));
            }
        }
        Ok(())
    }

    pub fn launch_spec(&self) -> LaunchSpec {
        LaunchSpec {
            base_image: self.base_image.clone(),
            instance_type: self.instance_type.clone(),
            key_pair: self.key_pair.clone(),
            security_groups: self.security_groups.clone(),
        }
    }
}

/// Comma-separated list; trims entries and drops empty ones.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn parse_num<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, BakeError> {
    raw.parse::<T>().map_err(|_| {
        BakeError::InvalidConfig(format!("{}{} is not a valid number: {}", ENV_PREFIX, name, raw))
    })
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, BakeError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(BakeError::InvalidConfig(format!(
            "{}{} is not a valid boolean: {}",
            ENV_PREFIX, name, raw
        ))),
    }
}

/// `0` disables the bound.
fn attempts_limit(n: u32) -> Option<u32> {
    if n == 0 {
        None
    } else {
        Some(n)
    }
}

fn expand_home(path: &str, home: Option<&str>) -> PathBuf {
    match (path.strip_prefix("~/"), home) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}
