pub mod config;
pub mod configurator;
pub mod imager;
pub mod logger;
pub mod polling;
pub mod provider_manager;
pub mod provisioner;
pub mod remote;
pub mod state_machine;
pub mod workflow;

pub use config::BakeConfig;
