//! Config command handler.

use super::print_json;
use clap::{Args, Subcommand};
use pulse_core::{AppConfig, AppResult, TenantDirectory};

/// Configuration inspection
#[derive(Args, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration (secrets omitted)
    Show(ConfigShowCommand),
}

/// Print the effective configuration
#[derive(Args, Debug)]
pub struct ConfigShowCommand {
    /// Print the resolved configuration of one organization instead
    #[arg(long)]
    pub tenant: Option<String>,
}

impl ConfigShowCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        match self.tenant {
            Some(ref organization_id) => {
                let tenant = TenantDirectory::from_config(config).get(organization_id);
                print_json(&tenant)
            }
            None => print_json(config),
        }
    }
}

impl ConfigCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        match &self.action {
            ConfigAction::Show(cmd) => cmd.execute(config),
        }
    }
}
