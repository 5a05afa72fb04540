pub mod scan;
pub mod version;

use anyhow::{Context, Result};
use clap::Args;

use msav_client::Antivirus;
use msav_core::AntivirusConfig;

/// Daemon connection options shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectArgs {
    /// Daemon socket (local socket path or host:port); overrides
    /// `clamav_socket` from ~/.msav/config.yaml.
    #[arg(long, value_name = "SOCKET")]
    pub socket: Option<String>,
}

impl ConnectArgs {
    pub fn connect(&self) -> Result<Antivirus> {
        let config = AntivirusConfig::load()
            .context("failed to load ~/.msav/config.yaml")?
            .with_socket_override(self.socket.clone());
        Antivirus::from_config(&config).context("invalid daemon socket configuration")
    }
}
