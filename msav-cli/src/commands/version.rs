//! `msav version`: engine and signature database of the daemon.

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;

use super::ConnectArgs;

/// Arguments for `msav version`.
#[derive(Args, Debug)]
pub struct VersionArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct VersionJson<'a> {
    engine_name: &'a str,
    engine: &'a str,
    database: &'a str,
}

impl VersionArgs {
    pub fn run(self) -> Result<()> {
        let mut av = self.connect.connect()?;
        let version = av.version();
        av.end_session();

        let Some(version) = version else {
            bail!("{} engine not available.", av.engine_name());
        };

        if self.json {
            let payload = VersionJson {
                engine_name: av.engine_name(),
                engine: &version.engine,
                database: &version.database,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize version JSON")?
            );
            return Ok(());
        }

        println!("    Detection engine     : {}", version.engine);
        println!("    Database revision    : {}", version.database);
        Ok(())
    }
}
