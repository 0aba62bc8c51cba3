// deskboot-core/src/host.rs
use deskboot_common::error::Result;
use deskboot_common::host::{CommandOutput, CommandSpec, Host};
use reqwest::Client;

/// The real machine: tokio child processes and an HTTPS client.
pub struct SystemHost {
    client: Client,
}

impl SystemHost {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: deskboot_net::build_http_client()?,
        })
    }
}

impl Host for SystemHost {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
        deskboot_aio::run_command(command).await
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        deskboot_net::fetch_text(&self.client, url).await
    }
}
