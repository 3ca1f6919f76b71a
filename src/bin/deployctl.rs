//! `deployctl`: operator CLI for the deployment API.
//!
//! ```text
//! deployctl deploy --host 203.0.113.7 --username root --domain example.com
//! deployctl setup-nginx --host 203.0.113.7 --username root --domain example.com
//! deployctl status
//! deployctl history
//! ```
//!
//! Streaming commands render the live progress panel and exit non-zero when
//! the run does not end with a success event.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use deployer::client::api::DEFAULT_DEPLOYER_URL;
use deployer::client::progress;
use deployer::client::{
    follow, format_duration, recent_history, DeployApiClient, DeploymentPanel, PanelLine,
    PanelOutcome,
};
use deployer::forms::{ConnectionTestForm, DeployForm, NginxSetupForm};

#[derive(Parser, Debug)]
#[command(
    name = "deployctl",
    version,
    about = "Drive VPS deployments through the deployer API"
)]
struct Cli {
    /// Deployer base URL
    #[arg(long, global = true, env = "DEPLOYER_URL", default_value = DEFAULT_DEPLOYER_URL)]
    url: String,
    /// Admin token sent as a bearer credential
    #[arg(long, global = true, env = "DEPLOYER_TOKEN", hide_env_values = true, default_value = "")]
    token: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct TargetArgs {
    /// VPS address
    #[arg(long)]
    host: String,
    /// SSH user
    #[arg(long)]
    username: String,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build, ship and start the application, then set up nginx and TLS
    Deploy {
        #[command(flatten)]
        target: TargetArgs,
        /// Public domain served by nginx
        #[arg(long)]
        domain: String,
        /// Remote directory (server default when omitted)
        #[arg(long, value_name = "PATH")]
        deploy_path: Option<String>,
    },
    /// Install nginx and request a certificate only
    #[command(name = "setup-nginx")]
    SetupNginx {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long)]
        domain: String,
    },
    /// Show whether a run is in progress
    Status,
    /// Clear a stuck in-progress flag
    Reset,
    /// Check SSH connectivity to a VPS
    Test {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Show recent deployments
    History {
        /// Show every entry instead of the latest five
        #[arg(long)]
        all: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(dispatch(cli))
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let client = DeployApiClient::new(&cli.url, &cli.token)?;

    match cli.command {
        Commands::Deploy {
            target,
            domain,
            deploy_path,
        } => {
            let form = DeployForm {
                host: Some(target.host),
                username: Some(target.username),
                deploy_path,
                domain: Some(domain),
            };
            let stream = client.start_deploy(&form).await?;
            watch(stream).await
        }
        Commands::SetupNginx { target, domain } => {
            let form = NginxSetupForm {
                host: Some(target.host),
                username: Some(target.username),
                domain: Some(domain),
            };
            let stream = client.setup_nginx(&form).await?;
            watch(stream).await
        }
        Commands::Status => {
            let status = client.status().await?;
            if status.in_progress {
                println!("Deployment in progress");
            } else {
                println!("Idle");
            }
            Ok(())
        }
        Commands::Reset => {
            let reset = client.reset().await?;
            println!("{}", reset.message);
            Ok(())
        }
        Commands::Test { target } => {
            let form = ConnectionTestForm {
                host: Some(target.host),
                username: Some(target.username),
            };
            let result = client.test_connection(&form).await?;
            println!("{}", result.message);
            Ok(())
        }
        Commands::History { all } => {
            let entries = client.history().await?;
            let shown = if all { &entries[..] } else { recent_history(&entries) };
            if shown.is_empty() {
                println!("No deployments yet");
            }
            for entry in shown {
                let duration = entry
                    .duration
                    .map(|secs| format_duration(secs.max(0) as u64))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{} {:<12} {:<8} {} {}",
                    progress::status_icon(entry.status),
                    entry.kind.as_str(),
                    entry.status.as_str(),
                    entry.start_time.format("%Y-%m-%d %H:%M:%S"),
                    duration,
                );
            }
            Ok(())
        }
    }
}

async fn watch(stream: deployer::client::api::ByteStream) -> anyhow::Result<()> {
    let pb = progress::deploy_bar();
    let mut panel = DeploymentPanel::new();

    let outcome = follow(stream, &mut panel, |line: &PanelLine, percentage| {
        if pb.is_hidden() {
            println!("{}", line.text);
        } else {
            progress::render_line(&pb, line, percentage);
        }
    })
    .await;

    let elapsed = format_duration(panel.elapsed().as_secs());
    progress::finish(&pb, outcome, &elapsed);
    match outcome {
        PanelOutcome::Succeeded => {
            println!("Finished in {}", elapsed);
            Ok(())
        }
        PanelOutcome::Failed => {
            let reason = panel
                .last_error()
                .unwrap_or("stream closed before the run reported an outcome")
                .to_string();
            anyhow::bail!("Deployment failed after {}: {}", elapsed, reason)
        }
    }
}
