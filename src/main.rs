use clap::{Parser, Subcommand};
use envspec::config::Config;
use envspec::environments::{DeprecationNotice, EnvironmentSchema};
use envspec::external::k8s::models::LogTarget;
use envspec::external::k8s::services::{get_client, PodLogs};
use envspec::Result;
use futures::StreamExt;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "envspec")]
#[command(about = "Validate pod environment specs and read pod logs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate an environment file (JSON or YAML) and print its canonical form.
    Validate { file: String },
    /// Print the output of a pod's job container.
    Logs {
        pod: String,

        #[arg(long)]
        container: Option<String>,

        #[arg(long)]
        namespace: Option<String>,

        #[arg(short, long)]
        follow: bool,
    },
}

/// Summary of deprecated fields on stderr, so stdout stays valid JSON.
fn print_notices(notices: &[DeprecationNotice]) {
    if notices.is_empty() {
        return;
    }
    eprintln!("{} deprecated field(s) found:", notices.len());
    for notice in notices {
        eprintln!("  - {}", notice);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Validate { file } => {
            let input = tokio::fs::read_to_string(&file).await?;
            let schema = EnvironmentSchema::new(config.schema_options());
            let is_yaml = matches!(
                Path::new(&file).extension().and_then(|ext| ext.to_str()),
                Some("yaml" | "yml")
            );

            let mut notices: Vec<DeprecationNotice> = Vec::new();
            let environment = if is_yaml {
                schema.from_yaml(&input, &mut notices)
            } else {
                schema.from_json(&input, &mut notices)
            };
            print_notices(&notices);

            let environment = environment?;
            println!("{}", serde_json::to_string_pretty(&environment)?);
        }
        Commands::Logs {
            pod,
            container,
            namespace,
            follow,
        } => {
            let target = LogTarget::new(
                pod,
                container.unwrap_or_else(|| config.container_name_job.clone()),
                namespace.unwrap_or_else(|| config.kube_namespace.clone()),
            )?;
            let logs = PodLogs::new(get_client(&config).await?, target);

            if follow {
                let cancel = CancellationToken::new();
                let on_interrupt = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        info!("Interrupted, stopping log stream");
                        on_interrupt.cancel();
                    }
                });

                let mut lines = logs.stream_logs(cancel).await?;
                while let Some(line) = lines.next().await {
                    println!("{}", line?);
                }
            } else {
                for line in logs.fetch_logs().await? {
                    println!("{}", line);
                }
            }
        }
    }

    Ok(())
}
