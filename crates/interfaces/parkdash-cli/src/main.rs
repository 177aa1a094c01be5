use std::time::Duration;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use parkdash_app_core::NewRecord;
use parkdash_cli::commands::{self, Target};
use parkdash_cli::{default_snapshot_path, parse_uid, CliAckPolicy, CliAction, CliCommand};
use parkdash_config::DEFAULT_HOST;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Controller address, `host[:port]`
    #[arg(long, global = true, env = "PARKDASH_HOST", default_value = DEFAULT_HOST)]
    host: String,
    /// Full WebSocket URL, overrides the one derived from --host
    #[arg(long, global = true, env = "PARKDASH_ENDPOINT")]
    endpoint: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the live dashboard until Ctrl-C
    Watch {
        #[arg(long, env = "PARKDASH_SNAPSHOT")]
        snapshot: Option<Utf8PathBuf>,
        #[arg(long, help = "Keep no local snapshot")]
        ephemeral: bool,
        #[arg(long, value_enum, default_value_t = CliAckPolicy::All)]
        ack: CliAckPolicy,
    },
    /// Send a control command over the WebSocket
    Command {
        #[arg(value_enum)]
        cmd: CliCommand,
        param: Option<u32>,
        #[arg(long, help = "Card uid to track the command as a transaction")]
        uid: Option<String>,
        #[arg(long, value_enum, default_value_t = CliAction::In, requires = "uid")]
        action: CliAction,
        #[arg(long, default_value_t = 10, help = "Seconds to wait for the result")]
        wait: u64,
    },
    /// Park or retrieve a vehicle through the REST endpoint
    Action {
        #[arg(value_enum)]
        action: CliAction,
        uid: String,
        sid: u8,
    },
    /// Inspect the locally saved dashboard state
    Snapshot {
        #[arg(long, env = "PARKDASH_SNAPSHOT")]
        path: Option<Utf8PathBuf>,
        #[command(subcommand)]
        command: SnapshotCommands,
    },
}

#[derive(Subcommand)]
enum SnapshotCommands {
    Show,
    Clear,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let target = Target {
        host: cli.host,
        endpoint: cli.endpoint,
    };

    match cli.command {
        Commands::Watch {
            snapshot,
            ephemeral,
            ack,
        } => {
            let snapshot = if ephemeral {
                None
            } else {
                Some(match snapshot {
                    Some(path) => path,
                    None => default_snapshot_path()?,
                })
            };
            commands::cmd_watch(&target, snapshot, ack).await?;
        }
        Commands::Command {
            cmd,
            param,
            uid,
            action,
            wait,
        } => {
            let track = match uid {
                Some(raw) => {
                    let sid = param
                        .and_then(|p| u8::try_from(p).ok())
                        .ok_or_else(|| anyhow::anyhow!("--uid needs a slot id as parameter"))?;
                    Some(NewRecord::new(parse_uid(&raw)?, action.into(), sid))
                }
                None => None,
            };
            commands::cmd_command(
                &target,
                cmd.into(),
                param,
                track,
                Duration::from_secs(wait),
            )
            .await?;
        }
        Commands::Action { action, uid, sid } => {
            commands::cmd_action(&target.host, parse_uid(&uid)?, action.into(), sid).await?;
        }
        Commands::Snapshot { path, command } => {
            let path = match path {
                Some(path) => path,
                None => default_snapshot_path()?,
            };
            match command {
                SnapshotCommands::Show => {
                    commands::cmd_snapshot_show(path)?;
                }
                SnapshotCommands::Clear => commands::cmd_snapshot_clear(path)?,
            }
        }
    }

    Ok(())
}
