use clap::{Parser, Subcommand};
use nsrun::{CommandId, CommandOutcome, ExtensionConfig, TerminationReason, WriterPaneFactory};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "nsrun", version, about = "Run NativeScript projects on iOS and Android")]
struct Args {
    /// Project root; defaults to the current directory
    #[arg(long, value_name = "DIR")]
    workspace: Option<PathBuf>,

    /// JSON settings file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Build and run the project on iOS
    RunIos,
    /// Build and run the project on Android
    RunAndroid,
    /// Print the extension and CLI versions
    ShowOutput,
}

impl Command {
    fn id(self) -> CommandId {
        match self {
            Command::RunIos => CommandId::RunIos,
            Command::RunAndroid => CommandId::RunAndroid,
            Command::ShowOutput => CommandId::ShowOutputChannel,
        }
    }
}

fn exit_code(reason: &TerminationReason) -> ExitCode {
    match reason {
        TerminationReason::Exited(code) => ExitCode::from(u8::try_from(*code).unwrap_or(1)),
        TerminationReason::Signaled(signal) => {
            ExitCode::from(u8::try_from(128 + *signal).unwrap_or(1))
        }
        TerminationReason::Failed(_) => ExitCode::FAILURE,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    nsrun::init_tracing(args.json_logs)?;

    let config = match &args.config {
        Some(path) => ExtensionConfig::load(path)?,
        None => ExtensionConfig::default(),
    };
    let workspace = args.workspace.or_else(|| std::env::current_dir().ok());

    let panes = Arc::new(WriterPaneFactory::stdout());
    let extension = nsrun::activate(config, workspace, panes).await?;

    let run = match extension.execute(args.command.id()) {
        Ok(CommandOutcome::Started(run)) => run,
        Ok(CommandOutcome::Shown) => return Ok(ExitCode::SUCCESS),
        Err(_) => return Ok(ExitCode::FAILURE),
    };

    let wait = run.wait();
    tokio::pin!(wait);
    let reason = tokio::select! {
        reason = &mut wait => reason,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping run");
            extension.deactivate();
            wait.await
        }
    };

    info!(reason = ?reason, "Run finished");
    extension.deactivate();
    Ok(exit_code(&reason))
}
