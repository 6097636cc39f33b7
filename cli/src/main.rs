use std::sync::Arc;

use clap::Parser;
use famp_cli::commands::cli::{self, Commands, PluginCommand, WorkflowCommand};
use famp_cli::commands::{plugin, workflow};
use famp_core::api::{self as core_api, CliError, WorkflowError};
use famp_plugins::BuiltinPluginLoader;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("{e}");
            exit_code_for_error(&e)
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<(), CliError> {
    let args = cli::Args::parse();
    let cfg = core_api::load_default().map_err(|e| CliError::Config(format!("{e:#}")))?;
    init_tracing(&cfg.logging).map_err(CliError::Config)?;

    let mut ctx = core_api::AppContext::new(cfg, Some(Arc::new(BuiltinPluginLoader)))?;
    let result = dispatch(args.command, &mut ctx, args.json).await;
    ctx.cleanup();
    result
}

fn exit_code_for_error(e: &CliError) -> i32 {
    // 0: success
    // 11: config error
    // 20: I/O, storage, or a rejected workflow/plugin command
    // 30: workflow step failed (resumable)
    // 31: workflow cancelled (resumable)
    // 40: plugin run failed
    // 50: internal/uncategorized
    match e {
        CliError::Config(_) => 11,
        CliError::Workflow(we) => match we {
            WorkflowError::StepFailed { .. } => 30,
            WorkflowError::Cancelled { .. } => 31,
            WorkflowError::NotFound(_)
            | WorkflowError::AlreadyExists(_)
            | WorkflowError::InvalidName(_)
            | WorkflowError::InvalidResume { .. }
            | WorkflowError::Storage(_) => 20,
        },
        CliError::Plugin(pe) => match pe.kind {
            core_api::ErrorKind::Config => 11,
            _ => 40,
        },
        CliError::Io(_) => 20,
        CliError::Command(_) => 20,
        CliError::Anyhow(_) => 50,
    }
}

async fn dispatch(
    cmd: Commands,
    ctx: &mut core_api::AppContext,
    json: bool,
) -> Result<(), CliError> {
    match cmd {
        Commands::Plugin(cmd) => match cmd {
            PluginCommand::List => plugin::handle_list(ctx, json),
            PluginCommand::Search(args) => plugin::handle_search(args, ctx, json),
            PluginCommand::Info(args) => plugin::handle_info(args, ctx, json),
            PluginCommand::Health(args) => plugin::handle_health(args, ctx, json).await,
            PluginCommand::Run(args) => plugin::handle_run(args, ctx, json).await,
        },
        Commands::Workflow(cmd) => match cmd {
            WorkflowCommand::Create(args) => workflow::handle_create(args, ctx, json),
            WorkflowCommand::AddStep(args) => workflow::handle_add_step(args, ctx, json),
            WorkflowCommand::List => workflow::handle_list(ctx, json),
            WorkflowCommand::Show(args) => workflow::handle_show(args, ctx, json),
            WorkflowCommand::Run(args) => workflow::handle_run(args, ctx, json).await,
            WorkflowCommand::Delete(args) => workflow::handle_delete(args, ctx, json),
        },
    }
}

fn init_tracing(logging: &core_api::LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => std::path::PathBuf::from(d),
            None => std::env::temp_dir().join("famp"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("famp.{}.log", chrono::Local::now().format("%Y%m%d"));
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
