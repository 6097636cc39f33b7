use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "famp", version, about = "Run browser automation plugins and workflows")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect and run plugins.
    #[command(subcommand)]
    Plugin(PluginCommand),
    /// Create, edit and run workflows.
    #[command(subcommand)]
    Workflow(WorkflowCommand),
}

#[derive(Subcommand, Debug)]
pub enum PluginCommand {
    List,
    Search(SearchArgs),
    Info(NameArgs),
    /// Check one plugin, or all of them.
    Health(HealthArgs),
    Run(PluginRunArgs),
}

#[derive(Subcommand, Debug)]
pub enum WorkflowCommand {
    Create(CreateArgs),
    AddStep(AddStepArgs),
    List,
    Show(NameArgs),
    Run(WorkflowRunArgs),
    Delete(NameArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct NameArgs {
    pub name: String,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct SearchArgs {
    /// Case-insensitive match on name, description and tags.
    pub query: Option<String>,

    #[arg(long = "category", action = clap::ArgAction::Append)]
    pub categories: Vec<String>,

    #[arg(long = "tag", action = clap::ArgAction::Append)]
    pub tags: Vec<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct HealthArgs {
    pub name: Option<String>,
}

/// Where the session comes from and who it acts for.
#[derive(ClapArgs, Debug, Clone)]
pub struct SessionArgs {
    /// Replay script that stands in for the browser.
    #[arg(long)]
    pub replay: PathBuf,

    /// Account JSON file.
    #[arg(long, conflicts_with_all = ["account_id", "email"])]
    pub account_file: Option<PathBuf>,

    #[arg(long, default_value = "default")]
    pub account_id: String,

    #[arg(long, default_value = "")]
    pub email: String,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PluginRunArgs {
    pub name: String,

    #[command(flatten)]
    pub session: SessionArgs,

    /// Config override (KEY=VALUE, VALUE parsed as JSON when possible).
    /// Can be specified multiple times.
    #[arg(long = "set", action = clap::ArgAction::Append)]
    pub set: Vec<String>,

    /// Run once, ignoring the configured retry policy.
    #[arg(long)]
    pub no_retry: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct CreateArgs {
    pub name: String,

    #[arg(long, default_value = "")]
    pub description: String,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct AddStepArgs {
    pub workflow: String,

    pub plugin: String,

    #[arg(long = "set", action = clap::ArgAction::Append)]
    pub set: Vec<String>,

    /// Run the step only when e.g. `manual_login.logged_in eq true` holds.
    #[arg(long)]
    pub when: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct WorkflowRunArgs {
    pub name: String,

    #[command(flatten)]
    pub session: SessionArgs,

    /// Continue from the persisted cursor instead of starting over.
    #[arg(long)]
    pub resume: bool,
}
