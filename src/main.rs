use clap::{Args, Parser, Subcommand};
use release_rail::commands::{self, RepoArgs};
use release_rail::core::config::{DEFAULT_CONFIG_FILE, DEFAULT_MANIFEST_FILE};
use release_rail::core::error::{ReleaseError, print_error};
use release_rail::core::logging;
use std::path::PathBuf;

/// Plan releases for multi-component repositories from their commit history
#[derive(Parser)]
#[command(name = "release-rail")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(styles = get_styles())]
struct Cli {
  #[command(flatten)]
  global: GlobalArgs,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
  /// Increase log verbosity (-v info, -vv debug, -vvv trace)
  #[arg(short, long, action = clap::ArgAction::Count, global = true)]
  verbose: u8,

  /// Emit logs as JSON lines
  #[arg(long, global = true)]
  log_json: bool,

  /// Path to the repository checkout
  #[arg(long, default_value = ".", global = true)]
  repo: PathBuf,

  /// Branch releases are cut from (defaults to the checked out branch)
  #[arg(long, global = true)]
  target_branch: Option<String>,

  /// Release config file, relative to the repository root
  #[arg(long, default_value = DEFAULT_CONFIG_FILE, global = true)]
  config_file: String,

  /// Versions manifest file, relative to the repository root
  #[arg(long, default_value = DEFAULT_MANIFEST_FILE, global = true)]
  manifest_file: String,
}

#[derive(Subcommand)]
enum Commands {
  /// Show the release pull requests the next run would open (dry run)
  Plan {
    /// One pull request per component instead of a combined one
    #[arg(long)]
    separate_pull_requests: bool,
    /// Output the plan in JSON format
    #[arg(long)]
    json: bool,
  },

  /// Show the last released version of every configured path
  Versions {
    /// Output versions in JSON format
    #[arg(long)]
    json: bool,
  },

  /// Show the update order of the local cargo workspace
  Graph {
    /// Crates whose dependents should be ordered (default: all members)
    packages: Vec<String>,
    /// Output the order in JSON format
    #[arg(long)]
    json: bool,
  },
}

fn get_styles() -> clap::builder::Styles {
  clap::builder::Styles::styled()
    .usage(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
    .header(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
    .literal(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))))
    .invalid(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
    )
    .error(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
    )
    .valid(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
    )
    .placeholder(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))))
}

#[tokio::main]
async fn main() {
  let cli = Cli::parse();
  logging::init(cli.global.verbose, cli.global.log_json);

  let args = RepoArgs {
    repo: cli.global.repo,
    target_branch: cli.global.target_branch,
    config_file: cli.global.config_file,
    manifest_file: cli.global.manifest_file,
  };

  let result = match cli.command {
    Commands::Plan {
      separate_pull_requests,
      json,
    } => commands::run_plan(&args, separate_pull_requests, json).await,
    Commands::Versions { json } => commands::run_versions(&args, json).await,
    Commands::Graph { packages, json } => commands::run_graph(&args, packages, json).await,
  };

  if let Err(err) = result {
    handle_error(err);
  }
}

fn handle_error(err: ReleaseError) -> ! {
  print_error(&err);
  std::process::exit(err.exit_code().as_i32());
}
