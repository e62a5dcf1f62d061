mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    config::ConfigSubcommand, merge_request::MergeRequestSubcommand, story::StorySubcommand,
    test::TestSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "storyforest",
    about = "Hierarchical user stories with acceptance tests and INVEST quality gates",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .storyforest/)
    #[arg(long, global = true, env = "STORYFOREST_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Override hierarchy.depth_limit from config.yaml
    #[arg(long, global = true, env = "STORY_DEPTH_LIMIT")]
    depth_limit: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a story forest in the current project
    Init {
        /// Project name (default: directory name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Manage merge-request roots
    #[command(name = "mr")]
    MergeRequest {
        #[command(subcommand)]
        subcommand: MergeRequestSubcommand,
    },

    /// Manage stories
    Story {
        #[command(subcommand)]
        subcommand: StorySubcommand,
    },

    /// Manage acceptance tests
    Test {
        #[command(subcommand)]
        subcommand: TestSubcommand,
    },

    /// Run the quality analysis for a story
    Analyze { story_id: String },

    /// Inspect and validate the project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let ctx = cmd::Context {
        root: &root,
        json: cli.json,
        depth_limit: cli.depth_limit,
    };

    let result = match cli.command {
        Commands::Init { name } => cmd::init::run(&root, name.as_deref()),
        Commands::MergeRequest { subcommand } => cmd::merge_request::run(&ctx, subcommand),
        Commands::Story { subcommand } => cmd::story::run(&ctx, subcommand),
        Commands::Test { subcommand } => cmd::test::run(&ctx, subcommand),
        Commands::Analyze { story_id } => cmd::analyze::run(&ctx, &story_id),
        Commands::Config { subcommand } => cmd::config::run(&ctx, subcommand),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
