use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use trellis::Trellis;
use trellis::config::TrellisConfig;
use trellis::models::{Priority, TicketStatus};

mod cmd;

#[derive(Parser)]
#[command(name = "trellis")]
#[command(version, about = "Terminal client for the Trellis ticket tracker")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to trellis.toml (defaults to the user config directory)
    #[arg(long, global = true, env = "TRELLIS_CONFIG")]
    pub config: Option<PathBuf>,

    /// REST base URL. Overrides TRELLIS_API_URL and trellis.toml.
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Realtime WebSocket URL. Derived from the API URL when unset.
    #[arg(long, global = true)]
    pub ws_url: Option<String>,

    /// File holding the bearer token
    #[arg(long, global = true)]
    pub token_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in and store the access token
    Login {
        #[arg(long)]
        email: Option<String>,
        /// Prompted for when omitted
        #[arg(long, env = "TRELLIS_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Create an account and log in
    Register {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long, env = "TRELLIS_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Forget the stored access token
    Logout,
    /// Show the logged-in user
    Whoami,
    /// View or edit your profile
    Profile {
        #[command(subcommand)]
        command: Option<ProfileCommands>,
    },
    /// Reset a forgotten password
    ResetPassword {
        #[command(subcommand)]
        command: ResetCommands,
    },
    /// List and manage projects
    Projects {
        #[command(subcommand)]
        command: Option<ProjectCommands>,
    },
    /// Show the boards of a project
    Boards { project: i64 },
    /// List and manage tickets
    Tickets {
        #[command(subcommand)]
        command: TicketCommands,
    },
    /// Comment on a ticket
    Comment { ticket: i64, content: String },
    /// Invite someone to a project by email
    Invite { project: i64, email: String },
    /// Accept a project invitation
    Accept { token: String },
    /// Show a project board and keep it updated live
    Watch {
        project: i64,
        /// Board id (defaults to the project's first board)
        #[arg(long)]
        board: Option<i64>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ProfileCommands {
    Show,
    Update {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ResetCommands {
    /// Ask for a reset token
    Request { email: String },
    /// Set a new password using a reset token
    Confirm {
        token: String,
        #[arg(long, env = "TRELLIS_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ProjectCommands {
    List,
    Show {
        id: i64,
    },
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Show project settings
    Settings {
        id: i64,
    },
    /// Update project settings
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
}

#[derive(Subcommand, Clone)]
pub enum TicketCommands {
    List {
        #[arg(long)]
        project: Option<i64>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        status: Option<TicketStatus>,
        #[arg(long)]
        priority: Option<Priority>,
        #[arg(long)]
        owner: Option<i64>,
    },
    Show {
        id: i64,
    },
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        column: i64,
    },
    Update {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        status: Option<TicketStatus>,
        #[arg(long)]
        priority: Option<Priority>,
        #[arg(long)]
        owner: Option<i64>,
        #[arg(long)]
        column: Option<i64>,
    },
    Delete {
        id: i64,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    History {
        id: i64,
    },
    /// Five most recently updated tickets
    Recent,
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the resolved configuration
    Show,
    /// Write a default trellis.toml
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Check trellis.toml for problems
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    trellis::config::load_dotenv();

    let config = TrellisConfig::new(cli.config.clone())?.with_cli_args(
        cli.api_url.clone(),
        cli.ws_url.clone(),
        cli.token_path.clone(),
        cli.verbose,
    );
    let _log_guard = trellis::logging::init(
        &config.log_filter(),
        config.toml.logging.format,
        config.toml.logging.file.as_deref(),
    )?;

    if let Commands::Config { command } = &cli.command {
        return cmd::cmd_config(&config, command.clone());
    }

    let app = Trellis::from_config(&config)?
        .build()
        .context("Failed to initialise client")?;

    let result = match &cli.command {
        Commands::Login { email, password } => {
            cmd::cmd_login(&app, email.clone(), password.clone()).await
        }
        Commands::Register {
            username,
            email,
            password,
        } => cmd::cmd_register(&app, username.clone(), email.clone(), password.clone()).await,
        Commands::Logout => cmd::cmd_logout(&app),
        Commands::Whoami => cmd::cmd_whoami(&app).await,
        Commands::Profile { command } => cmd::cmd_profile(&app, command.clone()).await,
        Commands::ResetPassword { command } => cmd::cmd_reset_password(&app, command.clone()).await,
        Commands::Projects { command } => cmd::cmd_projects(&app, command.clone()).await,
        Commands::Boards { project } => cmd::cmd_boards(&app, *project).await,
        Commands::Tickets { command } => cmd::cmd_tickets(&app, command.clone()).await,
        Commands::Comment { ticket, content } => cmd::cmd_comment(&app, *ticket, content).await,
        Commands::Invite { project, email } => cmd::cmd_invite(&app, *project, email).await,
        Commands::Accept { token } => cmd::cmd_accept(&app, token).await,
        Commands::Watch { project, board } => cmd::cmd_watch(&app, *project, *board).await,
        Commands::Config { .. } => Ok(()),
    };

    app.shutdown();
    result
}
