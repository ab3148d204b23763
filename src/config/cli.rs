use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the blogroll binary.
#[derive(Debug, Parser)]
#[command(name = "blogroll", version, about = "Blogroll social blogging server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "BLOGROLL_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP server.
    Serve(Box<ServeArgs>),
    /// Manage user accounts.
    Users(UsersArgs),
    /// Manage post groups.
    Groups(GroupsArgs),
    /// Session maintenance.
    Sessions(SessionsArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the uploads directory.
    #[arg(long = "uploads-directory", value_name = "PATH")]
    pub uploads_directory: Option<PathBuf>,

    /// Override the maximum request size for post forms in bytes.
    #[arg(long = "uploads-max-request-bytes", value_name = "BYTES")]
    pub uploads_max_request_bytes: Option<u64>,

    /// Override how long the index fragment stays cached.
    #[arg(long = "cache-index-ttl-seconds", value_name = "SECONDS")]
    pub cache_index_ttl_seconds: Option<u64>,

    /// Toggle the fragment cache.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,
}

#[derive(Debug, Args, Clone)]
pub struct UsersArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    #[command(subcommand)]
    pub command: UsersCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum UsersCommand {
    /// Create an account.
    Create {
        #[arg(long)]
        username: String,
        /// Password for the new account.
        #[arg(long, env = "BLOGROLL_USER_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Delete an account with everything it wrote.
    Delete {
        #[arg(long)]
        username: String,
    },
}

#[derive(Debug, Args, Clone)]
pub struct GroupsArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    #[command(subcommand)]
    pub command: GroupsCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum GroupsCommand {
    /// Create a group; the slug defaults to one derived from the title.
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        slug: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a group. Its posts are kept without a group.
    Delete {
        #[arg(long)]
        slug: String,
    },
    /// Print every group.
    List,
}

#[derive(Debug, Args, Clone)]
pub struct SessionsArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    #[command(subcommand)]
    pub command: SessionsCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum SessionsCommand {
    /// Delete expired sessions.
    Purge,
}
