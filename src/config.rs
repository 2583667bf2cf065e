use anyhow::{Context, Result};
use clap::Parser;
use std::{env, path::PathBuf, str::FromStr};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub staging_dir: PathBuf,
    /// Restrict thumbnailing to keys under this prefix (e.g. `gallery/`).
    pub scope_prefix: Option<String>,
    pub uploads_per_minute: u32,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Gallery upload store with thumbnail generation")]
pub struct Args {
    /// Host to bind to (overrides THUMBNAILER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides THUMBNAILER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where objects are stored (overrides THUMBNAILER_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides THUMBNAILER_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Scratch directory for staged files (overrides THUMBNAILER_STAGING_DIR)
    #[arg(long)]
    pub staging_dir: Option<PathBuf>,

    /// Only thumbnail keys under this prefix (overrides THUMBNAILER_SCOPE_PREFIX)
    #[arg(long)]
    pub scope_prefix: Option<String>,

    /// Uploads allowed per client per minute (overrides THUMBNAILER_UPLOADS_PER_MINUTE)
    #[arg(long)]
    pub uploads_per_minute: Option<u32>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::resolve(args, |name| env::var(name))?;
        Ok((cfg, migrate))
    }

    /// Merge `args` over the variables visible through `lookup`. CLI wins.
    fn resolve<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let text = |name: &str, default: &str| lookup(name).unwrap_or_else(|_| default.into());

        let env_host = text("THUMBNAILER_HOST", "0.0.0.0");
        let env_port = parse_var(&lookup, "THUMBNAILER_PORT", 3000)?;
        let env_storage = text("THUMBNAILER_STORAGE_DIR", "./data/objects");
        let env_db = text(
            "THUMBNAILER_DATABASE_URL",
            "sqlite://./data/meta/gallery.db",
        );
        let env_staging = lookup("THUMBNAILER_STAGING_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| env::temp_dir().join("thumbnailer"));
        let env_scope = lookup("THUMBNAILER_SCOPE_PREFIX").ok();
        let env_rate = parse_var(&lookup, "THUMBNAILER_UPLOADS_PER_MINUTE", 30)?;

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            staging_dir: args.staging_dir.unwrap_or(env_staging),
            scope_prefix: args.scope_prefix.or(env_scope).filter(|p| !p.is_empty()),
            uploads_per_minute: args.uploads_per_minute.unwrap_or(env_rate),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Result<String, env::VarError>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
