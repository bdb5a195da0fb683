use core::panic;
use std::{fs, path::PathBuf, time::Duration};

use crate::error::Result;
pub use clap::Parser;
use url::Url;

#[derive(Debug, Clone, clap::Parser)]
pub struct ServerConfig {
    #[arg(
        short,
        long,
        default_value_t = 3000,
        env = "GRIMOIRE_LISTEN_PORT",
        help = "Port to listen on"
    )]
    pub port: u16,

    #[arg(
        short,
        long,
        default_value = "127.0.0.1",
        env = "GRIMOIRE_LISTEN_ADDRESS",
        help = "Address to listen on"
    )]
    pub listen_address: String,

    #[arg(
        long,
        env = "GRIMOIRE_BASE_URL",
        default_value = "http://localhost:3000",
        help = "Base URL of the server, as visible to users"
    )]
    pub base_url: Url,

    #[arg(
        long,
        env = "GRIMOIRE_DATABASE_URL",
        help = "Database URL e.g. sqlite://file.db, default is sqlite://[data-dir]/grimoire.db, where data-dir is set by --data-dir"
    )]
    database_url: Option<String>,

    #[arg(
        long,
        env = "GRIMOIRE_DATA_DIR",
        help = "Data directory (cover files, database, secret etc.), default is system default like ~/.local/share/grimoire",
        default_value_t = default_data_dir()
    )]
    data_dir: String,

    #[arg(
        long,
        env = "GRIMOIRE_FILES_DIR",
        help = "Directory for stored files, default data_dir/files"
    )]
    files_dir: Option<PathBuf>,

    #[arg(
        long,
        env = "GRIMOIRE_TOKEN_VALIDITY",
        default_value = "1 day",
        help = "Default token validity in human friendly format (e.g. 1d, 1h, 1m, 1s - or combined)",
        value_parser = humantime::parse_duration
    )]
    pub token_validity: Duration,

    #[arg(
        long,
        env = "GRIMOIRE_UPLOAD_LIMIT_MB",
        default_value = "50",
        help = "Maximum upload size in MB"
    )]
    pub upload_limit_mb: usize,

    #[arg(
        long,
        env = "GRIMOIRE_TOP_RATED_LIMIT",
        default_value = "3",
        help = "Number of books returned by the best rating listing"
    )]
    pub top_rated_limit: u32,

    #[arg(long, env = "GRIMOIRE_NO_CORS", help = "Disable CORS")]
    pub no_cors: bool,
}

fn default_data_dir() -> String {
    let dir = dirs::data_dir()
        .map(|p| p.join("grimoire"))
        .unwrap_or_else(|| PathBuf::from("grimoire"));

    if !fs::exists(&dir).expect("Failed to check if data directory exists") {
        fs::create_dir_all(&dir).expect("Failed to create data directory");
    } else if !dir.is_dir() {
        panic!("Data directory is not a directory",)
    }

    dir.to_string_lossy().to_string()
}

impl ServerConfig {
    pub fn load() -> Result<Self> {
        ServerConfig::try_parse().map_err(|e| e.into())
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    pub fn files_dir(&self) -> PathBuf {
        self.files_dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join("files"))
    }

    pub fn database_url(&self) -> String {
        self.database_url
            .clone()
            .unwrap_or_else(|| format!("sqlite://{}/grimoire.db?mode=rwc", self.data_dir))
    }
}
