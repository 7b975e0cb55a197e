//! Server configuration from command-line flags, environment and `.env`.

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::store::ServiceAccount;
use crate::store::drive::DriveSettings;

/// Parent folder new remote documents are created in.
pub const DEFAULT_DRIVE_FOLDER_ID: &str = "1T1Bp2Db9jiVmj19ngOfIWrm-DnuUxWyB";
pub const DEFAULT_DRIVE_FILE_NAME: &str = "app.json";
pub const DEFAULT_DATA_FILE: &str = "public/app.json";

/// Store the server-side workbook session edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    Local,
    Drive,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "tabsheet", about = "Tabbed table editor backed by a single JSON document")]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "TABSHEET_BIND", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    /// JSON file used by the local backend
    #[arg(long, env = "TABSHEET_DATA_FILE", default_value = DEFAULT_DATA_FILE)]
    pub data_file: PathBuf,

    /// Backend for the workbook session
    #[arg(long, env = "TABSHEET_BACKEND", value_enum, default_value_t = Backend::Local)]
    pub backend: Backend,

    /// Save after every row, column or tab change
    #[arg(long, env = "TABSHEET_AUTOSAVE")]
    pub autosave: bool,

    /// Service-account email for Drive access
    #[arg(long, env = "GOOGLE_CLIENT_EMAIL")]
    pub google_client_email: Option<String>,

    /// Service-account private key, PEM with newlines escaped as `\n`
    #[arg(long, env = "GOOGLE_PRIVATE_KEY", hide_env_values = true)]
    pub google_private_key: Option<String>,

    #[arg(long, env = "GOOGLE_DRIVE_FOLDER_ID", default_value = DEFAULT_DRIVE_FOLDER_ID)]
    pub drive_folder_id: String,

    #[arg(long, env = "GOOGLE_DRIVE_FILE_NAME", default_value = DEFAULT_DRIVE_FILE_NAME)]
    pub drive_file_name: String,

    /// Timeout for each remote call, in seconds
    #[arg(long, env = "TABSHEET_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,
}

impl Config {
    /// Parse flags after loading a `.env` file from the working directory, if present.
    pub fn load() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            log::debug!("Loaded environment from {}", path.display());
        }
        Config::parse()
    }

    /// Drive credentials, when both halves are configured.
    pub fn service_account(&self) -> Option<ServiceAccount> {
        match (&self.google_client_email, &self.google_private_key) {
            (Some(email), Some(key)) if !email.is_empty() && !key.is_empty() => {
                Some(ServiceAccount::from_escaped(email.clone(), key))
            }
            _ => None,
        }
    }

    pub fn drive_settings(&self) -> DriveSettings {
        DriveSettings {
            file_name: self.drive_file_name.clone(),
            parent_folder: self.drive_folder_id.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}
