use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "yatube", about = "A small blogging platform")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the web server (default)
    Serve,

    /// Create a post group
    CreateGroup {
        #[arg(long)]
        title: String,
        #[arg(long)]
        slug: String,
        #[arg(long, default_value = "")]
        description: String,
    },

    /// Delete a group; its posts are kept without a group
    DeleteGroup {
        #[arg(long)]
        slug: String,
    },

    /// Delete a user together with their posts, comments and subscriptions
    DeleteUser {
        #[arg(long)]
        username: String,
    },
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub feed: FeedConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub path: Option<PathBuf>,
    pub max_upload_bytes: usize,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub cookie_name: String,
    pub session_hours: u64,
    pub bcrypt_cost: u32,
}

/// What to serve when a page number is past the last page.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutOfRange {
    #[default]
    NotFound,
    Empty,
    Clamp,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct FeedConfig {
    pub page_size: u32,
    /// Lifetime of cached index pages; 0 disables the cache.
    pub index_cache_secs: u64,
    pub out_of_range: OutOfRange,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_upload_bytes: 5 * 1024 * 1024,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookie_name: "yatube_session".to_string(),
            session_hours: 336,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            index_cache_secs: 20,
            out_of_range: OutOfRange::NotFound,
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(ref host) = cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }

        if config.feed.page_size == 0 {
            anyhow::bail!("feed.page_size must be at least 1");
        }

        // Resolve paths relative to data dir
        if config.database.path.is_none() {
            config.database.path = Some(data_dir.join("yatube.db"));
        }
        if config.storage.path.is_none() {
            config.storage.path = Some(data_dir.join("media"));
        }

        Ok(config)
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".yatube")
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("yatube.db"))
    }

    pub fn uploads_path(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("media"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_with_dir(dir: &std::path::Path) -> Cli {
        Cli {
            config: None,
            host: None,
            port: None,
            data_dir: Some(dir.to_path_buf()),
            command: None,
        }
    }

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.auth.cookie_name, "yatube_session");
        assert_eq!(config.feed.page_size, 10);
        assert_eq!(config.feed.index_cache_secs, 20);
        assert_eq!(config.feed.out_of_range, OutOfRange::NotFound);
        assert!(config.database.path.is_none());
        assert!(config.storage.path.is_none());
    }

    #[test]
    fn data_dir_defaults_to_home_dot_yatube() {
        let cli = Cli {
            config: None,
            host: None,
            port: None,
            data_dir: None,
            command: None,
        };
        assert!(Config::data_dir(&cli).ends_with(".yatube"));
    }

    #[test]
    fn load_with_no_config_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load(&cli_with_dir(tmp.path())).unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.db_path(), tmp.path().join("yatube.db"));
        assert_eq!(config.uploads_path(), tmp.path().join("media"));
    }

    #[test]
    fn load_reads_feed_section() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[feed]
page_size = 5
index_cache_secs = 0
out_of_range = "clamp"
"#,
        )
        .unwrap();

        let mut cli = cli_with_dir(tmp.path());
        cli.config = Some(config_path);
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.feed.page_size, 5);
        assert_eq!(config.feed.index_cache_secs, 0);
        assert_eq!(config.feed.out_of_range, OutOfRange::Clamp);
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(&config_path, "[feed]\npage_size = 0\n").unwrap();

        let mut cli = cli_with_dir(tmp.path());
        cli.config = Some(config_path);
        assert!(Config::load(&cli).is_err());
    }

    #[test]
    fn cli_overrides_beat_toml_values() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[server]
host = "192.168.1.1"
port = 9000
"#,
        )
        .unwrap();

        let cli = Cli {
            config: Some(config_path),
            host: Some("10.0.0.1".to_string()),
            port: Some(4000),
            data_dir: Some(tmp.path().to_path_buf()),
            command: None,
        };
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.server.host, "10.0.0.1");
        assert_eq!(config.server.port, 4000);
    }

    #[test]
    fn parses_admin_subcommand() {
        let cli = Cli::parse_from([
            "yatube",
            "create-group",
            "--title",
            "Cats",
            "--slug",
            "cats",
        ]);
        assert_eq!(
            cli.command,
            Some(Command::CreateGroup {
                title: "Cats".into(),
                slug: "cats".into(),
                description: String::new(),
            })
        );
    }
}
