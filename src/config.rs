use std::env;
use std::path::PathBuf;

/// Signing secret used when `AUTH_ENCRYPTION_KEY` is not set.
pub const FALLBACK_SECRET: &str = "0123456789abcdef0123456789abcdef";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,

    // Storage
    pub data_dir: PathBuf,
    pub database_max_connections: u32,
    pub database_busy_timeout_secs: u64,

    // Sessions
    pub jwt_secret: String,
    pub cookie_secure: bool,

    // Disables the access gate and runs every request as the operator (id 0)
    pub no_auth_for_user_zero: bool,

    pub cors_allow_origin: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,

            data_dir: PathBuf::from("./data"),
            database_max_connections: 5,
            database_busy_timeout_secs: 5,

            jwt_secret: FALLBACK_SECRET.to_string(),
            cookie_secure: false,

            no_auth_for_user_zero: false,

            cors_allow_origin: "*".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();

        let mut config = Config::default();

        if let Ok(host) = env::var("HOST") {
            config.host = host;
        }

        if let Ok(port) = env::var("PORT") {
            config.port = port.parse().map_err(|e| format!("Invalid port: {}", e))?;
        }

        if let Ok(data_dir) = env::var("DATA_DIR_PATH") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(max_conn) = env::var("DATABASE_MAX_CONNECTIONS") {
            config.database_max_connections = max_conn
                .parse()
                .map_err(|e| format!("Invalid database_max_connections: {}", e))?;
        }

        if let Ok(busy) = env::var("DATABASE_BUSY_TIMEOUT_SECS") {
            config.database_busy_timeout_secs = busy
                .parse()
                .map_err(|e| format!("Invalid database_busy_timeout_secs: {}", e))?;
        }

        if let Ok(secret) = env::var("AUTH_ENCRYPTION_KEY") {
            if !secret.is_empty() {
                config.jwt_secret = secret;
            }
        }

        if let Ok(secure) = env::var("COOKIE_SECURE") {
            config.cookie_secure = secure
                .parse()
                .map_err(|e| format!("Invalid cookie_secure: {}", e))?;
        }

        if let Ok(no_auth) = env::var("NO_AUTH_FOR_USER_ZERO") {
            config.no_auth_for_user_zero = no_auth
                .parse()
                .map_err(|e| format!("Invalid no_auth_for_user_zero: {}", e))?;
        }

        if let Ok(origin) = env::var("CORS_BASE_URL") {
            config.cors_allow_origin = origin;
        }

        Ok(config)
    }

    pub fn database_dir(&self) -> PathBuf {
        self.data_dir.join("database")
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_dir().join("sqlite.db")
    }

    pub fn uses_fallback_secret(&self) -> bool {
        self.jwt_secret == FALLBACK_SECRET
    }
}
