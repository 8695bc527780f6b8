use std::collections::HashMap;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub deploy: DeployConfig,
    pub remote_deploy: RemoteDeployConfig,
    pub rate_limit: RateLimitSettings,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

/// Secrets and quota overrides consumed by the deploy pipeline.
///
/// The secrets are optional here on purpose: their absence is reported by the
/// pipeline's environment check for the run that needs them, not at startup.
#[derive(Debug, Clone, Default)]
pub struct DeployConfig {
    pub control_password: Option<String>,
    pub source_control_token: Option<String>,
    pub source_control_repo: Option<String>,
    /// Replaces every tier's ceiling when set
    pub global_daily_limit: Option<u32>,
    /// Per-tier ceilings layered over the built-in table
    pub tier_daily_limits: HashMap<String, u32>,
    /// Target slugs the deploy routes serve
    pub targets: Vec<String>,
}

/// Remote deploy trigger settings. Missing identifiers degrade to a manual result.
#[derive(Debug, Clone)]
pub struct RemoteDeployConfig {
    pub enabled: bool,
    pub api_base: String,
    pub account_id: Option<String>,
    pub api_token: Option<String>,
    pub script_name: Option<String>,
    /// `None` leaves the trigger call unbounded
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub sweep_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if exists, ignore if not found (optional for production)
        if let Err(e) = dotenvy::dotenv() {
            if !e.to_string().contains("not found") {
                eprintln!("Warning: Error loading .env file: {}", e);
            }
        }

        Ok(Config {
            app: AppConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            deploy: DeployConfig::from_env()?,
            remote_deploy: RemoteDeployConfig::from_env()?,
            rate_limit: RateLimitSettings::from_env()?,
        })
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|e| format!("Invalid PORT: {}", e))?;

        // Parse CORS allowed origins from comma-separated string
        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            host,
            port,
            cors_allowed_origins,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl DatabaseConfig {
    const DEFAULT_MAX_CONNECTIONS: u32 = 10;
    const DEFAULT_MIN_CONNECTIONS: u32 = 1;
    const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 5;
    const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600; // 10 minutes
    const DEFAULT_MAX_LIFETIME_SECS: u64 = 1800; // 30 minutes

    pub fn from_env() -> Result<Self, String> {
        let url = env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;

        Ok(Self {
            url,
            max_connections: parse_var("DB_MAX_CONNECTIONS", Self::DEFAULT_MAX_CONNECTIONS)?,
            min_connections: parse_var("DB_MIN_CONNECTIONS", Self::DEFAULT_MIN_CONNECTIONS)?,
            acquire_timeout_secs: parse_var(
                "DB_ACQUIRE_TIMEOUT_SECS",
                Self::DEFAULT_ACQUIRE_TIMEOUT_SECS,
            )?,
            idle_timeout_secs: parse_var("DB_IDLE_TIMEOUT_SECS", Self::DEFAULT_IDLE_TIMEOUT_SECS)?,
            max_lifetime_secs: parse_var("DB_MAX_LIFETIME_SECS", Self::DEFAULT_MAX_LIFETIME_SECS)?,
        })
    }
}

impl DeployConfig {
    pub fn from_env() -> Result<Self, String> {
        let global_daily_limit = match non_empty_var("DEPLOY_DAILY_LIMIT") {
            Some(raw) => Some(
                raw.parse::<u32>()
                    .map_err(|_| "DEPLOY_DAILY_LIMIT must be a valid number".to_string())?,
            ),
            None => None,
        };

        let tier_daily_limits = match non_empty_var("DEPLOY_DAILY_LIMITS") {
            Some(raw) => parse_tier_limits(&raw)?,
            None => HashMap::new(),
        };

        Ok(Self {
            control_password: non_empty_var("CONTROL_PASSWORD"),
            source_control_token: non_empty_var("GITHUB_TOKEN"),
            source_control_repo: non_empty_var("GITHUB_REPO"),
            global_daily_limit,
            tier_daily_limits,
            targets: non_empty_var("DEPLOY_TARGETS")
                .map(|raw| parse_targets(&raw))
                .unwrap_or_default(),
        })
    }
}

impl RemoteDeployConfig {
    const DEFAULT_API_BASE: &'static str = "https://api.cloudflare.com/client/v4";

    pub fn from_env() -> Result<Self, String> {
        let enabled = non_empty_var("REMOTE_DEPLOY_ENABLED")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        let timeout = match non_empty_var("REMOTE_DEPLOY_TIMEOUT_SECS") {
            Some(raw) => Some(Duration::from_secs(raw.parse::<u64>().map_err(|_| {
                "REMOTE_DEPLOY_TIMEOUT_SECS must be a valid number".to_string()
            })?)),
            None => None,
        };

        Ok(Self {
            enabled,
            api_base: non_empty_var("REMOTE_DEPLOY_API_BASE")
                .unwrap_or_else(|| Self::DEFAULT_API_BASE.to_string()),
            account_id: non_empty_var("REMOTE_DEPLOY_ACCOUNT_ID"),
            api_token: non_empty_var("REMOTE_DEPLOY_API_TOKEN"),
            script_name: non_empty_var("REMOTE_DEPLOY_SCRIPT"),
            timeout,
        })
    }
}

impl Default for RemoteDeployConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_base: Self::DEFAULT_API_BASE.to_string(),
            account_id: None,
            api_token: None,
            script_name: None,
            timeout: None,
        }
    }
}

impl RateLimitSettings {
    const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

    pub fn from_env() -> Result<Self, String> {
        let secs = parse_var(
            "RATE_LIMIT_SWEEP_INTERVAL_SECS",
            Self::DEFAULT_SWEEP_INTERVAL_SECS,
        )?;

        Ok(Self {
            sweep_interval: Duration::from_secs(secs.max(1)),
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T>(key: &str, default: T) -> Result<T, String>
where
    T: std::str::FromStr,
{
    match non_empty_var(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| format!("{} must be a valid number", key)),
        None => Ok(default),
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Split a comma list of target slugs, dropping blanks and duplicates
pub fn parse_targets(raw: &str) -> Vec<String> {
    let mut targets: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    targets.sort();
    targets.dedup();
    targets
}

/// Parse a JSON object of tier name to daily ceiling, e.g. `{"pro": 20}`.
/// Tier names are lowercased so they line up with normalized plan tiers.
pub fn parse_tier_limits(raw: &str) -> Result<HashMap<String, u32>, String> {
    let parsed: HashMap<String, u32> = serde_json::from_str(raw)
        .map_err(|e| format!("DEPLOY_DAILY_LIMITS must be a JSON object of numbers: {}", e))?;

    Ok(parsed
        .into_iter()
        .map(|(tier, limit)| (tier.trim().to_lowercase(), limit))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tier_limits_lowercases_keys() {
        let limits = parse_tier_limits(r#"{"Pro": 20, "free": 2}"#).unwrap();
        assert_eq!(limits.get("pro"), Some(&20));
        assert_eq!(limits.get("free"), Some(&2));
    }

    #[test]
    fn test_parse_tier_limits_rejects_garbage() {
        assert!(parse_tier_limits("pro=20").is_err());
        assert!(parse_tier_limits(r#"{"pro": -1}"#).is_err());
    }

    #[test]
    fn test_parse_targets() {
        assert_eq!(
            parse_targets(" acme-site, blog ,,acme-site"),
            vec!["acme-site".to_string(), "blog".to_string()]
        );
        assert!(parse_targets(" , ").is_empty());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag("YES"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag("0"));
    }
}
