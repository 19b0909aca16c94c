use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub redis_url: Option<String>,
    pub server_port: u16,
    pub queue: QueueSettings,
    pub directory_seed_file: Option<String>,
}

/// Tunables for token allocation and queue advancement.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSettings {
    /// Offset from UTC, in minutes, that defines where a queue day starts.
    pub utc_offset_minutes: i32,
    /// `concurrent` or `single`.
    pub serving_policy: String,
    pub allow_duplicate_bookings: bool,
    pub max_cas_retries: u32,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            serving_policy: "concurrent".to_string(),
            allow_duplicate_bookings: false,
            max_cas_retries: 3,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = QueueSettings::default();

        let config = Self {
            supabase_url: lookup("SUPABASE_URL")
                .unwrap_or_else(|| {
                    warn!("SUPABASE_URL not set, using in-memory directory");
                    String::new()
                }),
            supabase_anon_key: lookup("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: lookup("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            redis_url: lookup("REDIS_URL").filter(|url| !url.is_empty()),
            server_port: parse_or(&lookup, "SERVER_PORT", 3000),
            queue: QueueSettings {
                utc_offset_minutes: parse_or(&lookup, "QUEUE_UTC_OFFSET_MINUTES", defaults.utc_offset_minutes),
                serving_policy: lookup("QUEUE_SERVING_POLICY")
                    .map(|policy| policy.trim().to_lowercase())
                    .unwrap_or(defaults.serving_policy),
                allow_duplicate_bookings: parse_or(&lookup, "QUEUE_ALLOW_DUPLICATE_BOOKINGS", defaults.allow_duplicate_bookings),
                max_cas_retries: parse_or(&lookup, "QUEUE_MAX_CAS_RETRIES", defaults.max_cas_retries),
            },
            directory_seed_file: lookup("DIRECTORY_SEED_FILE").filter(|path| !path.is_empty()),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_directory_remote(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }

    pub fn is_redis_configured(&self) -> bool {
        self.redis_url.is_some()
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + std::fmt::Debug,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value {:?}, using default {:?}", key, raw, default);
            default
        }),
        None => default,
    }
}
