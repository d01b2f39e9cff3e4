use chrono::{FixedOffset, Offset, Utc};
use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    /// Websocket endpoint of the realtime change feed. Derived from
    /// `supabase_url` when not set explicitly.
    pub supabase_realtime_url: Option<String>,
    /// JSON file holding the static doctor catalog.
    pub doctor_catalog_path: Option<String>,
    /// Offset applied to naive slot times and message date headers.
    pub timezone_offset_minutes: i32,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            supabase_realtime_url: env::var("SUPABASE_REALTIME_URL").ok(),
            doctor_catalog_path: env::var("DOCTOR_CATALOG_PATH").ok(),
            timezone_offset_minutes: env::var("APP_TIMEZONE_OFFSET_MINUTES")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or_else(|| {
                    warn!("APP_TIMEZONE_OFFSET_MINUTES not set or invalid, using UTC");
                    0
                }),
            port: env::var("PORT")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_realtime_configured(&self) -> bool {
        !self.realtime_url().is_empty() && !self.supabase_anon_key.is_empty()
    }

    /// Local offset for composing appointment timestamps and day headers.
    /// Out-of-range values fall back to UTC.
    pub fn local_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.timezone_offset_minutes * 60).unwrap_or_else(|| {
            warn!("Timezone offset {} minutes out of range, using UTC", self.timezone_offset_minutes);
            Utc.fix()
        })
    }

    /// Realtime websocket base, e.g. `wss://project.supabase.co/realtime/v1/websocket`.
    pub fn realtime_url(&self) -> String {
        if let Some(url) = &self.supabase_realtime_url {
            return url.clone();
        }

        if self.supabase_url.is_empty() {
            return String::new();
        }

        let base = self.supabase_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };

        format!("{}/realtime/v1/websocket", ws_base)
    }
}
