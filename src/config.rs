//! Environment-driven configuration. Every field is backed by an env var
//! via `clap`'s `env` feature, following the `.env` + `std::env::var`
//! bootstrap idiom in the teacher's `main.rs` but expressed declaratively
//! instead of hand-parsed, matching spec.md §6's exact env-var surface:
//! `DATABASE_URL`, `EVENT_BUS_URL`+region,
//! `TELEPHONY_{PROVIDER,ACCOUNT_SID,AUTH_TOKEN,FROM_NUMBER,
//! WEBHOOK_BASE_URL,MAX_CONCURRENT_CALLS,CALL_TIMEOUT_SECONDS}`,
//! `LLM_{PROVIDER,MODEL,API_KEY}`, `SCHEDULER_{INTERVAL_SECONDS,LOCK_KEY}`,
//! `EMAIL_{SMTP_*,FROM,MAX_RETRIES,POLL_INTERVAL}`.

use clap::Parser;

#[derive(Debug, Clone, Parser)]
pub struct DatabaseConfig {
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,
}

#[derive(Debug, Clone, Parser)]
pub struct EventBusConfig {
    #[arg(long, env = "EVENT_BUS_URL")]
    pub event_bus_url: String,
    #[arg(long, env = "EVENT_BUS_REGION", default_value = "us-east-1")]
    pub event_bus_region: String,
}

#[derive(Debug, Clone, Parser)]
pub struct TelephonyConfig {
    #[arg(long, env = "TELEPHONY_PROVIDER", default_value = "generic")]
    pub provider: String,
    #[arg(long, env = "TELEPHONY_ACCOUNT_SID")]
    pub account_sid: Option<String>,
    #[arg(long, env = "TELEPHONY_AUTH_TOKEN")]
    pub auth_token: String,
    #[arg(long, env = "TELEPHONY_FROM_NUMBER")]
    pub from_number: String,
    #[arg(long, env = "TELEPHONY_WEBHOOK_BASE_URL")]
    pub webhook_base_url: String,
    #[arg(long, env = "TELEPHONY_WEBHOOK_SIGNING_SECRET")]
    pub webhook_signing_secret: Option<String>,
    #[arg(long, env = "TELEPHONY_MAX_CONCURRENT_CALLS", default_value_t = 10)]
    pub max_concurrent_calls: i64,
    #[arg(long, env = "TELEPHONY_CALL_TIMEOUT_SECONDS", default_value_t = 60)]
    pub call_timeout_seconds: u64,
}

#[derive(Debug, Clone, Parser)]
pub struct LlmConfig {
    #[arg(long, env = "LLM_PROVIDER", default_value = "anthropic")]
    pub provider: String,
    #[arg(long, env = "LLM_MODEL", default_value = "claude-3-5-sonnet-20241022")]
    pub model: String,
    #[arg(long, env = "LLM_API_KEY")]
    pub api_key: String,
}

#[derive(Debug, Clone, Parser)]
pub struct SchedulerConfig {
    #[arg(long, env = "SCHEDULER_INTERVAL_SECONDS", default_value_t = 60)]
    pub interval_seconds: u64,
    #[arg(long, env = "SCHEDULER_LOCK_KEY", default_value_t = 847_362)]
    pub lock_key: i64,
    #[arg(long, env = "SCHEDULER_PREFETCH_FACTOR", default_value_t = 2)]
    pub prefetch_factor: i64,
}

#[derive(Debug, Clone, Parser)]
pub struct EmailConfig {
    #[arg(long, env = "EMAIL_SMTP_HOST")]
    pub smtp_host: String,
    #[arg(long, env = "EMAIL_SMTP_PORT", default_value_t = 587)]
    pub smtp_port: u16,
    #[arg(long, env = "EMAIL_SMTP_USERNAME")]
    pub smtp_username: String,
    #[arg(long, env = "EMAIL_SMTP_PASSWORD")]
    pub smtp_password: String,
    #[arg(long, env = "EMAIL_FROM")]
    pub from_email: String,
    #[arg(long, env = "EMAIL_FROM_NAME", default_value = "Survey Dialer")]
    pub from_name: String,
    #[arg(long, env = "EMAIL_MAX_RETRIES", default_value_t = 3)]
    pub max_retries: i32,
    #[arg(long, env = "EMAIL_POLL_INTERVAL", default_value_t = 20)]
    pub poll_interval_seconds: u64,
}
