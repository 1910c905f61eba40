use std::time::Duration;

pub const VAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);
pub const RENEWAL_WINDOW: Duration = Duration::from_secs(30 * 24 * 60 * 60);
pub const EVENT_CHANNEL_CAPACITY: usize = 64;
pub const LOG_LEVEL: &str = "info";
