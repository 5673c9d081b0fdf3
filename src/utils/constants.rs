pub const MAX_RETRIES: u32 = 5;
pub const BASE_RETRY_DELAY_SECS: u64 = 5;

pub const DELAYED_JOBS_KEY: &str = "snm:delayed_jobs";
pub const PREFIX_QUEUE: &str = "snm:queue";
pub const PREFIX_JOB: &str = "snm:job";
pub const PREFIX_PROCESSING: &str = "snm:processing";

pub const BROADCAST_QUEUE: &str = "broadcast";
pub const RELAY_QUEUE: &str = "relay";

pub const FAILS_DIR: &str = "./transmission_fails";
pub const SUCCESS_DIR: &str = "./transmission_success";

pub const RECORD_PREFIX: &str = "transmission_";
pub const RECORD_SUFFIX: &str = ".log";

// Every three minutes.
pub const RELAY_SCHEDULE: &str = "0 */3 * * * *";
