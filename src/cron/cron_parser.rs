// src/cron/cron_parser.rs
use std::time::Duration;

use anyhow::{anyhow, bail, Result};

const UNIT_SECS: [u64; 3] = [1, 60, 3600];
const DAY_SECS: u64 = 86_400;

/// Fixed-period cron expressions.
pub struct CronParser;

impl CronParser {
    /// Period of a six-field expression (`sec min hour day month weekday`)
    /// that fires on a fixed interval.
    ///
    /// Leading fields pinned to `0`, then one field that is `*` or `*/N`, then
    /// wildcards. Examples: `"0 */3 * * * *"` every three minutes,
    /// `"*/30 * * * * *"` every thirty seconds, `"0 0 0 * * *"` daily.
    pub fn interval(cron_expr: &str) -> Result<Duration> {
        let parts: Vec<&str> = cron_expr.split_whitespace().collect();
        if parts.len() != 6 {
            bail!("Invalid cron expression {cron_expr:?}. Expected 6 parts: sec min hour day month weekday");
        }
        if parts[3..].iter().any(|part| *part != "*") {
            bail!("Cron expression not supported: {cron_expr:?}. Day, month and weekday must be '*'");
        }

        for (position, field) in parts[..3].iter().enumerate() {
            if *field == "0" {
                continue;
            }
            let step = Self::step(field)
                .ok_or_else(|| anyhow!("Cron expression not supported: {cron_expr:?}. Field {field:?} is not a fixed step"))?;
            if parts[position + 1..3].iter().any(|part| *part != "*") {
                bail!("Cron expression not supported: {cron_expr:?}. Fields after a step must be '*'");
            }
            return Ok(Duration::from_secs(step * UNIT_SECS[position]));
        }

        Ok(Duration::from_secs(DAY_SECS))
    }

    fn step(field: &str) -> Option<u64> {
        if field == "*" {
            return Some(1);
        }
        field
            .strip_prefix("*/")?
            .parse::<u64>()
            .ok()
            .filter(|step| *step > 0)
    }
}
