// Copyright 2026 Anvil Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Cron/interval scheduling. A ticking task is spawned per registration; on every
//! fire it publishes a `Triggered` message to a shared broadcast channel rather than
//! calling back into the broker directly, so the broker stays the single place that
//! re-enters `submit` and re-applies permission/quota checks.

use anvil_core::{ErrorKind, PluginError};
use regex::Regex;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Triggered {
    pub schedule_id: Uuid,
    pub plugin_id: String,
}

pub enum ScheduleSpec {
    Cron(cron::Schedule),
    Interval(Duration),
}

fn interval_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+)(s|m|h|d)$").expect("static interval pattern"))
}

/// Parses `"5m"`-style interval shorthand; returns `None` if `expr` isn't one, so the
/// caller can fall through to cron parsing.
pub fn parse_interval(expr: &str) -> Option<Duration> {
    let caps = interval_pattern().captures(expr.trim())?;
    let count: u64 = caps[1].parse().ok()?;
    let unit_secs = match &caps[2] {
        "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        _ => return None,
    };
    Some(Duration::from_secs(count * unit_secs))
}

pub fn parse_schedule_spec(expr: &str) -> Result<ScheduleSpec, PluginError> {
    if let Some(interval) = parse_interval(expr) {
        return Ok(ScheduleSpec::Interval(interval));
    }
    cron::Schedule::from_str(expr)
        .map(ScheduleSpec::Cron)
        .map_err(|err| PluginError::new(ErrorKind::ValidationError, format!("invalid schedule expression {expr:?}: {err}")))
}

/// Spawns the ticking task for one registration. Stops when `cancellation` fires or,
/// for cron schedules, when the expression has no more upcoming occurrences.
pub fn spawn_ticker(
    spec: ScheduleSpec,
    schedule_id: Uuid,
    plugin_id: String,
    sender: broadcast::Sender<Triggered>,
    cancellation: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let sleep_for = match &spec {
                ScheduleSpec::Interval(duration) => *duration,
                ScheduleSpec::Cron(schedule) => {
                    let Some(next) = schedule.upcoming(chrono::Utc).next() else {
                        return;
                    };
                    (next - chrono::Utc::now()).to_std().unwrap_or(Duration::from_millis(1))
                }
            };

            tokio::select! {
                _ = cancellation.cancelled() => return,
                _ = tokio::time::sleep(sleep_for) => {}
            }

            if cancellation.is_cancelled() {
                return;
            }
            let _ = sender.send(Triggered { schedule_id, plugin_id: plugin_id.clone() });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_shorthand_parses_minutes() {
        assert_eq!(parse_interval("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_interval("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_interval("not-an-interval"), None);
    }

    #[test]
    fn schedule_spec_falls_back_to_cron_for_non_interval_expressions() {
        let spec = parse_schedule_spec("0 0 * * * *").unwrap();
        assert!(matches!(spec, ScheduleSpec::Cron(_)));
    }

    #[test]
    fn schedule_spec_rejects_garbage_expressions() {
        assert!(parse_schedule_spec("definitely not valid").is_err());
    }
}
