use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use rollup_common::error::RollupError;
use rollup_common::types::VersionToken;
use serde::{Deserialize, Serialize};

pub const MAX_PAGE_SIZE: u32 = 10_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Created,
    Started,
    Stopped,
    Finished,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::Stopped => "stopped",
            Self::Finished => "finished",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "created" => Ok(Self::Created),
            "started" => Ok(Self::Started),
            "stopped" => Ok(Self::Stopped),
            "finished" => Ok(Self::Finished),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("unknown job status: {value}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

/// When a job's ticks fire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Schedule {
    Interval {
        period: u32,
        unit: IntervalUnit,
        /// Anchor for the fire times. Without one, ticks fire `period` after
        /// the previous one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start_time: Option<DateTime<Utc>>,
    },
    /// Six-field cron expression (`sec min hour day month weekday`).
    Cron {
        expression: String,
        #[serde(default = "default_timezone")]
        timezone: String,
    },
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Schedule {
    fn period(period: u32, unit: IntervalUnit) -> Option<TimeDelta> {
        let period = i64::from(period);
        match unit {
            IntervalUnit::Seconds => TimeDelta::try_seconds(period),
            IntervalUnit::Minutes => TimeDelta::try_minutes(period),
            IntervalUnit::Hours => TimeDelta::try_hours(period),
            IntervalUnit::Days => TimeDelta::try_days(period),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Interval { period, unit, .. } => {
                if *period == 0 {
                    return Err("schedule interval period must be positive".to_string());
                }
                Self::period(*period, *unit)
                    .map(|_| ())
                    .ok_or_else(|| format!("schedule interval period {period} is too large"))
            }
            Self::Cron {
                expression,
                timezone,
            } => {
                cron::Schedule::from_str(expression)
                    .map_err(|e| format!("invalid cron expression {expression:?}: {e}"))?;
                timezone
                    .parse::<Tz>()
                    .map_err(|_| format!("invalid timezone: {timezone}"))?;
                Ok(())
            }
        }
    }

    /// First fire time strictly after `now`. `None` if the schedule is
    /// invalid or never fires again.
    pub fn next_fire_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Interval {
                period,
                unit,
                start_time,
            } => {
                let step = Self::period(*period, *unit)?;
                match start_time {
                    Some(anchor) if *anchor > now => Some(*anchor),
                    Some(anchor) => {
                        let step_ms = step.num_milliseconds();
                        let steps = (now - *anchor).num_milliseconds() / step_ms + 1;
                        let offset = TimeDelta::try_milliseconds(steps.checked_mul(step_ms)?)?;
                        anchor.checked_add_signed(offset)
                    }
                    None => now.checked_add_signed(step),
                }
            }
            Self::Cron {
                expression,
                timezone,
            } => {
                let schedule = cron::Schedule::from_str(expression).ok()?;
                let tz: Tz = timezone.parse().ok()?;
                schedule
                    .after(&now.with_timezone(&tz))
                    .next()
                    .map(|t| t.with_timezone(&Utc))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransformSource {
    pub index: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_selection_query: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransformDestination {
    pub index: String,
}

/// How far a job's source has been incorporated into its destination.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Checkpoint {
    /// Last source position written to the destination. Never decreases
    /// for the lifetime of a job document.
    pub cursor: i64,
    pub pages_processed: u64,
    pub documents_processed: u64,
    pub documents_indexed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    pub fn has_progress(&self) -> bool {
        self.cursor > 0 || self.pages_processed > 0
    }
}

/// The user-editable part of a transform job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransformDefinition {
    #[serde(default)]
    pub description: String,
    pub schedule: Schedule,
    pub source: TransformSource,
    pub destination: TransformDestination,
    /// Records per unit of work; the scheduler default applies when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(default = "empty_array")]
    pub groups: serde_json::Value,
    #[serde(default = "empty_object")]
    pub aggregations: serde_json::Value,
    /// Continuous jobs keep ticking after catching up with the source.
    #[serde(default)]
    pub continuous: bool,
}

fn empty_array() -> serde_json::Value {
    serde_json::Value::Array(Vec::new())
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl TransformDefinition {
    pub fn validate(&self) -> Result<(), String> {
        if self.source.index.trim().is_empty() {
            return Err("source index must not be empty".to_string());
        }
        if self.destination.index.trim().is_empty() {
            return Err("destination index must not be empty".to_string());
        }
        if self.source.index == self.destination.index {
            return Err("source and destination index must differ".to_string());
        }
        if let Some(size) = self.page_size {
            if size == 0 || size > MAX_PAGE_SIZE {
                return Err(format!("page_size must be between 1 and {MAX_PAGE_SIZE}"));
            }
        }
        if !self.groups.is_array() {
            return Err("groups must be an array".to_string());
        }
        if !self.aggregations.is_object() {
            return Err("aggregations must be an object".to_string());
        }
        self.schedule.validate()
    }

    /// Whether `other` reads or writes different data than `self`. Such
    /// changes invalidate a checkpoint that has already advanced.
    pub fn changes_data_shape(&self, other: &TransformDefinition) -> bool {
        self.source != other.source
            || self.destination != other.destination
            || self.groups != other.groups
            || self.aggregations != other.aggregations
    }
}

pub fn validate_job_id(id: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err("transform id must not be empty".to_string());
    }
    if id.len() > 255 {
        return Err("transform id must be at most 255 bytes".to_string());
    }
    if id.starts_with('_') {
        return Err("transform id must not start with '_'".to_string());
    }
    if id.chars().any(|c| c == '/' || c.is_whitespace()) {
        return Err("transform id must not contain '/' or whitespace".to_string());
    }
    Ok(())
}

/// Durable configuration and progress of one transform job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransformJob {
    pub id: String,
    pub status: JobStatus,
    #[serde(flatten)]
    pub definition: TransformDefinition,
    #[serde(default)]
    pub checkpoint: Checkpoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl TransformJob {
    /// A freshly created job: status CREATED, cursor at the start of the source.
    pub fn new(id: impl Into<String>, definition: TransformDefinition, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Created,
            definition,
            checkpoint: Checkpoint::default(),
            enabled_at: None,
            updated_at: now,
        }
    }
}

/// A stored job document that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndecodableJob {
    pub id: String,
    pub error: RollupError,
}

/// A job as read from the store together with the token of that read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedJob {
    pub job: TransformJob,
    pub token: VersionToken,
    pub version: i64,
}
