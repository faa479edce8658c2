//! Builtin operations that summarize plain files: weekday counts and log heads.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use super::write_output;
use crate::operations::{Operation, OperationContext};

/// Date-only formats accepted in the dates file.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%b-%Y", "%b %d, %Y", "%Y/%m/%d"];

/// Date-time formats accepted in the dates file.
const DATETIME_FORMATS: &[&str] = &["%Y/%m/%d %H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Parses one line of the dates file.
pub fn parse_date(line: &str) -> Option<NaiveDate> {
    let line = line.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(line, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(line, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// Counts non-empty lines of `content` that fall on `weekday`.
pub fn count_weekday(content: &str, weekday: Weekday) -> anyhow::Result<usize> {
    let mut count = 0;
    for (n, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let date = parse_date(line)
            .ok_or_else(|| anyhow!("line {}: unrecognized date '{}'", n + 1, line.trim()))?;
        if date.weekday() == weekday {
            count += 1;
        }
    }
    Ok(count)
}

// ── count_weekday ────────────────────────────────────────

pub struct CountWeekdayOperation {
    input: String,
    output: String,
    weekday: Weekday,
    weekday_name: String,
    keyword: String,
}

impl CountWeekdayOperation {
    /// `weekday_name` is a full English day name, e.g. "Wednesday".
    pub fn new(
        input: impl Into<String>,
        output: impl Into<String>,
        weekday_name: &str,
    ) -> anyhow::Result<Self> {
        let weekday: Weekday = weekday_name
            .parse()
            .map_err(|_| anyhow!("invalid weekday '{weekday_name}'"))?;
        Ok(Self {
            input: input.into(),
            output: output.into(),
            weekday,
            weekday_name: weekday_name.to_string(),
            keyword: format!("count {weekday_name}s"),
        })
    }
}

#[async_trait]
impl Operation for CountWeekdayOperation {
    fn name(&self) -> &str {
        "count_weekday"
    }

    fn keyword(&self) -> &str {
        &self.keyword
    }

    fn description(&self) -> &str {
        "Count the dates in the configured file that fall on the configured weekday."
    }

    async fn execute(&self, context: &OperationContext<'_>) -> anyhow::Result<String> {
        context.sandbox.validate_all(&[self.input.as_str(), self.output.as_str()])?;

        let content = tokio::fs::read_to_string(&self.input)
            .await
            .with_context(|| format!("Cannot read {}", self.input))?;
        let count = count_weekday(&content, self.weekday)?;
        write_output(&self.output, count.to_string().as_bytes()).await?;

        Ok(format!("Counted {count} {}s.", self.weekday_name))
    }
}

// ── recent_logs ──────────────────────────────────────────

/// Writes the first line of the most recently modified `*.log` files.
pub struct RecentLogsOperation {
    dir: String,
    output: String,
    count: usize,
}

impl RecentLogsOperation {
    pub fn new(dir: impl Into<String>, output: impl Into<String>, count: usize) -> Self {
        Self {
            dir: dir.into(),
            output: output.into(),
            count,
        }
    }

    /// `*.log` files in the directory, newest first.
    async fn newest_logs(&self) -> anyhow::Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("Cannot list {}", self.dir))?;

        let mut logs: Vec<(SystemTime, PathBuf)> = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("log") {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            logs.push((metadata.modified()?, path));
        }

        logs.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(logs.into_iter().take(self.count).map(|(_, p)| p).collect())
    }
}

async fn first_line(path: &Path) -> anyhow::Result<String> {
    let file = tokio::fs::File::open(path).await?;
    let mut lines = BufReader::new(file).lines();
    Ok(lines.next_line().await?.unwrap_or_default().trim().to_string())
}

#[async_trait]
impl Operation for RecentLogsOperation {
    fn name(&self) -> &str {
        "recent_logs"
    }

    fn keyword(&self) -> &str {
        "recent logs"
    }

    fn description(&self) -> &str {
        "Collect the first line of the most recent log files."
    }

    async fn execute(&self, context: &OperationContext<'_>) -> anyhow::Result<String> {
        context.sandbox.validate_all(&[self.dir.as_str(), self.output.as_str()])?;

        if self.count == 0 {
            bail!("logs_count must be at least 1");
        }

        let logs = self.newest_logs().await?;
        let mut body = String::new();
        for path in &logs {
            debug!("Reading first line of {}", path.display());
            body.push_str(&first_line(path).await?);
            body.push('\n');
        }
        write_output(&self.output, body.as_bytes()).await?;

        info!("Collected first lines of {} log files into {}", logs.len(), self.output);
        Ok(format!("Extracted first lines of {} log files.", logs.len()))
    }
}
