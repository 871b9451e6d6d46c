//! Apply progress reporting.
//!
//! Reports observable progress during `vmap apply` so users see how many
//! batches are done and when results are being flushed. Progress goes to
//! **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event for an apply run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyProgressEvent {
    /// Source rows and mappings are being read from the store.
    Loading,
    /// `n` of `total` batches have returned.
    Applying { n: u64, total: u64 },
    /// A chunk of `rows` Standard rows is being committed.
    Flushing { rows: u64 },
}

/// Reports apply progress. Implementations write to stderr (human or JSON).
pub trait ApplyProgressReporter: Send + Sync {
    fn report(&self, event: ApplyProgressEvent);
}

/// Human-friendly progress on stderr: "apply  batches  3 / 12".
pub struct StderrProgress;

impl ApplyProgressReporter for StderrProgress {
    fn report(&self, event: ApplyProgressEvent) {
        let line = match &event {
            ApplyProgressEvent::Loading => "apply  loading...\n".to_string(),
            ApplyProgressEvent::Applying { n, total } => format!(
                "apply  batches  {} / {}\n",
                format_number(*n),
                format_number(*total)
            ),
            ApplyProgressEvent::Flushing { rows } => {
                format!("apply  flushing  {} rows\n", format_number(*rows))
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ApplyProgressReporter for JsonProgress {
    fn report(&self, event: ApplyProgressEvent) {
        let obj = match &event {
            ApplyProgressEvent::Loading => serde_json::json!({
                "event": "progress",
                "phase": "loading"
            }),
            ApplyProgressEvent::Applying { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "applying",
                "n": n,
                "total": total
            }),
            ApplyProgressEvent::Flushing { rows } => serde_json::json!({
                "event": "progress",
                "phase": "flushing",
                "rows": rows
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ApplyProgressReporter for NoProgress {
    fn report(&self, _event: ApplyProgressEvent) {}
}

pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parse `off`, `human` or `json`; `None` selects the TTY default.
    pub fn from_flag(flag: Option<&str>) -> anyhow::Result<Self> {
        match flag {
            None => Ok(Self::default_for_tty()),
            Some("off") => Ok(ProgressMode::Off),
            Some("human") => Ok(ProgressMode::Human),
            Some("json") => Ok(ProgressMode::Json),
            Some(other) => anyhow::bail!(
                "Unknown progress mode: '{}'. Must be off, human, or json.",
                other
            ),
        }
    }

    pub fn reporter(&self) -> Box<dyn ApplyProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn progress_flag_parsing() {
        assert_eq!(ProgressMode::from_flag(Some("json")).unwrap(), ProgressMode::Json);
        assert_eq!(ProgressMode::from_flag(Some("off")).unwrap(), ProgressMode::Off);
        assert!(ProgressMode::from_flag(Some("loud")).is_err());
    }
}
