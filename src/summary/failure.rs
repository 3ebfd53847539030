//! Run status and stable exit codes

use serde::{Deserialize, Serialize};

/// Aggregate run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Every instance submitted, planned or skipped
    Success,
    /// At least one group or instance failed
    Failed,
    /// Interrupted before every instance was submitted
    Cancelled,
}

impl Status {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Status::Success => ExitCode::Success,
            Status::Failed => ExitCode::Failures,
            Status::Cancelled => ExitCode::Cancelled,
        }
    }
}

/// Stable exit codes, serialized as their numeric value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(into = "i32", try_from = "i32")]
#[repr(i32)]
pub enum ExitCode {
    #[default]
    Success = 0,
    /// Some group or instance failed
    Failures = 1,
    /// Jobs file or settings unusable, or unknown group selected
    Config = 2,
    /// Queue could not be read; nothing was submitted
    SchedulerUnavailable = 3,
    Cancelled = 80,
}

impl ExitCode {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code.as_i32()
    }
}

impl TryFrom<i32> for ExitCode {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(ExitCode::Success),
            1 => Ok(ExitCode::Failures),
            2 => Ok(ExitCode::Config),
            3 => Ok(ExitCode::SchedulerUnavailable),
            80 => Ok(ExitCode::Cancelled),
            other => Err(format!("unknown exit code {}", other)),
        }
    }
}

/// Folds per-group outcomes into one status. Cancellation wins over failure.
#[derive(Debug, Default)]
pub struct StatusAggregator {
    failed: bool,
    cancelled: bool,
}

impl StatusAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_failure(&mut self) {
        self.failed = true;
    }

    pub fn add_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub fn status(&self) -> Status {
        if self.cancelled {
            Status::Cancelled
        } else if self.failed {
            Status::Failed
        } else {
            Status::Success
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::Failures.as_i32(), 1);
        assert_eq!(ExitCode::Config.as_i32(), 2);
        assert_eq!(ExitCode::SchedulerUnavailable.as_i32(), 3);
        assert_eq!(ExitCode::Cancelled.as_i32(), 80);
    }

    #[test]
    fn test_exit_code_serializes_as_number() {
        assert_eq!(serde_json::to_value(ExitCode::Cancelled).unwrap(), serde_json::json!(80));
        let code: ExitCode = serde_json::from_str("3").unwrap();
        assert_eq!(code, ExitCode::SchedulerUnavailable);
        assert!(serde_json::from_str::<ExitCode>("42").is_err());
    }

    #[test]
    fn test_aggregation() {
        let mut agg = StatusAggregator::new();
        assert_eq!(agg.status(), Status::Success);
        agg.add_failure();
        assert_eq!(agg.status(), Status::Failed);
        agg.add_cancelled();
        assert_eq!(agg.status(), Status::Cancelled);
        assert_eq!(agg.status().exit_code(), ExitCode::Cancelled);
    }
}
