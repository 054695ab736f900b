use super::job::File;
use serde::{Deserialize, Serialize};

/// Canonical job state, shared by every provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    #[default]
    Unknown,
    Queued,
    Started,
    Finished,
    Failed,
    Canceled,
}

impl State {
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Finished | State::Failed | State::Canceled)
    }

    fn rank(self) -> u8 {
        match self {
            State::Unknown => 0,
            State::Queued => 1,
            State::Started => 2,
            State::Finished | State::Failed | State::Canceled => 3,
        }
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// States only move forward along Unknown -> Queued -> Started -> terminal,
    /// steps may be skipped, and nothing leaves a terminal state.
    pub fn can_transition_to(self, next: State) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.rank() > self.rank()
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            State::Unknown => "unknown",
            State::Queued => "queued",
            State::Started => "started",
            State::Finished => "finished",
            State::Failed => "failed",
            State::Canceled => "canceled",
        };
        f.write_str(name)
    }
}

/// Provider-specific payload carried through the core untouched.
///
/// `schema` names the shape of `payload` so the consumer knows how to read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opaque {
    pub schema: String,
    pub payload: serde_json::Value,
}

impl Opaque {
    pub fn new(schema: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            schema: schema.into(),
            payload,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputFile {
    pub path: String,
    pub container: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusOutput {
    pub destination: String,
    #[serde(default)]
    pub files: Vec<OutputFile>,
}

/// Normalized view of a job, rebuilt on every describe call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub id: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub state: State,
    pub progress: f64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<File>,
    #[serde(default)]
    pub output: StatusOutput,
    pub provider_name: String,
    pub provider_job_id: String,
    /// Diagnostics only, never interpreted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_status: Option<Opaque>,
}

impl Status {
    pub fn queued(provider_name: &str, provider_job_id: &str) -> Self {
        Self {
            state: State::Queued,
            provider_name: provider_name.to_string(),
            provider_job_id: provider_job_id.to_string(),
            ..Self::default()
        }
    }
}

/// Clamp a raw progress value into `[0, 100]`.
pub fn clamp_progress(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

/// Static description of what a provider accepts and produces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub input_formats: Vec<String>,
    pub output_formats: Vec<String>,
    pub destinations: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        assert!(State::Unknown.can_transition_to(State::Queued));
        assert!(State::Queued.can_transition_to(State::Started));
        assert!(State::Queued.can_transition_to(State::Canceled));
        assert!(State::Started.can_transition_to(State::Finished));
        assert!(State::Started.can_transition_to(State::Failed));
    }

    #[test]
    fn test_no_backward_or_terminal_transitions() {
        assert!(!State::Started.can_transition_to(State::Queued));
        assert!(!State::Queued.can_transition_to(State::Queued));
        assert!(!State::Finished.can_transition_to(State::Canceled));
        assert!(!State::Canceled.can_transition_to(State::Finished));
        assert!(!State::Failed.can_transition_to(State::Started));
    }

    #[test]
    fn test_clamp_progress() {
        assert_eq!(clamp_progress(-3.0), 0.0);
        assert_eq!(clamp_progress(42.5), 42.5);
        assert_eq!(clamp_progress(180.0), 100.0);
        assert_eq!(clamp_progress(f64::NAN), 0.0);
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let json = serde_json::to_string(&State::Canceled).unwrap();
        assert_eq!(json, "\"canceled\"");
    }
}
