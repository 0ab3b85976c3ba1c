use std::time::{Duration, Instant};

use crate::collab::document::language_by_tag;
use crate::collab::protocol::{CollabMessage, RunOutput};
use crate::error::{CollabError, Result};

const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// Client-visible run state: re-entrant, a new run from any state goes
/// back to Running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// Execution dispatcher and display state machine. Builds `run` requests
/// from the language table, tracks the single outstanding request per
/// connection, and resolves results against it. A result for a superseded
/// request id is stale and dropped. Without a deadline a request that never
/// gets a response would sit in Running forever, so the tracker carries one
/// and fails the run when it expires.
#[derive(Debug)]
pub struct RunTracker {
    state: RunState,
    output: String,
    elapsed_ms: Option<u64>,
    next_request_id: u64,
    current_request: Option<u64>,
    deadline: Duration,
    running_since: Option<Instant>,
}

impl RunTracker {
    pub fn new() -> Self {
        Self::with_deadline(DEFAULT_DEADLINE)
    }

    pub fn with_deadline(deadline: Duration) -> Self {
        Self {
            state: RunState::Idle,
            output: String::new(),
            elapsed_ms: None,
            next_request_id: 0,
            current_request: None,
            deadline,
            running_since: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Text to display: stdout after a success, stderr after a failure
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Duration of the last successful run in milliseconds. Failures leave
    /// the previous value in place since no duration is computed for them.
    pub fn elapsed_ms(&self) -> Option<u64> {
        self.elapsed_ms
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Start a run: clears the displayed output, enters Running and returns
    /// the request to send. Supersedes any outstanding request, whose
    /// response becomes stale.
    pub fn start(&mut self, code: &str, language_tag: &str) -> Result<CollabMessage> {
        let language = language_by_tag(language_tag)?;

        self.next_request_id += 1;
        let request_id = self.next_request_id;
        self.current_request = Some(request_id);
        self.state = RunState::Running;
        self.output.clear();
        self.running_since = Some(Instant::now());

        Ok(CollabMessage::Run {
            code: code.to_string(),
            extension: language.extension.to_string(),
            request_id,
        })
    }

    /// Resolve a `runResult`. Returns false when the result does not
    /// correlate with the outstanding request (stale or unsolicited) and
    /// was ignored.
    pub fn apply_result(
        &mut self,
        request_id: u64,
        success: bool,
        output: RunOutput,
        started_at: Option<u64>,
        ended_at: Option<u64>,
    ) -> bool {
        if self.current_request != Some(request_id) {
            tracing::debug!(request_id = request_id, "Ignoring stale run result");
            return false;
        }
        self.current_request = None;
        self.running_since = None;

        self.output = output.display_text().to_string();
        if success {
            self.state = RunState::Succeeded;
            self.elapsed_ms = match (started_at, ended_at) {
                (Some(started), Some(ended)) => Some(ended.saturating_sub(started)),
                _ => None,
            };
        } else {
            self.state = RunState::Failed;
        }
        true
    }

    /// Whether the outstanding request has passed its deadline
    pub fn expired(&self) -> bool {
        matches!(self.state, RunState::Running)
            && self
                .running_since
                .map(|since| since.elapsed() >= self.deadline)
                .unwrap_or(false)
    }

    /// Fail the outstanding request as timed out. A result that arrives
    /// later no longer correlates and is dropped.
    pub fn fail_timeout(&mut self) -> bool {
        if self.state != RunState::Running {
            return false;
        }
        self.state = RunState::Failed;
        self.output = CollabError::ExecutionTimeout(self.deadline.as_secs()).to_string();
        self.current_request = None;
        self.running_since = None;
        true
    }
}

impl Default for RunTracker {
    fn default() -> Self {
        Self::new()
    }
}
