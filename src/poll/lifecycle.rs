use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::session::SessionCommand;

/// Fallback when a question does not carry a usable `timer`
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound on a question's own `timer`
pub const MAX_POLL_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Identifies one poll so a late timer cannot resolve its successor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PollId(u64);

impl fmt::Display for PollId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Answers keyed by student name, last write wins
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AnswerSet(BTreeMap<String, Value>);

impl AnswerSet {
    pub fn record(&mut self, name: &str, answer: Value) {
        self.0.insert(name.to_string(), answer);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Single-shot timer that reports expiry to the session inbox.
/// Aborted when dropped.
pub struct PollTimer {
    handle: JoinHandle<()>,
}

impl PollTimer {
    pub fn schedule(
        poll_id: PollId,
        duration: Duration,
        inbox: mpsc::UnboundedSender<SessionCommand>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if inbox.send(SessionCommand::PollExpired(poll_id)).is_err() {
                tracing::debug!(poll_id = %poll_id, "Session gone before poll expired");
            }
        });
        Self { handle }
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for PollTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub struct ActivePoll {
    pub id: PollId,
    pub question: Value,
    pub answers: AnswerSet,
    pub timeout: Duration,
    pub started_at: Instant,
    timer: Option<PollTimer>,
}

pub enum PollState {
    Idle,
    Active(ActivePoll),
}

impl Default for PollState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Result of an accepted submission
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub answers: AnswerSet,
    pub all_answered: bool,
}

/// Final answers of a resolved poll
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub poll_id: PollId,
    pub answers: AnswerSet,
    pub elapsed: Duration,
}

/// Idle -> Active -> Idle state machine for the single shared poll
pub struct PollLifecycle {
    state: PollState,
    next_id: u64,
    default_timeout: Duration,
}

impl PollLifecycle {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            state: PollState::Idle,
            next_id: 1,
            default_timeout,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, PollState::Active(_))
    }

    pub fn active(&self) -> Option<&ActivePoll> {
        match &self.state {
            PollState::Active(poll) => Some(poll),
            PollState::Idle => None,
        }
    }

    pub fn active_id(&self) -> Option<PollId> {
        self.active().map(|poll| poll.id)
    }

    /// Timeout for a question payload: its `timer` field in seconds when
    /// positive, otherwise the default.
    pub fn timeout_for(&self, question: &Value) -> Duration {
        requested_timeout(question).unwrap_or(self.default_timeout)
    }

    /// Starts a poll if none is active. `schedule` builds the expiry timer
    /// for the new poll. Returns `None` when a poll is already running.
    pub fn create_question<F>(&mut self, question: Value, schedule: F) -> Option<&ActivePoll>
    where
        F: FnOnce(PollId, Duration) -> PollTimer,
    {
        if self.is_active() {
            return None;
        }

        let id = PollId(self.next_id);
        self.next_id += 1;

        let timeout = self.timeout_for(&question);
        let timer = schedule(id, timeout);

        self.state = PollState::Active(ActivePoll {
            id,
            question,
            answers: AnswerSet::default(),
            timeout,
            started_at: Instant::now(),
            timer: Some(timer),
        });

        self.active()
    }

    /// Records an answer for the active poll. `None` while idle.
    pub fn submit_answer(
        &mut self,
        student_name: &str,
        answer: Value,
        roster_size: usize,
    ) -> Option<Submission> {
        let poll = match &mut self.state {
            PollState::Active(poll) => poll,
            PollState::Idle => return None,
        };

        poll.answers.record(student_name, answer);

        Some(Submission {
            answers: poll.answers.clone(),
            all_answered: poll.answers.len() >= roster_size,
        })
    }

    /// Ends the active poll, cancelling its timer.
    pub fn resolve(&mut self) -> Option<Resolution> {
        match std::mem::take(&mut self.state) {
            PollState::Active(mut poll) => {
                if let Some(timer) = poll.timer.take() {
                    timer.cancel();
                }
                Some(Resolution {
                    poll_id: poll.id,
                    answers: poll.answers,
                    elapsed: poll.started_at.elapsed(),
                })
            }
            PollState::Idle => None,
        }
    }

    /// Resolves only if `poll_id` is still the active poll.
    pub fn expire(&mut self, poll_id: PollId) -> Option<Resolution> {
        if self.active_id() != Some(poll_id) {
            return None;
        }
        self.resolve()
    }
}

fn requested_timeout(question: &Value) -> Option<Duration> {
    let secs = match question.get("timer")? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    if !secs.is_finite() || secs <= 0.0 {
        return None;
    }

    Some(Duration::from_secs_f64(secs.min(MAX_POLL_TIMEOUT.as_secs_f64())))
}
