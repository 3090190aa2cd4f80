use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use warp::ws::Message;

use super::events::{InboundEvent, OutboundEvent};
use super::hub::Hub;
use super::lifecycle::{PollId, PollLifecycle, PollTimer};
use super::registry::{ConnectionId, ConnectionRole, SessionRegistry};
use crate::error::{PollError, Result};

/// Everything the session task reacts to, processed strictly in arrival order
#[derive(Debug)]
pub enum SessionCommand {
    Connect {
        connection_id: ConnectionId,
        sender: mpsc::UnboundedSender<Message>,
    },
    Event {
        connection_id: ConnectionId,
        event: InboundEvent,
    },
    Disconnect {
        connection_id: ConnectionId,
    },
    PollExpired(PollId),
}

/// The single shared classroom: roster, connections and the current poll.
///
/// Owned by one task; every operation runs to completion before the next
/// command is taken from the inbox.
pub struct Session {
    registry: SessionRegistry,
    polls: PollLifecycle,
    hub: Hub,
    inbox: mpsc::UnboundedSender<SessionCommand>,
}

impl Session {
    pub fn new(default_timeout: Duration, inbox: mpsc::UnboundedSender<SessionCommand>) -> Self {
        Self {
            registry: SessionRegistry::new(),
            polls: PollLifecycle::new(default_timeout),
            hub: Hub::new(),
            inbox,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn polls(&self) -> &PollLifecycle {
        &self.polls
    }

    pub fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Connect {
                connection_id,
                sender,
            } => self.connect(connection_id, sender),
            SessionCommand::Event {
                connection_id,
                event,
            } => self.handle_event(&connection_id, event),
            SessionCommand::Disconnect { connection_id } => self.handle_disconnect(&connection_id),
            SessionCommand::PollExpired(poll_id) => self.expire(poll_id),
        }
    }

    pub fn connect(&mut self, connection_id: ConnectionId, sender: mpsc::UnboundedSender<Message>) {
        tracing::info!(connection_id = %connection_id, "New client connected");
        self.registry.connect(connection_id.clone());
        self.hub.add(connection_id, sender);
    }

    fn handle_event(&mut self, connection_id: &ConnectionId, event: InboundEvent) {
        if !self.registry.is_connected(connection_id) {
            tracing::debug!(
                connection_id = %connection_id,
                ?event,
                "Ignoring event from unbound connection"
            );
            return;
        }

        match event {
            InboundEvent::TeacherJoin => self.register_teacher(connection_id),
            InboundEvent::StudentJoin(name) => self.register_student(connection_id, &name),
            InboundEvent::CreateQuestion(question) => self.create_question(question),
            InboundEvent::SubmitAnswer(answer) => self.submit_answer_from(connection_id, answer),
            InboundEvent::KickStudent(name) => self.kick(&name),
        }
    }

    // Session registry operations

    pub fn register_teacher(&mut self, connection_id: &ConnectionId) {
        if self.registry.register_teacher(connection_id) {
            tracing::info!(connection_id = %connection_id, "Teacher joined");
        } else {
            tracing::warn!(connection_id = %connection_id, "Connection already joined, ignoring teacher-join");
        }
    }

    pub fn register_student(&mut self, connection_id: &ConnectionId, name: &str) {
        if !self.registry.register_student(connection_id, name) {
            tracing::warn!(
                connection_id = %connection_id,
                student = %name,
                "Connection already joined, ignoring student-join"
            );
            return;
        }

        tracing::info!(connection_id = %connection_id, student = %name, "Student joined");
        self.broadcast_roster();
    }

    pub fn remove_student(&mut self, name: &str) {
        if self.registry.remove_student(name) {
            self.broadcast_roster();
        } else {
            tracing::debug!(student = %name, "Student not on roster, nothing to remove");
        }
    }

    pub fn handle_disconnect(&mut self, connection_id: &ConnectionId) {
        self.hub.remove(connection_id);

        match self.registry.disconnect(connection_id) {
            Some(ConnectionRole::Student { name }) => {
                tracing::info!(connection_id = %connection_id, student = %name, "Student disconnected");
                self.remove_student(&name);
            }
            Some(_) => {}
            None => {
                tracing::debug!(connection_id = %connection_id, "Disconnect for unbound connection");
            }
        }

        tracing::info!(connection_id = %connection_id, "Socket closed");
    }

    pub fn kick(&mut self, name: &str) {
        let (removed, target) = self.registry.kick(name);
        self.broadcast_roster();

        let Some(connection_id) = target else {
            tracing::debug!(student = %name, removed, "No live connection holds kicked name");
            return;
        };

        tracing::info!(connection_id = %connection_id, student = %name, "Student kicked");

        if let Err(e) = self
            .hub
            .emit_to(&connection_id, &OutboundEvent::Kicked(name.to_string()))
        {
            tracing::warn!(
                connection_id = %connection_id,
                error = %e,
                "Failed to send kick notification"
            );
        }
        self.hub.disconnect(&connection_id);
    }

    // Poll lifecycle operations

    pub fn create_question(&mut self, question: Value) {
        let inbox = self.inbox.clone();
        let created = self
            .polls
            .create_question(question, |poll_id, timeout| {
                PollTimer::schedule(poll_id, timeout, inbox)
            })
            .map(|poll| (poll.id, poll.timeout, poll.question.clone()));

        let Some((poll_id, timeout, question)) = created else {
            tracing::warn!("Question already active, ignoring");
            return;
        };

        let label = question.get("question").cloned().unwrap_or_default();
        tracing::info!(
            poll_id = %poll_id,
            timeout_secs = timeout.as_secs_f64(),
            question = %label,
            "New question asked"
        );
        self.broadcast(OutboundEvent::NewQuestion(question));
    }

    fn submit_answer_from(&mut self, connection_id: &ConnectionId, answer: Value) {
        match self.registry.student_name(connection_id).map(String::from) {
            Some(name) => self.submit_answer(&name, answer),
            None => {
                tracing::debug!(
                    connection_id = %connection_id,
                    "Ignoring answer from connection that has not joined as a student"
                );
            }
        }
    }

    pub fn submit_answer(&mut self, student_name: &str, answer: Value) {
        let roster_size = self.registry.roster_size();
        let Some(submission) = self.polls.submit_answer(student_name, answer, roster_size) else {
            tracing::debug!(student = %student_name, "No active question, ignoring answer");
            return;
        };

        tracing::info!(
            student = %student_name,
            answered = submission.answers.len(),
            roster_size,
            "Answer received"
        );
        self.broadcast(OutboundEvent::LiveUpdate(submission.answers));

        if submission.all_answered {
            tracing::info!("All students answered, showing results early");
            self.resolve();
        }
    }

    pub fn resolve(&mut self) {
        if let Some(resolution) = self.polls.resolve() {
            tracing::info!(
                poll_id = %resolution.poll_id,
                answers = resolution.answers.len(),
                elapsed_ms = resolution.elapsed.as_millis() as u64,
                "Poll resolved"
            );
            self.broadcast(OutboundEvent::ShowResults(resolution.answers));
        }
    }

    fn expire(&mut self, poll_id: PollId) {
        match self.polls.expire(poll_id) {
            Some(resolution) => {
                tracing::info!(
                    poll_id = %poll_id,
                    answers = resolution.answers.len(),
                    "Poll timed out, showing results"
                );
                self.broadcast(OutboundEvent::ShowResults(resolution.answers));
            }
            None => {
                tracing::debug!(poll_id = %poll_id, "Ignoring expiry of a poll that already resolved");
            }
        }
    }

    fn broadcast_roster(&self) {
        self.broadcast(OutboundEvent::StudentList(self.registry.roster().names()));
    }

    fn broadcast(&self, event: OutboundEvent) {
        match self.hub.broadcast(&event) {
            Ok(delivered) => {
                tracing::debug!(event = event.name(), delivered, "Broadcast event");
            }
            Err(e) => {
                tracing::error!(event = event.name(), error = %e, "Failed to broadcast event");
            }
        }
    }
}

/// Handle to the running session task
#[derive(Clone)]
pub struct PollServer {
    inbox: mpsc::UnboundedSender<SessionCommand>,
}

impl PollServer {
    /// Spawns the session task and returns a handle to its inbox
    pub fn start(default_timeout: Duration) -> Self {
        let (inbox, commands) = mpsc::unbounded_channel();
        let session = Session::new(default_timeout, inbox.clone());

        tokio::spawn(run_session(session, commands));
        tracing::info!(
            default_timeout_secs = default_timeout.as_secs(),
            "Poll session started"
        );

        Self { inbox }
    }

    /// Registers a new connection whose outbound messages go to `sender`
    pub fn connect(&self, sender: mpsc::UnboundedSender<Message>) -> Result<ConnectionId> {
        let connection_id = ConnectionId::generate();
        self.send(SessionCommand::Connect {
            connection_id: connection_id.clone(),
            sender,
        })?;
        Ok(connection_id)
    }

    pub fn dispatch(&self, connection_id: &ConnectionId, event: InboundEvent) -> Result<()> {
        self.send(SessionCommand::Event {
            connection_id: connection_id.clone(),
            event,
        })
    }

    pub fn disconnect(&self, connection_id: &ConnectionId) -> Result<()> {
        self.send(SessionCommand::Disconnect {
            connection_id: connection_id.clone(),
        })
    }

    fn send(&self, command: SessionCommand) -> Result<()> {
        self.inbox.send(command).map_err(|_| PollError::SessionClosed)
    }
}

async fn run_session(mut session: Session, mut commands: mpsc::UnboundedReceiver<SessionCommand>) {
    while let Some(command) = commands.recv().await {
        session.handle(command);
    }
    tracing::info!("Poll session stopped");
}
