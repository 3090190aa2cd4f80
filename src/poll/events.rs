use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::lifecycle::AnswerSet;

/// Events sent by clients. Frames look like `{"event": "student-join", "data": "Ada"}`.
///
/// Payloads are untrusted: a missing `data` is read as null and names of
/// any JSON type are accepted. Only the event name must be known.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "EventFrame")]
pub enum InboundEvent {
    TeacherJoin,

    StudentJoin(String),

    /// Opaque question payload, forwarded as received.
    CreateQuestion(Value),

    SubmitAnswer(Value),

    KickStudent(String),
}

#[derive(Deserialize)]
struct EventFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

impl TryFrom<EventFrame> for InboundEvent {
    type Error = String;

    fn try_from(frame: EventFrame) -> Result<Self, Self::Error> {
        let event = match frame.event.as_str() {
            "teacher-join" => InboundEvent::TeacherJoin,
            "student-join" => InboundEvent::StudentJoin(display_name(frame.data)),
            "create-question" => InboundEvent::CreateQuestion(frame.data),
            "submit-answer" => InboundEvent::SubmitAnswer(frame.data),
            "kick-student" => InboundEvent::KickStudent(display_name(frame.data)),
            other => return Err(format!("unknown event {:?}", other)),
        };
        Ok(event)
    }
}

/// Strings are taken as-is, null becomes the empty name and anything else
/// its JSON text.
fn display_name(data: Value) -> String {
    match data {
        Value::String(name) => name,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Events pushed to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum OutboundEvent {
    StudentList(Vec<String>),

    NewQuestion(Value),

    LiveUpdate(AnswerSet),

    ShowResults(AnswerSet),

    Kicked(String),
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::StudentList(_) => "student-list",
            OutboundEvent::NewQuestion(_) => "new-question",
            OutboundEvent::LiveUpdate(_) => "live-update",
            OutboundEvent::ShowResults(_) => "show-results",
            OutboundEvent::Kicked(_) => "kicked",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_teacher_join_without_data() {
        let event: InboundEvent = serde_json::from_str(r#"{"event":"teacher-join"}"#).unwrap();
        assert_eq!(event, InboundEvent::TeacherJoin);
    }

    #[test]
    fn test_parse_student_join() {
        let event: InboundEvent =
            serde_json::from_str(r#"{"event":"student-join","data":"Ada"}"#).unwrap();
        assert_eq!(event, InboundEvent::StudentJoin("Ada".to_string()));
    }

    #[test]
    fn test_parse_create_question_keeps_payload() {
        let raw = json!({
            "event": "create-question",
            "data": {"question": "2+2?", "options": ["3", "4"], "timer": 30}
        });
        let event: InboundEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(
            event,
            InboundEvent::CreateQuestion(
                json!({"question": "2+2?", "options": ["3", "4"], "timer": 30})
            )
        );
    }

    #[test]
    fn test_parse_non_string_names() {
        let event: InboundEvent =
            serde_json::from_str(r#"{"event":"student-join","data":42}"#).unwrap();
        assert_eq!(event, InboundEvent::StudentJoin("42".to_string()));

        let event: InboundEvent =
            serde_json::from_str(r#"{"event":"kick-student","data":{"name":"Ada"}}"#).unwrap();
        assert_eq!(event, InboundEvent::KickStudent(r#"{"name":"Ada"}"#.to_string()));

        let event: InboundEvent = serde_json::from_str(r#"{"event":"student-join"}"#).unwrap();
        assert_eq!(event, InboundEvent::StudentJoin(String::new()));
    }

    #[test]
    fn test_parse_submit_answer_without_data() {
        let event: InboundEvent = serde_json::from_str(r#"{"event":"submit-answer"}"#).unwrap();
        assert_eq!(event, InboundEvent::SubmitAnswer(Value::Null));

        let event: InboundEvent =
            serde_json::from_str(r#"{"event":"submit-answer","data":["b","c"]}"#).unwrap();
        assert_eq!(event, InboundEvent::SubmitAnswer(json!(["b", "c"])));
    }

    #[test]
    fn test_parse_frame_without_event_fails() {
        assert!(serde_json::from_str::<InboundEvent>(r#"{"data":"Ada"}"#).is_err());
        assert!(serde_json::from_str::<InboundEvent>(r#""student-join""#).is_err());
    }

    #[test]
    fn test_parse_unknown_event_fails() {
        let result = serde_json::from_str::<InboundEvent>(r#"{"event":"drop-tables"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_serialize_student_list() {
        let event = OutboundEvent::StudentList(vec!["Ada".to_string(), "Alan".to_string()]);
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"event": "student-list", "data": ["Ada", "Alan"]})
        );
        assert_eq!(event.name(), "student-list");
    }

    #[test]
    fn test_serialize_results() {
        let mut answers = AnswerSet::default();
        answers.record("Ada", json!("4"));
        let event = OutboundEvent::ShowResults(answers);
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"event": "show-results", "data": {"Ada": "4"}})
        );
    }
}
