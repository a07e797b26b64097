//! IPC messages exchanged between the orchestrator and its workers.
//!
//! On the wire every message is an envelope `{"tag": ..., "payload": ...}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Job, JobResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tag", content = "payload")]
pub enum Message {
    /// Orchestrator -> worker: a share of jobs to process.
    Members(Vec<Job>),
    /// Worker -> orchestrator: handshake for a `Members` dispatch.
    Received { count: usize },
    /// Terminal outcome of one job.
    Results(JobResult),
    StatsTriumphs(u32),
    StatsCollections(u32),
    StatsParallelProgram(Job),
    /// Any envelope whose tag is not one of the above.
    #[serde(skip)]
    Unrecognized { tag: String, payload: Value },
}

#[derive(Deserialize)]
struct Envelope {
    tag: String,
    #[serde(default)]
    payload: Value,
}

const KNOWN_TAGS: [&str; 6] = [
    "Members",
    "Received",
    "Results",
    "StatsTriumphs",
    "StatsCollections",
    "StatsParallelProgram",
];

impl Message {
    /// Decode one envelope. Unknown tags become `Unrecognized`; a known tag
    /// with a malformed payload is still an error.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        match serde_json::from_str::<Message>(text) {
            Ok(message) => Ok(message),
            Err(err) => {
                let envelope: Envelope = serde_json::from_str(text)?;
                if KNOWN_TAGS.contains(&envelope.tag.as_str()) {
                    return Err(err);
                }
                Ok(Message::Unrecognized {
                    tag: envelope.tag,
                    payload: envelope.payload,
                })
            }
        }
    }

    #[must_use]
    pub fn tag(&self) -> &str {
        match self {
            Message::Members(_) => "Members",
            Message::Received { .. } => "Received",
            Message::Results(_) => "Results",
            Message::StatsTriumphs(_) => "StatsTriumphs",
            Message::StatsCollections(_) => "StatsCollections",
            Message::StatsParallelProgram(_) => "StatsParallelProgram",
            Message::Unrecognized { tag, .. } => tag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Attempt, Outcome};

    #[test]
    fn envelope_shape() {
        let value = serde_json::to_value(Message::StatsTriumphs(3316003520)).unwrap();
        assert_eq!(value["tag"], "StatsTriumphs");
        assert_eq!(value["payload"], 3316003520u32);

        let value = serde_json::to_value(Message::Received { count: 12 }).unwrap();
        assert_eq!(value["payload"]["count"], 12);
    }

    #[test]
    fn decodes_results() {
        let result = JobResult::new(Outcome::Success, Attempt::first(Job::new(2, 99)));
        let text = serde_json::to_string(&Message::Results(result.clone())).unwrap();
        assert_eq!(Message::decode(&text).unwrap(), Message::Results(result));
    }

    #[test]
    fn unknown_tag_is_unrecognized() {
        let msg = Message::decode(r#"{"tag":"Hello","payload":null}"#).unwrap();
        assert_eq!(msg.tag(), "Hello");
        assert!(matches!(msg, Message::Unrecognized { .. }));
    }

    #[test]
    fn malformed_known_payload_is_error() {
        assert!(Message::decode(r#"{"tag":"StatsTriumphs","payload":"nope"}"#).is_err());
        assert!(Message::decode("not json").is_err());
    }
}
