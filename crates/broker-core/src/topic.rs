//! Named topics, each with a validator and a set of subscriber sessions.
//!
//! Modeled on `betelbot`'s `topic.py` validator classes (`ValueTopic`,
//! `CmdTopic`, `MoveTopic`, ...): a topic is a name plus a rule over its
//! published params, and the registry's fixed catalog mirrors the `msgs`
//! dict built at startup there.

use std::collections::HashMap;
use std::sync::RwLock;

use rpc_session::SessionHandle;
use serde_json::Value;

/// Validation rule applied to a topic's published params, per spec §4.3.
#[derive(Debug, Clone)]
pub enum Validator {
    /// Any params are accepted (location, waypoint, path, particles).
    Any,
    /// The first param must be a string drawn from this fixed set
    /// (command, power, mode).
    OneOf(Vec<&'static str>),
}

impl Validator {
    pub fn validate(&self, params: &[Value]) -> bool {
        match self {
            Validator::Any => true,
            Validator::OneOf(allowed) => match params.first() {
                Some(Value::String(s)) => allowed.contains(&s.as_str()),
                _ => false,
            },
        }
    }
}

pub struct Topic {
    pub name: String,
    pub validator: Validator,
}

/// The broker's topic table plus its per-topic subscriber sets.
///
/// The topic table itself is immutable after construction (spec: "topics
/// are created at broker startup from a fixed registry; no dynamic
/// creation on the wire"). Subscriber sets are the only mutable part and
/// live behind one `RwLock`, so a publish's fan-out read is always
/// consistent with the latest subscribe/unsubscribe.
pub struct TopicRegistry {
    topics: HashMap<String, Topic>,
    subscribers: RwLock<HashMap<String, Vec<SessionHandle>>>,
}

impl TopicRegistry {
    pub fn new(topics: Vec<Topic>) -> Self {
        let mut subscribers = HashMap::new();
        let mut by_name = HashMap::new();
        for topic in topics {
            subscribers.insert(topic.name.clone(), Vec::new());
            by_name.insert(topic.name.clone(), topic);
        }
        TopicRegistry {
            topics: by_name,
            subscribers: RwLock::new(subscribers),
        }
    }

    /// The reference catalog from spec §6: a small set of enum-constrained
    /// control topics plus a handful of unconstrained telemetry topics.
    pub fn reference_catalog() -> Self {
        TopicRegistry::new(vec![
            Topic {
                name: "command".to_owned(),
                validator: Validator::OneOf(vec!["stop", "go", "turn"]),
            },
            Topic {
                name: "power".to_owned(),
                validator: Validator::OneOf(vec!["on", "off"]),
            },
            Topic {
                name: "mode".to_owned(),
                validator: Validator::OneOf(vec!["manual", "autonomous"]),
            },
            Topic {
                name: "location".to_owned(),
                validator: Validator::Any,
            },
            Topic {
                name: "waypoint".to_owned(),
                validator: Validator::Any,
            },
            Topic {
                name: "path".to_owned(),
                validator: Validator::Any,
            },
            Topic {
                name: "particles".to_owned(),
                validator: Validator::Any,
            },
        ])
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    /// Idempotent: subscribing the same session twice to the same topic
    /// has the same effect as once.
    pub fn subscribe(&self, topic: &str, session: SessionHandle) {
        if !self.topics.contains_key(topic) {
            return;
        }
        let mut subscribers = self.subscribers.write().unwrap();
        let set = subscribers.entry(topic.to_owned()).or_default();
        if !set.contains(&session) {
            set.push(session);
        }
    }

    /// Validate, then fan out `notifysub(topic, params…)` to every
    /// subscriber in insertion order. Unknown topic or failed validation
    /// is a silent drop, per spec §4.3/§9 open question 1.
    pub fn publish(&self, topic: &str, params: &[Value]) {
        let Some(def) = self.topics.get(topic) else {
            tracing::debug!(%topic, "publish to unknown topic dropped");
            return;
        };
        if !def.validator.validate(params) {
            tracing::debug!(%topic, "publish with invalid params dropped");
            return;
        }

        let mut notifysub_params = Vec::with_capacity(params.len() + 1);
        notifysub_params.push(Value::String(topic.to_owned()));
        notifysub_params.extend_from_slice(params);

        let subscribers = self.subscribers.read().unwrap();
        if let Some(set) = subscribers.get(topic) {
            for session in set {
                session.notify("notifysub", &notifysub_params);
            }
        }
    }

    /// Remove `session` from every topic's subscriber set. Called from a
    /// session's close hook.
    pub fn unsubscribe_all(&self, session: &SessionHandle) {
        let mut subscribers = self.subscribers.write().unwrap();
        for set in subscribers.values_mut() {
            set.retain(|s| s != session);
        }
    }

    #[cfg(test)]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscribers.read().unwrap().get(topic).map_or(0, Vec::len)
    }
}
