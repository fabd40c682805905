//! Broker-side state (C3 topic registry + C4 service registry) and the
//! method-handler table that wires them into a `rpc_session::FramedSession`
//! (C5's composition of C2/C3/C4, spec §4.5).
//!
//! Grounded on the teacher's `services/server/src/state.rs` `AppState`:
//! one process-wide value holding the registries, passed by reference into
//! every accepted session rather than reached for as a global.

mod service;
mod topic;

use std::collections::HashMap;
use std::sync::Arc;

use rpc_protocol::{error_codes, Message, RpcError};
use rpc_session::{HandlerFuture, MethodHandler, SessionHandle, SessionHooks};
use serde_json::Value;

pub use service::{ServiceRecord, ServiceRegistry};
pub use topic::{Topic, TopicRegistry, Validator};

/// Process-wide broker state: the topic table plus the service table.
/// Never persisted, constructed once at startup.
pub struct BrokerState {
    pub topics: TopicRegistry,
    pub services: ServiceRegistry,
}

impl BrokerState {
    pub fn new() -> Self {
        BrokerState {
            topics: TopicRegistry::reference_catalog(),
            services: ServiceRegistry::new(),
        }
    }
}

impl Default for BrokerState {
    fn default() -> Self {
        BrokerState::new()
    }
}

/// Build the method-handler table a broker installs on every accepted
/// session: `publish`, `subscribe`, `register`, `locate` (spec §4.5's
/// table). `notifysub` is emitted, never received, so it has no handler.
pub fn method_handlers(state: Arc<BrokerState>) -> HashMap<String, MethodHandler> {
    let mut handlers: HashMap<String, MethodHandler> = HashMap::new();

    {
        let state = state.clone();
        handlers.insert(
            "publish".to_owned(),
            Arc::new(move |message: Message, _session: SessionHandle| -> HandlerFuture {
                let state = state.clone();
                Box::pin(async move {
                    let Message::Notification { params, .. } = message else {
                        return;
                    };
                    let Some((topic, data)) = split_topic(&params) else {
                        tracing::debug!("publish notification with no topic argument dropped");
                        return;
                    };
                    state.topics.publish(topic, data);
                })
            }),
        );
    }

    {
        let state = state.clone();
        handlers.insert(
            "subscribe".to_owned(),
            Arc::new(move |message: Message, session: SessionHandle| -> HandlerFuture {
                let state = state.clone();
                Box::pin(async move {
                    let Message::Notification { params, .. } = message else {
                        return;
                    };
                    let Some(topic) = params.first().and_then(Value::as_str) else {
                        tracing::debug!("subscribe notification with no topic argument dropped");
                        return;
                    };
                    state.topics.subscribe(topic, session);
                })
            }),
        );
    }

    {
        let state = state.clone();
        handlers.insert(
            "register".to_owned(),
            Arc::new(move |message: Message, session: SessionHandle| -> HandlerFuture {
                let state = state.clone();
                Box::pin(async move {
                    let Message::Notification { params, .. } = message else {
                        return;
                    };
                    match parse_register_params(&params) {
                        Some((method, port, host)) => {
                            state.services.register(method, host, port, session.id());
                        }
                        None => tracing::debug!(?params, "register notification with malformed params dropped"),
                    }
                })
            }),
        );
    }

    {
        let state = state.clone();
        handlers.insert(
            "locate".to_owned(),
            Arc::new(move |message: Message, session: SessionHandle| -> HandlerFuture {
                let state = state.clone();
                Box::pin(async move {
                    let Message::Request { id, params, .. } = message else {
                        return;
                    };
                    let Some(method) = params.first().and_then(Value::as_str) else {
                        session.respond_error(&id, &RpcError::invalid_params());
                        return;
                    };
                    match state.services.locate(method) {
                        Some(record) => {
                            session.respond(&id, &[Value::from(record.port), Value::String(record.host)]);
                        }
                        None => session.respond_error(
                            &id,
                            &RpcError::new(error_codes::METHOD_NOT_FOUND, "Method not found"),
                        ),
                    }
                })
            }),
        );
    }

    handlers
}

/// The close hook a broker installs on every accepted session: purges the
/// session's subscriptions and any service records it still owns (spec
/// §4.3 "on session close", DESIGN.md open question 2).
pub fn close_hook(state: Arc<BrokerState>) -> SessionHooks {
    SessionHooks {
        on_close: Some(Arc::new(move |session: SessionHandle| -> HandlerFuture {
            let state = state.clone();
            Box::pin(async move {
                state.topics.unsubscribe_all(&session);
                state.services.remove_owned_by(session.id());
            })
        })),
    }
}

fn split_topic(params: &[Value]) -> Option<(&str, &[Value])> {
    let topic = params.first()?.as_str()?;
    Some((topic, &params[1..]))
}

/// `register` params are `[method, port, host]` per spec §6's wire table
/// (the one place the spec is explicit about an ordering the original
/// source left ambiguous — see DESIGN.md open question 4).
fn parse_register_params(params: &[Value]) -> Option<(&str, u16, &str)> {
    let method = params.first()?.as_str()?;
    let port = params.get(1)?.as_u64()?;
    let host = params.get(2)?.as_str()?;
    Some((method, u16::try_from(port).ok()?, host))
}
