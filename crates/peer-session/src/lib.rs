//! Client-side specialization of the framed session (C6): subscribe,
//! publish, register, and locate against a broker, plus dynamic
//! installation of service-call operations once a method is located.
//!
//! Grounded on `betelbot`'s `client.py` (`BetelbotClientConnection`'s
//! `subscriptionHandlers` map and publish/subscribe/register/locate
//! methods) and `pathfinder.py` (a peer that both serves a located method
//! and republishes to topics). Per spec §9's design note, dynamic method
//! installation is modeled as a `map<method → address>` plus one generic
//! `invoke` entry point rather than runtime object mutation.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use rpc_protocol::Message;
use rpc_session::{CallError, FramedSession, HandlerFuture, MethodHandler, SessionHandle, SessionHooks};
use serde_json::Value;

/// A topic subscription callback. Returns `false` to ask for its own
/// removal from the topic's callback list — the Rust stand-in for "a
/// callback that raises on delivery is removed" (spec §4.6).
pub type SubscribeCallback = Arc<dyn Fn(&[Value]) -> bool + Send + Sync>;

/// Invoked after a `locate` attempt with the method name and whether it
/// succeeded.
pub type LocateCallback = Arc<dyn Fn(&str, bool) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("method {0} has not been located")]
    NotLocated(String),
    #[error("could not reach service: {0}")]
    Io(#[from] std::io::Error),
    #[error("service call failed: {0}")]
    Call(#[from] CallError),
}

type Subscriptions = Mutex<HashMap<String, Vec<SubscribeCallback>>>;
type Located = Mutex<HashMap<String, (String, u16)>>;

/// A long-lived session to the broker, plus the peer-side bookkeeping the
/// broker protocol requires: the local subscription callback map and the
/// located-service address map.
pub struct PeerSession {
    session: SessionHandle,
    subscriptions: Arc<Subscriptions>,
    located: Located,
}

impl PeerSession {
    /// Open the long-lived session to the broker at `addr`.
    pub async fn connect(addr: SocketAddr) -> std::io::Result<Arc<PeerSession>> {
        let subscriptions: Arc<Subscriptions> = Arc::new(Mutex::new(HashMap::new()));
        let handlers = build_handlers(subscriptions.clone());
        let session = FramedSession::connect(addr, handlers, SessionHooks::default()).await?;
        Ok(Arc::new(PeerSession {
            session,
            subscriptions,
            located: Mutex::new(HashMap::new()),
        }))
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Writes a `publish` notification: `[topic, ...params]`.
    pub fn publish(&self, topic: &str, params: &[Value]) {
        let mut wire_params = Vec::with_capacity(params.len() + 1);
        wire_params.push(Value::String(topic.to_owned()));
        wire_params.extend_from_slice(params);
        self.session.notify("publish", &wire_params);
    }

    /// Subscribes `callback` to `topic`. The wire `subscribe` notification
    /// is only sent on the first subscription to a given topic from this
    /// session; later calls just append the callback locally.
    pub fn subscribe(&self, topic: &str, callback: SubscribeCallback) {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let is_first = !subscriptions.contains_key(topic);
        subscriptions.entry(topic.to_owned()).or_default().push(callback);
        drop(subscriptions);

        if is_first {
            self.session.notify("subscribe", &[Value::String(topic.to_owned())]);
        }
    }

    /// Writes a `register` notification: `[method, port, host]`.
    pub fn register(&self, method: &str, port: u16, host: &str) {
        self.session.notify(
            "register",
            &[Value::String(method.to_owned()), Value::from(port), Value::String(host.to_owned())],
        );
    }

    /// Locate `method`. If already installed locally, `callback` fires
    /// synchronously with `true` and no broker round trip happens.
    /// Otherwise a `locate` request is issued; on success the returned
    /// `(host, port)` is installed and `callback(method, true)` fires, on
    /// failure `callback(method, false)` fires.
    pub async fn locate(&self, method: &str, callback: LocateCallback) {
        let ok = self.locate_and_install(method).await;
        callback(method, ok);
    }

    /// Locate every method in `methods` concurrently. `callback(true)`
    /// fires only if every locate succeeds; `callback(false)` fires as
    /// soon as any one definitively fails.
    pub async fn batch_locate(self: &Arc<Self>, methods: &[String], callback: Arc<dyn Fn(bool) + Send + Sync>) {
        let attempts = methods.iter().map(|method| {
            let this = self.clone();
            let method = method.clone();
            async move { this.locate_and_install(&method).await }
        });
        let results = futures_util::future::join_all(attempts).await;
        callback(results.into_iter().all(|ok| ok));
    }

    async fn locate_and_install(&self, method: &str) -> bool {
        if self.located.lock().unwrap().contains_key(method) {
            return true;
        }

        let result = match self.session.call("locate", &[Value::String(method.to_owned())]).await {
            Ok(result) => result,
            Err(err) => {
                tracing::debug!(%method, %err, "locate failed");
                return false;
            }
        };

        let Some((host, port)) = parse_locate_result(&result) else {
            tracing::debug!(%method, ?result, "locate response had an unexpected shape");
            return false;
        };
        self.located.lock().unwrap().insert(method.to_owned(), (host, port));
        true
    }

    /// The dynamic service operation (spec §4.6): open a fresh ephemeral
    /// session to the located `(host, port)`, send one request for
    /// `method`, and return its result. The ephemeral session is closed
    /// before this returns, so it never outlives a caller's continuation.
    pub async fn invoke(&self, method: &str, params: &[Value]) -> Result<Vec<Value>, InvokeError> {
        let (host, port) = self
            .located
            .lock()
            .unwrap()
            .get(method)
            .cloned()
            .ok_or_else(|| InvokeError::NotLocated(method.to_owned()))?;

        let addr = resolve(&host, port).await?;
        let ephemeral = FramedSession::connect(addr, HashMap::new(), SessionHooks::default()).await?;
        let result = ephemeral.call(method, params).await;
        ephemeral.close();
        Ok(result?)
    }

    /// Fire-and-forget variant of `invoke` for callers that want the
    /// callback-threaded calling convention the broker protocol was
    /// originally described with, rather than awaiting the future
    /// directly.
    pub fn call_service<F>(self: &Arc<Self>, method: &str, params: Vec<Value>, callback: F)
    where
        F: FnOnce(Result<Vec<Value>, InvokeError>) + Send + 'static,
    {
        let this = self.clone();
        let method = method.to_owned();
        tokio::spawn(async move {
            let result = this.invoke(&method, &params).await;
            callback(result);
        });
    }
}

async fn resolve(host: &str, port: u16) -> std::io::Result<SocketAddr> {
    let target = format!("{host}:{port}");
    if let Ok(addr) = target.parse::<SocketAddr>() {
        return Ok(addr);
    }
    tokio::net::lookup_host(&target)
        .await?
        .next()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, format!("no address for {target}")))
}

fn parse_locate_result(result: &[Value]) -> Option<(String, u16)> {
    let [port, host] = result else { return None };
    let port = u16::try_from(port.as_u64()?).ok()?;
    let host = host.as_str()?.to_owned();
    Some((host, port))
}

/// Builds the method-handler table a peer installs on its broker session:
/// just `notifysub`, dispatching to locally registered subscribers.
fn build_handlers(subscriptions: Arc<Subscriptions>) -> HashMap<String, MethodHandler> {
    let mut handlers: HashMap<String, MethodHandler> = HashMap::new();
    handlers.insert(
        "notifysub".to_owned(),
        Arc::new(move |message: Message, _session: SessionHandle| -> HandlerFuture {
            let subscriptions = subscriptions.clone();
            Box::pin(async move {
                let Message::Notification { params, .. } = message else {
                    return;
                };
                let Some((topic, data)) = params.split_first() else {
                    tracing::debug!("notifysub with no topic argument dropped");
                    return;
                };
                let Some(topic) = topic.as_str() else {
                    tracing::debug!(?topic, "notifysub topic argument was not a string");
                    return;
                };

                let mut subscriptions = subscriptions.lock().unwrap();
                if let Some(callbacks) = subscriptions.get_mut(topic) {
                    callbacks.retain(|callback| callback(data));
                }
            })
        }),
    );
    handlers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_locate_result_reads_port_then_host() {
        let result = vec![Value::from(7000), Value::from("h")];
        assert_eq!(parse_locate_result(&result), Some(("h".to_owned(), 7000)));
    }

    #[test]
    fn parse_locate_result_rejects_wrong_arity() {
        assert_eq!(parse_locate_result(&[Value::from(7000)]), None);
        assert_eq!(
            parse_locate_result(&[Value::from(7000), Value::from("h"), Value::from("extra")]),
            None
        );
    }
}
