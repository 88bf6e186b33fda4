use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::ServiceResult;
use crate::models::response::ResponseEnvelope;

/// One named business operation, dispatched by method name.
///
/// Handlers receive the whole `data` object of the inbound message
/// (`{method, request, ...}`) plus the correlation id, and return the reply
/// payload. A declared business failure is `Err(ServiceError::Service {..})`;
/// any other error is treated as unexpected by the subscriber.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Dispatch key. Must be non-empty and unique within a registry.
    fn name(&self) -> &str;

    async fn process(&self, data: &Value, corr_id: &str) -> ServiceResult<Value>;
}

pub type HandlerCtor = Arc<dyn Fn() -> Box<dyn Handler> + Send + Sync>;

/// Outcome of a dispatch: either the handler's reply payload, or a routing
/// miss carrying the 404 envelope. The miss is a value, not an error, so
/// callers cannot confuse it with a handler failure.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Reply(Value),
    NotFound(ResponseEnvelope),
}

impl DispatchOutcome {
    /// The value to send back to the caller, for either outcome.
    pub fn into_reply(self) -> Value {
        match self {
            DispatchOutcome::Reply(value) => value,
            DispatchOutcome::NotFound(envelope) => envelope.to_value(),
        }
    }
}

/// Mapping from method name to handler constructor.
///
/// Services build one registry per method namespace at startup (explicit
/// registration, no runtime discovery) and hand it to the subscriber behind
/// an `Arc`. Dispatch instantiates the handler fresh per call, so handlers
/// carry no state between messages.
pub struct HandlerRegistry {
    name: String,
    handlers: HashMap<String, HandlerCtor>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::named("default")
    }

    /// A named registry. Independent namespaces (one service running several
    /// dispatch tables) are simply independent named instances.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: HashMap::new(),
        }
    }

    /// Register a handler under the name its instances report.
    ///
    /// Registration with an empty name is refused. Re-registering a name
    /// overwrites the previous entry (last write wins).
    pub fn register<H, F>(&mut self, ctor: F)
    where
        H: Handler + 'static,
        F: Fn() -> H + Send + Sync + 'static,
    {
        self.register_ctor(Arc::new(move || Box::new(ctor())));
    }

    /// Type-erased registration, used by `register` and `register_batch`.
    pub fn register_ctor(&mut self, ctor: HandlerCtor) {
        let method = ctor().name().to_string();
        if method.is_empty() {
            warn!(registry = %self.name, "refusing to register handler with an empty name");
            return;
        }
        if self.handlers.insert(method.clone(), ctor).is_some() {
            warn!(registry = %self.name, method = %method, "handler overwritten");
        } else {
            debug!(registry = %self.name, method = %method, "handler registered");
        }
    }

    pub fn register_batch(&mut self, ctors: Vec<HandlerCtor>) {
        for ctor in ctors {
            self.register_ctor(ctor);
        }
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    pub fn methods(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Drop every registered handler. Exists for tests that need to rebuild
    /// the dispatch table.
    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    /// Route `data.method` to its handler and return the handler's result.
    ///
    /// A fresh handler instance is created per call. Errors raised by the
    /// handler propagate to the caller unchanged; an unknown or missing
    /// method yields `DispatchOutcome::NotFound` with the 404 envelope.
    pub async fn dispatch(&self, data: &Value, corr_id: &str) -> ServiceResult<DispatchOutcome> {
        let method = data.get("method").and_then(Value::as_str);
        info!(
            registry = %self.name,
            method = method.unwrap_or("<missing>"),
            corr_id = %corr_id,
            "dispatching method"
        );

        match method.and_then(|m| self.handlers.get(m)) {
            Some(ctor) => {
                let handler = ctor();
                info!(registry = %self.name, method = %handler.name(), "handler resolved");
                let result = handler.process(data, corr_id).await?;
                Ok(DispatchOutcome::Reply(result))
            }
            None => {
                warn!(
                    registry = %self.name,
                    method = method.unwrap_or("<missing>"),
                    "no handler covering this method"
                );
                Ok(DispatchOutcome::NotFound(ResponseEnvelope::text(
                    404,
                    "Method not found.",
                )))
            }
        }
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StaticHandler {
        name: &'static str,
        reply: Value,
    }

    #[async_trait]
    impl Handler for StaticHandler {
        fn name(&self) -> &str {
            self.name
        }

        async fn process(&self, _data: &Value, _corr_id: &str) -> ServiceResult<Value> {
            Ok(self.reply.clone())
        }
    }

    struct CountingHandler {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Handler for CountingHandler {
        fn name(&self) -> &str {
            "counting"
        }

        async fn process(&self, _data: &Value, _corr_id: &str) -> ServiceResult<Value> {
            let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(json!({ "calls": calls }))
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl Handler for FailingHandler {
        fn name(&self) -> &str {
            "failing"
        }

        async fn process(&self, _data: &Value, _corr_id: &str) -> ServiceResult<Value> {
            Err(ServiceError::handler_error("boom"))
        }
    }

    fn miss_envelope() -> Value {
        json!({"code": 404, "response": {"message": "Method not found."}})
    }

    #[tokio::test]
    async fn dispatch_routes_to_the_registered_handler() {
        let mut registry = HandlerRegistry::named("test");
        registry.register(|| StaticHandler {
            name: "a",
            reply: json!({"from": "a"}),
        });
        registry.register(|| StaticHandler {
            name: "b",
            reply: json!({"from": "b"}),
        });

        let outcome = registry
            .dispatch(&json!({"method": "b", "request": {"anything": [1, 2]}}), "cid")
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Reply(json!({"from": "b"})));
    }

    #[tokio::test]
    async fn duplicate_names_keep_the_last_registration() {
        let mut registry = HandlerRegistry::new();
        registry.register(|| StaticHandler {
            name: "dup",
            reply: json!("first"),
        });
        registry.register(|| StaticHandler {
            name: "dup",
            reply: json!("second"),
        });

        assert_eq!(registry.len(), 1);
        let outcome = registry
            .dispatch(&json!({"method": "dup"}), "cid")
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Reply(json!("second")));
    }

    #[tokio::test]
    async fn register_batch_registers_every_constructor() {
        let mut registry = HandlerRegistry::new();
        let ctors: Vec<HandlerCtor> = vec![
            Arc::new(|| {
                Box::new(StaticHandler {
                    name: "a",
                    reply: json!(1),
                })
            }),
            Arc::new(|| {
                Box::new(StaticHandler {
                    name: "b",
                    reply: json!(2),
                })
            }),
        ];
        registry.register_batch(ctors);

        assert_eq!(registry.len(), 2);
        let outcome = registry
            .dispatch(&json!({"method": "b"}), "cid")
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Reply(json!(2)));
    }

    #[tokio::test]
    async fn empty_names_are_refused() {
        let mut registry = HandlerRegistry::new();
        registry.register(|| StaticHandler {
            name: "",
            reply: json!(null),
        });
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn routing_miss_yields_the_404_envelope() {
        let mut registry = HandlerRegistry::new();
        registry.register(|| StaticHandler {
            name: "known",
            reply: json!(null),
        });

        for data in [
            json!({"method": "unknown"}),
            json!({}),
            json!({"method": null}),
        ] {
            let outcome = registry.dispatch(&data, "cid").await.unwrap();
            match outcome {
                DispatchOutcome::NotFound(envelope) => {
                    assert_eq!(envelope.to_value(), miss_envelope());
                }
                other => panic!("expected NotFound, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn each_dispatch_gets_a_fresh_handler_instance() {
        let mut registry = HandlerRegistry::new();
        registry.register(|| CountingHandler {
            calls: AtomicU32::new(0),
        });

        for _ in 0..2 {
            let outcome = registry
                .dispatch(&json!({"method": "counting"}), "cid")
                .await
                .unwrap();
            assert_eq!(outcome, DispatchOutcome::Reply(json!({"calls": 1})));
        }
    }

    #[tokio::test]
    async fn handler_errors_propagate_unchanged() {
        let mut registry = HandlerRegistry::new();
        registry.register(|| FailingHandler);

        let err = registry
            .dispatch(&json!({"method": "failing"}), "cid")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Handler(msg) if msg == "boom"));
    }

    #[tokio::test]
    async fn clear_resets_the_registry() {
        let mut registry = HandlerRegistry::new();
        registry.register(|| StaticHandler {
            name: "x",
            reply: json!(null),
        });
        assert!(registry.contains("x"));
        registry.clear();
        assert!(registry.is_empty());

        let outcome = registry.dispatch(&json!({"method": "x"}), "cid").await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::NotFound(_)));
    }

    #[tokio::test]
    async fn into_reply_unwraps_both_outcomes() {
        assert_eq!(
            DispatchOutcome::Reply(json!({"ok": true})).into_reply(),
            json!({"ok": true})
        );
        assert_eq!(
            DispatchOutcome::NotFound(ResponseEnvelope::text(404, "Method not found."))
                .into_reply(),
            miss_envelope()
        );
    }
}
