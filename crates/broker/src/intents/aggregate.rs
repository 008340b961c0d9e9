//! Intent fan-out and result aggregation.

use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use switchboard_context::{Context, Identity};

use crate::error::{BrokerError, BrokerResult};
use crate::provider::{HandlerOutcome, Transport};

/// Combined result of every handler that ran.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Aggregated {
    pub data: Option<Value>,
    /// Window whose handler produced `data`.
    pub handled_by: Option<Identity>,
}

/// Dispatch `intent` to every target window concurrently and fold the
/// outcomes in the order they settle.
///
/// The first non-null value wins. Void and null results count as success
/// without a value. The call only fails when every outcome is an error;
/// a window that times out or cannot be reached contributes one error.
pub(crate) async fn aggregate(
    transport: &dyn Transport,
    targets: &[Identity],
    intent: &str,
    context: &Context,
    handler_timeout: Duration,
) -> BrokerResult<Aggregated> {
    let mut in_flight: FuturesUnordered<_> = targets
        .iter()
        .map(|target| async move {
            let outcomes = match tokio::time::timeout(
                handler_timeout,
                transport.deliver_intent(target, intent, context),
            )
            .await
            {
                Ok(Ok(outcomes)) => outcomes,
                Ok(Err(e)) => vec![Err(e.to_string())],
                Err(_) => vec![Err(format!(
                    "handler timed out after {}ms",
                    handler_timeout.as_millis()
                ))],
            };
            (target, outcomes)
        })
        .collect();

    let mut result: Option<Aggregated> = None;
    let mut successes = 0usize;
    let mut errors: Vec<String> = Vec::new();

    while let Some((target, outcomes)) = in_flight.next().await {
        for outcome in outcomes {
            match outcome {
                Ok(value) => {
                    successes += 1;
                    match value {
                        Some(value) if result.is_none() && !value.is_null() => {
                            result = Some(Aggregated {
                                data: Some(value),
                                handled_by: Some(target.clone()),
                            });
                        }
                        _ => {}
                    }
                }
                Err(e) => {
                    tracing::debug!(window = %target, intent, error = %e, "Intent handler failed");
                    errors.push(e);
                }
            }
        }
    }

    if let Some(result) = result {
        if !errors.is_empty() {
            tracing::debug!(intent, dropped = errors.len(), "Ignoring failed handlers");
        }
        return Ok(result);
    }
    if successes == 0 && !errors.is_empty() {
        return Err(BrokerError::HandlersFailed {
            intent: intent.to_string(),
            errors,
        });
    }
    Ok(Aggregated {
        data: None,
        handled_by: targets.first().cloned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ContextScope, TransportError};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use switchboard_events::WindowEvent;

    /// Answers each window with a fixed delay and outcome list.
    struct Scripted {
        replies: HashMap<String, (Duration, Result<Vec<HandlerOutcome>, TransportError>)>,
    }

    impl Scripted {
        fn new() -> Self {
            Self {
                replies: HashMap::new(),
            }
        }

        fn window(
            mut self,
            uuid: &str,
            delay_ms: u64,
            reply: Result<Vec<HandlerOutcome>, TransportError>,
        ) -> Self {
            self.replies
                .insert(uuid.to_string(), (Duration::from_millis(delay_ms), reply));
            self
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn deliver_context(
            &self,
            _to: &Identity,
            _scope: &ContextScope,
            _context: &Context,
        ) -> Result<(), TransportError> {
            Ok(())
        }

        async fn deliver_event(&self, _to: &Identity, _event: &WindowEvent) -> Result<(), TransportError> {
            Ok(())
        }

        async fn deliver_intent(
            &self,
            to: &Identity,
            _intent: &str,
            _context: &Context,
        ) -> Result<Vec<HandlerOutcome>, TransportError> {
            let (delay, reply) = self.replies.get(&to.uuid).cloned().unwrap();
            tokio::time::sleep(delay).await;
            reply
        }
    }

    fn id(uuid: &str) -> Identity {
        Identity::new(uuid, "w").unwrap()
    }

    fn ctx() -> Context {
        Context::new(json!({"type": "fdc3.instrument"})).unwrap()
    }

    const HANDLER_TIMEOUT: Duration = Duration::from_millis(1_000);

    #[tokio::test(start_paused = true)]
    async fn test_first_settled_value_wins() {
        let transport = Scripted::new()
            .window("slow", 50, Ok(vec![Ok(Some(json!("slow")))]))
            .window("fast", 10, Ok(vec![Ok(None), Ok(Some(json!("fast")))]));

        let result = aggregate(&transport, &[id("slow"), id("fast")], "I", &ctx(), HANDLER_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(result.data, Some(json!("fast")));
        assert_eq!(result.handled_by, Some(id("fast")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_void_resolves_to_none() {
        let transport = Scripted::new()
            .window("a", 0, Ok(vec![Ok(None)]))
            .window("b", 0, Ok(vec![Ok(Some(Value::Null))]));

        let result = aggregate(&transport, &[id("a"), id("b")], "I", &ctx(), HANDLER_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(result.data, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_outweighs_failures() {
        let transport = Scripted::new()
            .window("a", 0, Ok(vec![Err("boom".into())]))
            .window("b", 5, Ok(vec![Ok(Some(json!(1)))]));

        let result = aggregate(&transport, &[id("a"), id("b")], "I", &ctx(), HANDLER_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(result.data, Some(json!(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_and_transport_errors_count_as_failures() {
        let transport = Scripted::new()
            .window("hung", 60_000, Ok(vec![Ok(Some(json!("late")))]))
            .window("gone", 0, Err(TransportError::Failed("socket closed".into())));

        let err = aggregate(&transport, &[id("hung"), id("gone")], "I", &ctx(), HANDLER_TIMEOUT)
            .await
            .unwrap_err();
        match err {
            BrokerError::HandlersFailed { intent, errors } => {
                assert_eq!(intent, "I");
                assert_eq!(errors.len(), 2);
                assert!(errors[0].contains("socket closed"));
                assert!(errors[1].contains("timed out"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_outcomes_resolves_to_none() {
        let transport = Scripted::new().window("a", 0, Ok(Vec::new()));
        let result = aggregate(&transport, &[id("a")], "I", &ctx(), HANDLER_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(result.data, None);
    }
}
