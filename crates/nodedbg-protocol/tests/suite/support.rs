use std::sync::{Arc, Mutex};
use std::time::Duration;

use nodedbg_protocol::mock::MockDebuggee;
use nodedbg_protocol::{
    ChannelConfig, CommandChannel, DefaultEvaluationResultFactory, EvaluationResult,
    EvaluationResultFactory, Handle, NodeVariable,
};
use serde_json::{json, Value};

/// Records every handle it is asked to build a result for.
#[derive(Default)]
pub struct CountingFactory {
    inner: DefaultEvaluationResultFactory,
    calls: Mutex<Vec<Handle>>,
}

impl CountingFactory {
    pub fn calls(&self) -> Vec<Handle> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, handle: Handle) -> usize {
        self.calls().iter().filter(|h| **h == handle).count()
    }
}

impl EvaluationResultFactory for CountingFactory {
    fn create(&self, variable: &NodeVariable<'_>) -> EvaluationResult {
        self.calls.lock().unwrap().push(variable.handle);
        self.inner.create(variable)
    }
}

pub fn counting_factory() -> Arc<CountingFactory> {
    Arc::new(CountingFactory::default())
}

pub fn default_factory() -> Arc<dyn EvaluationResultFactory> {
    Arc::new(DefaultEvaluationResultFactory::default())
}

pub fn fast_config() -> ChannelConfig {
    ChannelConfig {
        handshake_timeout: Duration::from_secs(5),
        reply_timeout: Duration::from_secs(5),
        sweep_interval: Duration::from_millis(10),
        event_channel_size: 16,
    }
}

pub async fn connect(mock: &MockDebuggee, config: ChannelConfig) -> CommandChannel {
    let (channel, _info) = CommandChannel::connect_with_config(mock.addr(), config)
        .await
        .expect("connect to mock debuggee");
    channel
}

/// Lookup body for handle 25: an object with a primitive child and a self reference.
pub fn composite_lookup_body() -> (Value, Value) {
    let body = json!({
        "25": {
            "handle": 25,
            "type": "object",
            "className": "Object",
            "constructorFunction": {"ref": 26},
            "protoObject": {"ref": 27},
            "properties": [
                {"name": "count", "propertyType": 1, "ref": 28},
                {"name": "self", "propertyType": 1, "ref": 25},
                {"name": "missing", "propertyType": 1, "ref": 99}
            ],
            "text": "#<Object>"
        }
    });
    let refs = json!([
        {"handle": 28, "type": "number", "value": 3, "text": "3"}
    ]);
    (body, refs)
}

/// Lookup body for handle 9: a bare number.
pub fn primitive_lookup_body() -> Value {
    json!({
        "9": {"handle": 9, "type": "number", "value": 42, "text": "42"}
    })
}
