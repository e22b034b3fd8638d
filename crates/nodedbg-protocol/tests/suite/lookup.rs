use std::sync::Arc;

use nodedbg_protocol::wire::{encode_request, Response};
use nodedbg_protocol::{
    Command, DebuggerError, EvaluationResult, EvaluationResultFactory, Handle, LookupCommand,
    NodeVariable, ValueType,
};
use serde_json::json;

use super::support::{
    composite_lookup_body, counting_factory, default_factory, primitive_lookup_body,
};

fn response(body: serde_json::Value, refs: serde_json::Value) -> Response {
    serde_json::from_value(json!({
        "seq": 40,
        "request_seq": 3,
        "type": "response",
        "command": "lookup",
        "success": true,
        "running": false,
        "body": body,
        "refs": refs,
    }))
    .unwrap()
}

#[test]
fn lookup_request_matches_wire_shape() {
    let command = LookupCommand::new(default_factory(), [Handle::new(25)]).unwrap();
    let bytes = encode_request(3, &command).unwrap();
    assert_eq!(
        String::from_utf8(bytes).unwrap(),
        r#"{"command":"lookup","seq":3,"type":"request","arguments":{"handles":[25],"includeSource":false}}"#
    );
}

#[test]
fn lookup_request_is_deterministic() {
    let handles = [7, 3, 7, 12, 3, 1].map(Handle::new);
    let first = LookupCommand::new(default_factory(), handles).unwrap();
    let second = LookupCommand::new(default_factory(), handles).unwrap();

    let a = encode_request(41, &first).unwrap();
    assert_eq!(a, encode_request(41, &first).unwrap());
    assert_eq!(a, encode_request(41, &second).unwrap());
    assert_eq!(
        String::from_utf8(a).unwrap(),
        r#"{"command":"lookup","seq":41,"type":"request","arguments":{"handles":[7,3,12,1],"includeSource":false}}"#
    );
}

#[test]
fn composite_handle_resolves_with_at_least_one_factory_call() {
    let factory = counting_factory();
    let command = LookupCommand::new(factory.clone(), [Handle::new(25)]).unwrap();
    let (body, refs) = composite_lookup_body();

    let results = command.process_response(&response(body, refs)).unwrap();

    let root = results.get(Handle::new(25)).expect("result for 25");
    assert_eq!(root.value_type, ValueType::Object);
    assert!(factory.calls_for(Handle::new(25)) >= 1);
    assert!(!factory.calls().is_empty());

    // The self reference resolves to the root; the missing ref stays unresolved.
    let self_ref = root.children.iter().find(|c| c.name == "self").unwrap();
    assert_eq!(results.graph().resolve(self_ref).unwrap().handle, Handle::new(25));
    let missing = root.children.iter().find(|c| c.name == "missing").unwrap();
    assert!(!missing.is_resolved());
    assert!(results.graph().resolve(missing).is_none());
    let count = root.children.iter().find(|c| c.name == "count").unwrap();
    assert_eq!(results.graph().resolve(count).unwrap().display_value, "3");
}

#[test]
fn primitive_handle_invokes_factory_exactly_once() {
    let factory = counting_factory();
    let command = LookupCommand::new(factory.clone(), [Handle::new(9)]).unwrap();

    let results = command
        .process_response(&response(primitive_lookup_body(), json!([])))
        .unwrap();

    let result = results.get(Handle::new(9)).expect("result for 9");
    assert_eq!(result.display_value, "42");
    assert_eq!(factory.calls(), vec![Handle::new(9)]);
}

#[test]
fn absent_handles_are_absent_from_results() {
    let command =
        LookupCommand::new(default_factory(), [Handle::new(9), Handle::new(10)]).unwrap();

    let results = command
        .process_response(&response(primitive_lookup_body(), json!([])))
        .unwrap();

    assert_eq!(results.len(), 1);
    assert!(results.contains(Handle::new(9)));
    assert!(results.get(Handle::new(10)).is_none());
}

#[test]
fn mutually_referencing_values_resolve() {
    let factory = counting_factory();
    let command = LookupCommand::new(factory.clone(), [Handle::new(1)]).unwrap();
    let body = json!({
        "1": {"handle": 1, "type": "object", "className": "Node",
              "properties": [{"name": "next", "ref": 2}]}
    });
    let refs = json!([
        {"handle": 2, "type": "object", "className": "Node",
         "properties": [{"name": "next", "ref": 1}]}
    ]);

    let results = command.process_response(&response(body, refs)).unwrap();

    let a = results.get(Handle::new(1)).unwrap();
    let b = results.graph().resolve(&a.children[0]).unwrap();
    assert_eq!(b.handle, Handle::new(2));
    assert_eq!(results.graph().resolve(&b.children[0]).unwrap().handle, Handle::new(1));
    assert_eq!(factory.calls_for(Handle::new(1)), 1);
    assert_eq!(factory.calls_for(Handle::new(2)), 1);
}

#[test]
fn body_descriptors_take_precedence_over_refs() {
    let command = LookupCommand::new(default_factory(), [Handle::new(9)]).unwrap();
    let refs = json!([{"handle": 9, "type": "string", "value": "stale"}]);

    let results = command
        .process_response(&response(primitive_lookup_body(), refs))
        .unwrap();

    assert_eq!(results.get(Handle::new(9)).unwrap().value_type, ValueType::Number);
}

#[test]
fn factory_is_swappable() {
    struct Upper;
    impl EvaluationResultFactory for Upper {
        fn create(&self, variable: &NodeVariable<'_>) -> EvaluationResult {
            let mut result = EvaluationResult::new(variable.handle);
            result.display_value = variable.descriptor.type_tag.to_uppercase();
            result
        }
    }

    let command = LookupCommand::new(Arc::new(Upper), [Handle::new(9)]).unwrap();
    let results = command
        .process_response(&response(primitive_lookup_body(), json!([])))
        .unwrap();
    assert_eq!(results.get(Handle::new(9)).unwrap().display_value, "NUMBER");
}

#[test]
fn empty_handle_set_is_rejected() {
    assert!(matches!(
        LookupCommand::new(default_factory(), []),
        Err(DebuggerError::InvalidArgument(_))
    ));
}
