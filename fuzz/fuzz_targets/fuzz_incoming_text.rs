#![no_main]

mod utils;

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use nodedbg_protocol::wire::{parse_incoming, Incoming};
use nodedbg_protocol::{
    ChannelConfig, Command, CommandChannel, ContinueCommand, DefaultEvaluationResultFactory,
    EvaluationResultFactory, Handle, LookupCommand,
};
use serde_json::Value;

fn factory() -> Arc<dyn EvaluationResultFactory> {
    Arc::new(DefaultEvaluationResultFactory::new(64))
}

// Debuggee text must never panic the reader task, and any response body that parses must be
// safe to resolve, including cyclic and dangling handle graphs.
fn process_directly(text: &str) {
    let Incoming::Response {
        response: Ok(response),
        ..
    } = parse_incoming(text)
    else {
        return;
    };

    let mut handles: Vec<Handle> = response
        .body
        .as_ref()
        .and_then(Value::as_object)
        .map(|body| body.keys().filter_map(|key| key.parse().ok()).take(32).collect())
        .unwrap_or_default();
    handles.push(Handle::new(1));

    if let Ok(command) = LookupCommand::new(factory(), handles) {
        let _ = command.process_response(&response);
    }
}

// Route the same text through a live channel with commands pending under ids 1 and 2, once as
// is and once readdressed to each pending id.
async fn route_through_channel(text: &str) {
    let (ours, _theirs) = tokio::io::duplex(64 * 1024);
    let (read, write) = tokio::io::split(ours);
    let channel = CommandChannel::from_transport(read, write, ChannelConfig::default());

    let Ok(command) = LookupCommand::new(factory(), [Handle::new(1)]) else {
        return;
    };
    let Ok(mut lookup) = channel.send(command).await else {
        return;
    };
    let Ok(mut resume) = channel.send(ContinueCommand::new()).await else {
        return;
    };

    channel.on_incoming_text(text);
    if let Ok(Value::Object(mut message)) = serde_json::from_str::<Value>(text) {
        for seq in [lookup.seq(), resume.seq()] {
            message.insert("request_seq".into(), seq.into());
            channel.on_incoming_text(&Value::Object(message.clone()).to_string());
        }
    }

    let _ = lookup.state();
    let _ = resume.state();
    channel.close();
    let _ = lookup.wait().await;
    let _ = resume.wait().await;
    assert_eq!(channel.pending_count(), 0);
}

fuzz_target!(|data: &[u8]| {
    let Some(text) = utils::truncate_utf8(data) else {
        return;
    };
    process_directly(text);

    let Ok(runtime) = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    else {
        return;
    };
    runtime.block_on(route_through_channel(text));
});
