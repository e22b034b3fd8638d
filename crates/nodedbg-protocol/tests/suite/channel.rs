use std::collections::HashSet;
use std::time::Duration;

use nodedbg_protocol::mock::{MockDebuggee, MockReply};
use nodedbg_protocol::wire::{FrameReader, FrameWriter};
use nodedbg_protocol::{
    CommandChannel, CommandState, ContinueCommand, DebuggerError, EvaluateCommand, Handle,
    LookupCommand, StepAction,
};
use serde_json::{json, Value};
use tokio::io::{duplex, split};

use super::support::{
    composite_lookup_body, connect, counting_factory, default_factory, fast_config,
    primitive_lookup_body,
};

#[tokio::test]
async fn lookup_round_trip_over_tcp() {
    let mock = MockDebuggee::spawn().await.unwrap();
    let (body, refs) = composite_lookup_body();
    mock.script("lookup", MockReply::success(body).with_refs(refs));
    let channel = connect(&mock, fast_config()).await;

    let factory = counting_factory();
    let command = LookupCommand::new(factory.clone(), [Handle::new(25)]).unwrap();
    let results = channel.execute(command).await.unwrap();

    assert!(results.contains(Handle::new(25)));
    assert!(factory.calls_for(Handle::new(25)) >= 1);
    assert_eq!(channel.pending_count(), 0);

    let requests = mock.requests().await;
    assert_eq!(
        requests[0],
        json!({
            "command": "lookup",
            "seq": 1,
            "type": "request",
            "arguments": {"handles": [25], "includeSource": false},
        })
    );
}

#[tokio::test]
async fn replies_are_routed_out_of_order() {
    let mock = MockDebuggee::spawn().await.unwrap();
    mock.script(
        "lookup",
        MockReply::success(primitive_lookup_body()).with_delay(Duration::from_millis(300)),
    );
    mock.script(
        "evaluate",
        MockReply::success(json!({"handle": 4, "type": "string", "value": "ok", "length": 2})),
    );
    let channel = connect(&mock, fast_config()).await;

    let slow = channel
        .send(LookupCommand::new(default_factory(), [Handle::new(9)]).unwrap())
        .await
        .unwrap();
    let fast = channel
        .send(EvaluateCommand::new(default_factory(), "status").unwrap())
        .await
        .unwrap();
    assert!(slow.seq() < fast.seq());

    let outcome = fast.wait().await.unwrap();
    assert_eq!(outcome.result.display_value, "\"ok\"");
    // The earlier command is still waiting for its delayed reply.
    assert_eq!(channel.pending_count(), 1);

    let results = slow.wait().await.unwrap();
    assert_eq!(results.get(Handle::new(9)).unwrap().display_value, "42");
}

#[tokio::test]
async fn timeout_fails_only_the_overdue_command_and_late_reply_is_discarded() {
    let mock = MockDebuggee::spawn().await.unwrap();
    mock.script("lookup", MockReply::dropped());
    mock.script(
        "continue",
        MockReply::success(json!({}))
            .with_running(true)
            .with_delay(Duration::from_millis(100)),
    );
    let mut config = fast_config();
    config.reply_timeout = Duration::from_millis(200);
    let channel = connect(&mock, config).await;

    let mut timed_out = channel
        .send(LookupCommand::new(default_factory(), [Handle::new(9)]).unwrap())
        .await
        .unwrap();
    let late_seq = timed_out.seq();
    tokio::time::timeout(Duration::from_secs(5), async {
        while timed_out.state() == CommandState::Sent {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(timed_out.state(), CommandState::TimedOut);
    assert!(matches!(timed_out.wait().await, Err(DebuggerError::Timeout)));

    let mut resumed = channel.send(ContinueCommand::new()).await.unwrap();

    // The debuggee answers the timed out command after all.
    channel.on_incoming_text(
        &json!({
            "seq": 99,
            "request_seq": late_seq,
            "type": "response",
            "command": "lookup",
            "success": true,
            "body": primitive_lookup_body(),
        })
        .to_string(),
    );
    assert_eq!(resumed.state(), CommandState::Sent);
    assert_eq!(channel.pending_count(), 1);

    assert!(resumed.wait().await.unwrap());
    assert!(!channel.is_closed());
}

#[tokio::test]
async fn teardown_cancels_pending_commands() {
    let mock = MockDebuggee::spawn().await.unwrap();
    mock.script("lookup", MockReply::dropped());
    mock.script("continue", MockReply::dropped());
    let channel = connect(&mock, fast_config()).await;

    let lookup = channel
        .send(LookupCommand::new(default_factory(), [Handle::new(1)]).unwrap())
        .await
        .unwrap();
    let step = channel
        .send(ContinueCommand::step(StepAction::In, 1).unwrap())
        .await
        .unwrap();
    assert_eq!(channel.pending_count(), 2);

    channel.close();

    assert!(matches!(lookup.wait().await, Err(DebuggerError::Cancelled)));
    assert!(matches!(step.wait().await, Err(DebuggerError::Cancelled)));
    assert_eq!(channel.pending_count(), 0);
    assert!(matches!(
        channel.send(ContinueCommand::new()).await,
        Err(DebuggerError::ChannelClosed)
    ));
}

#[tokio::test]
async fn failure_reply_becomes_command_failed() {
    let mock = MockDebuggee::spawn().await.unwrap();
    mock.script("evaluate", MockReply::failure("ReferenceError: nope is not defined"));
    let channel = connect(&mock, fast_config()).await;

    let err = channel
        .execute(EvaluateCommand::new(default_factory(), "nope").unwrap())
        .await
        .unwrap_err();
    match err {
        DebuggerError::CommandFailed { command, message } => {
            assert_eq!(command, "evaluate");
            assert!(message.contains("ReferenceError"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn malformed_body_fails_one_command_and_channel_stays_usable() {
    let mock = MockDebuggee::spawn().await.unwrap();
    mock.script("lookup", MockReply::success(json!(["not", "a", "map"])));
    mock.script("lookup", MockReply::success(primitive_lookup_body()));
    let channel = connect(&mock, fast_config()).await;

    let err = channel
        .execute(LookupCommand::new(default_factory(), [Handle::new(9)]).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, DebuggerError::Protocol(_)), "{err:?}");

    let results = channel
        .execute(LookupCommand::new(default_factory(), [Handle::new(9)]).unwrap())
        .await
        .unwrap();
    assert!(results.contains(Handle::new(9)));
}

#[tokio::test]
async fn unroutable_text_is_ignored() {
    let mock = MockDebuggee::spawn().await.unwrap();
    mock.script("continue", MockReply::success(json!({})).with_running(true));
    let channel = connect(&mock, fast_config()).await;

    mock.send_raw("this is not json").await.unwrap();
    mock.send_raw(r#"{"seq":5,"request_seq":12345,"type":"response","command":"lookup","success":true}"#)
        .await
        .unwrap();
    mock.send_raw(r#"{"type":"response","success":true}"#)
        .await
        .unwrap();

    assert!(channel.execute(ContinueCommand::new()).await.unwrap());
    assert!(!channel.is_closed());
}

#[tokio::test]
async fn events_are_broadcast() {
    let mock = MockDebuggee::spawn().await.unwrap();
    let channel = connect(&mock, fast_config()).await;
    let mut events = channel.subscribe_events();

    mock.send_event("break", json!({"sourceLine": 12, "script": {"name": "app.js"}}))
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.event, "break");
    assert_eq!(event.body.unwrap()["sourceLine"], 12);
}

#[tokio::test]
async fn debuggee_exit_fails_pending_commands() {
    let mock = MockDebuggee::spawn().await.unwrap();
    mock.script("continue", MockReply::dropped());
    let channel = connect(&mock, fast_config()).await;
    let token = channel.shutdown_token();

    let pending = channel.send(ContinueCommand::new()).await.unwrap();
    // Make sure the request reached the mock before it hangs up.
    tokio::time::timeout(Duration::from_secs(5), async {
        while mock.requests().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    mock.disconnect();

    assert!(matches!(
        pending.wait().await,
        Err(DebuggerError::ConnectionClosed)
    ));
    tokio::time::timeout(Duration::from_secs(5), token.cancelled())
        .await
        .unwrap();
    assert!(matches!(
        channel.send(ContinueCommand::new()).await,
        Err(DebuggerError::ChannelClosed)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_senders_get_unique_ids_and_their_own_replies() {
    const SENDERS: usize = 16;
    let (ours, theirs) = duplex(256 * 1024);
    let (read, write) = split(ours);
    let channel = CommandChannel::from_transport(read, write, fast_config());
    let (peer_read, peer_write) = split(theirs);

    let peer = tokio::spawn(async move {
        let mut reader = FrameReader::new(peer_read);
        let mut writer = FrameWriter::new(peer_write);
        let mut requests = Vec::new();
        for _ in 0..SENDERS {
            let frame = reader.read_frame().await.unwrap().unwrap();
            requests.push(serde_json::from_slice::<Value>(&frame.body).unwrap());
        }
        // Answer newest first, echoing each request's expression back as a string value.
        for request in requests.iter().rev() {
            let seq = request["seq"].as_u64().unwrap();
            let expression = request["arguments"]["expression"].as_str().unwrap();
            let reply = json!({
                "seq": 1000 + seq,
                "request_seq": seq,
                "type": "response",
                "command": "evaluate",
                "success": true,
                "body": {
                    "handle": seq,
                    "type": "string",
                    "value": expression,
                    "length": expression.len(),
                },
            });
            writer
                .write_message(reply.to_string().as_bytes())
                .await
                .unwrap();
        }
        requests
    });

    let mut tasks = Vec::new();
    for i in 0..SENDERS {
        let channel = channel.clone();
        tasks.push(tokio::spawn(async move {
            let expression = format!("sender{i}");
            let command = EvaluateCommand::new(default_factory(), expression.clone()).unwrap();
            let pending = channel.send(command).await.unwrap();
            let seq = pending.seq();
            (seq, expression, pending.wait().await.unwrap())
        }));
    }

    let mut seqs = HashSet::new();
    for task in tasks {
        let (seq, expression, outcome) = task.await.unwrap();
        assert!(seqs.insert(seq), "sequence id {seq} issued twice");
        assert_eq!(outcome.result.handle, Handle::new(seq as i64));
        assert_eq!(outcome.result.display_value, format!("\"{expression}\""));
    }
    assert_eq!(seqs, (1..=SENDERS as u64).collect::<HashSet<_>>());

    let requests = peer.await.unwrap();
    assert_eq!(requests.len(), SENDERS);
    assert_eq!(channel.pending_count(), 0);
}
