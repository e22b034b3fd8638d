use std::time::Duration;

use nodedbg_protocol::mock::{MockDebuggee, MockDebuggeeConfig};
use nodedbg_protocol::wire::{FrameReader, FrameWriter};
use nodedbg_protocol::{ChannelConfig, CommandChannel, DebuggerError, Handle, LookupCommand};
use tokio::io::{duplex, split};

use super::support::default_factory;

#[tokio::test]
async fn connect_reads_banner() {
    let mock = MockDebuggee::spawn_with_config(MockDebuggeeConfig {
        v8_version: "3.14.5.9".to_string(),
        embedding_host: "node v0.10.48".to_string(),
        ..MockDebuggeeConfig::default()
    })
    .await
    .unwrap();

    let (channel, info) = CommandChannel::connect(mock.addr()).await.unwrap();

    assert_eq!(info.v8_version.as_deref(), Some("3.14.5.9"));
    assert_eq!(info.protocol_version.as_deref(), Some("1"));
    assert_eq!(info.embedding_host.as_deref(), Some("node v0.10.48"));
    assert!(!channel.is_closed());
}

#[tokio::test]
async fn missing_banner_times_out() {
    let mock = MockDebuggee::spawn_with_config(MockDebuggeeConfig {
        send_banner: false,
        ..MockDebuggeeConfig::default()
    })
    .await
    .unwrap();
    let config = ChannelConfig {
        handshake_timeout: Duration::from_millis(100),
        ..ChannelConfig::default()
    };

    let err = CommandChannel::connect_with_config(mock.addr(), config)
        .await
        .err()
        .expect("connect should fail");
    assert!(matches!(err, DebuggerError::Timeout), "{err:?}");
}

#[tokio::test]
async fn third_command_on_a_fresh_channel_uses_sequence_id_three() {
    let (ours, theirs) = duplex(64 * 1024);
    let (read, write) = split(ours);
    let channel = CommandChannel::from_transport(read, write, ChannelConfig::default());
    let (peer_read, peer_write) = split(theirs);
    let mut peer = FrameReader::new(peer_read);
    let _peer_writer = FrameWriter::new(peer_write);

    for handle in [1, 2, 25] {
        let command = LookupCommand::new(default_factory(), [Handle::new(handle)]).unwrap();
        // Never answered; dropping the handle leaves the command pending.
        channel.send(command).await.unwrap();
    }

    let mut bodies = Vec::new();
    for _ in 0..3 {
        let frame = peer.read_frame().await.unwrap().unwrap();
        bodies.push(String::from_utf8(frame.body).unwrap());
    }
    assert_eq!(
        bodies[2],
        r#"{"command":"lookup","seq":3,"type":"request","arguments":{"handles":[25],"includeSource":false}}"#
    );
    channel.close();
}
