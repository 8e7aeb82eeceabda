//! Integration tests for the session layer over real loopback sockets.
//!
//! One side is usually a raw `TcpStream` driven by hand so the tests control
//! exactly which bytes reach the session and when.

use std::time::Duration;

use screenlink_core::domain::{command_queue, frame_queue, InboundRoutes};
use screenlink_core::protocol::codec::encode_message;
use screenlink_core::protocol::messages::{Command, Frame, Message, DEFAULT_MAX_PAYLOAD};
use screenlink_core::{Address, CloseCallback, Session, SessionConfig, SessionError, SessionState};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedReceiver};

const WAIT: Duration = Duration::from_secs(5);

async fn tcp_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
    (client.unwrap(), accepted.unwrap().0)
}

fn reason_channel() -> (CloseCallback, UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Box::new(move |reason| {
            let _ = tx.send(reason);
        }),
        rx,
    )
}

fn frame_bytes(sequence: u64, payload: &[u8]) -> Vec<u8> {
    let frame = Frame { sequence, timestamp_us: 1_000 + sequence, payload: payload.to_vec() };
    encode_message(&Message::Frame(frame), 0, 0, DEFAULT_MAX_PAYLOAD).unwrap()
}

#[tokio::test]
async fn test_all_frames_sent_before_peer_close_are_delivered() {
    // Arrange
    let (session_side, mut raw) = tcp_pair().await;
    let (frame_tx, mut frame_rx) = frame_queue();
    let (callback, mut reasons) = reason_channel();
    let session = Session::from_accepted(
        session_side,
        SessionConfig::default(),
        InboundRoutes::frames(frame_tx),
        callback,
    )
    .unwrap();

    // Act – five frames in one write, then EOF
    let mut burst = Vec::new();
    for seq in 0..5u64 {
        burst.extend(frame_bytes(seq, &[seq as u8; 32]));
    }
    raw.write_all(&burst).await.unwrap();
    raw.shutdown().await.unwrap();

    // Assert
    for seq in 0..5u64 {
        let frame = tokio::time::timeout(WAIT, frame_rx.recv()).await.unwrap().unwrap();
        assert_eq!(frame.sequence, seq);
        assert_eq!(frame.payload, vec![seq as u8; 32]);
    }
    let reason = tokio::time::timeout(WAIT, reasons.recv()).await.unwrap().unwrap();
    assert_eq!(reason, "peer closed");
    session.closed().await;
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_frame_split_across_many_writes_is_reassembled() {
    // Arrange
    let (session_side, mut raw) = tcp_pair().await;
    let (frame_tx, mut frame_rx) = frame_queue();
    let (callback, _reasons) = reason_channel();
    let config = SessionConfig { read_buffer_bytes: 7, ..SessionConfig::default() };
    let _session =
        Session::from_accepted(session_side, config, InboundRoutes::frames(frame_tx), callback)
            .unwrap();
    let payload: Vec<u8> = (0..=255).collect();
    let bytes = frame_bytes(3, &payload);

    // Act
    for chunk in bytes.chunks(5) {
        raw.write_all(chunk).await.unwrap();
        raw.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    // Assert
    let frame = tokio::time::timeout(WAIT, frame_rx.recv()).await.unwrap().unwrap();
    assert_eq!(frame.sequence, 3);
    assert_eq!(frame.payload, payload);
}

#[tokio::test]
async fn test_message_after_malformed_header_is_not_delivered() {
    // Arrange
    let (session_side, mut raw) = tcp_pair().await;
    let (cmd_tx, mut cmd_rx) = command_queue();
    let (callback, mut reasons) = reason_channel();
    let _session = Session::from_accepted(
        session_side,
        SessionConfig::default(),
        InboundRoutes::commands(cmd_tx),
        callback,
    )
    .unwrap();
    let good = encode_message(&Message::Command(Command::Pause), 0, 0, DEFAULT_MAX_PAYLOAD).unwrap();
    let mut bad = good.clone();
    bad[1] = 0x7F; // unknown type tag

    // Act
    let mut stream = good.clone();
    stream.extend(&bad);
    stream.extend(&good);
    raw.write_all(&stream).await.unwrap();

    // Assert
    assert_eq!(cmd_rx.recv().await, Some(Command::Pause));
    let reason = tokio::time::timeout(WAIT, reasons.recv()).await.unwrap().unwrap();
    assert!(reason.starts_with("malformed frame"), "got {reason:?}");
    assert_eq!(cmd_rx.recv().await, None, "nothing after the bad unit is routed");
}

#[tokio::test]
async fn test_oversized_length_in_header_closes_session() {
    let (session_side, mut raw) = tcp_pair().await;
    let (callback, mut reasons) = reason_channel();
    let config = SessionConfig { max_payload_bytes: 64, ..SessionConfig::default() };
    let _session =
        Session::from_accepted(session_side, config, InboundRoutes::default(), callback).unwrap();

    // Only the header; the declared length alone must be enough to reject it.
    let bytes = frame_bytes(0, &[0u8; 65]);
    raw.write_all(&bytes[..24]).await.unwrap();

    let reason = tokio::time::timeout(WAIT, reasons.recv()).await.unwrap().unwrap();
    assert!(reason.starts_with("malformed frame"), "got {reason:?}");
}

#[tokio::test]
async fn test_severed_peer_is_detected_while_sending() {
    // Arrange
    let (session_side, raw) = tcp_pair().await;
    let (callback, mut reasons) = reason_channel();
    let session = Session::from_accepted(
        session_side,
        SessionConfig::default(),
        InboundRoutes::default(),
        callback,
    )
    .unwrap();

    // Act
    drop(raw);
    let payload = vec![0u8; 64 * 1024];
    for seq in 0..200u64 {
        if session.send(&Message::Frame(Frame::now(seq, payload.clone()))).is_err() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    // Assert – either the reader sees EOF or the writer sees a reset first
    let reason = tokio::time::timeout(WAIT, reasons.recv()).await.unwrap().unwrap();
    assert!(
        reason == "peer closed" || reason.starts_with("read error") || reason.starts_with("write error"),
        "got {reason:?}"
    );
    assert!(matches!(
        session.send_command(Command::Pause),
        Err(SessionError::AlreadyClosed)
    ));
}

#[tokio::test]
async fn test_local_close_delivers_eof_to_peer() {
    // Arrange
    let (session_side, mut raw) = tcp_pair().await;
    let (callback, mut reasons) = reason_channel();
    let session = Session::from_accepted(
        session_side,
        SessionConfig::default(),
        InboundRoutes::default(),
        callback,
    )
    .unwrap();
    session.send_command(Command::Unpause).unwrap();

    // Act
    session.close("operator quit").await;

    // Assert
    let mut received = Vec::new();
    tokio::time::timeout(WAIT, raw.read_to_end(&mut received)).await.unwrap().unwrap();
    let expected =
        encode_message(&Message::Command(Command::Unpause), 0, 0, DEFAULT_MAX_PAYLOAD).unwrap();
    assert_eq!(received.len(), expected.len());
    assert_eq!(received[24..], expected[24..]);
    assert_eq!(reasons.recv().await.as_deref(), Some("operator quit"));
}

#[tokio::test]
async fn test_connect_and_exchange_both_directions() {
    // Arrange
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let addr = Address::new("127.0.0.1", port).unwrap();
    let (cmd_tx, mut cmd_rx) = command_queue();
    let (frame_tx, mut frame_rx) = frame_queue();
    let (cb_client, _rc) = reason_channel();
    let (cb_server, _rs) = reason_channel();

    // Act
    let (client, accepted) = tokio::join!(
        Session::connect(&addr, SessionConfig::default(), InboundRoutes::commands(cmd_tx), cb_client),
        listener.accept(),
    );
    let client = client.unwrap();
    let server = Session::from_accepted(
        accepted.unwrap().0,
        SessionConfig::default(),
        InboundRoutes::frames(frame_tx),
        cb_server,
    )
    .unwrap();
    server.send_command(Command::Resize { width: 320, height: 180 }).unwrap();
    client.send(&Message::Frame(Frame::now(0, b"jpeg".to_vec()))).unwrap();

    // Assert
    assert_eq!(
        cmd_rx.recv().await,
        Some(Command::Resize { width: 320, height: 180 })
    );
    assert_eq!(frame_rx.recv().await.unwrap().payload, b"jpeg".to_vec());
    assert_eq!(client.peer_addr().port(), port);
    assert_ne!(client.id(), server.id());
}
