//! Remote link over a real loopback socket.

use super::{Probe, ScriptedCamera, WAIT, eventually, fast_settings};
use camctl::config::TransportConfig;
use camctl::fsm::camera::{self, CameraController};
use camctl::fsm::pass_through::{self, PassThrough};
use camctl::transport::CommManager;
use camctl_common::events::{Event, Topic};
use camctl_runtime::broker::EventBroker;
use camctl_runtime::hsm_actor::StateMachineActor;
use serde_json::{Value, json};
use std::io::{ErrorKind, Read, Write};
use std::net::{Ipv4Addr, TcpStream};
use std::sync::Arc;

fn loopback(max_frame_len: u32) -> TransportConfig {
    TransportConfig {
        bind: Ipv4Addr::LOCALHOST.into(),
        port: 0,
        max_frame_len,
        ..TransportConfig::default()
    }
}

fn serve(broker: &Arc<EventBroker>, max_frame_len: u32) -> CommManager {
    let mut comm = CommManager::new(&loopback(max_frame_len), Arc::clone(broker)).unwrap();
    comm.start().unwrap();
    comm
}

fn dial(comm: &CommManager) -> TcpStream {
    let stream = TcpStream::connect(comm.local_addr()).unwrap();
    stream.set_read_timeout(Some(WAIT)).unwrap();
    assert!(eventually(WAIT, || comm.is_connected()));
    stream
}

fn send_raw(stream: &mut TcpStream, body: &[u8]) {
    stream.write_all(&(body.len() as u32).to_be_bytes()).unwrap();
    stream.write_all(body).unwrap();
}

fn send(stream: &mut TcpStream, value: &Value) {
    send_raw(stream, &serde_json::to_vec(value).unwrap());
}

fn recv(stream: &mut TcpStream) -> Value {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).unwrap();
    let mut body = vec![0u8; u32::from_be_bytes(header) as usize];
    stream.read_exact(&mut body).unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn is_closed(stream: &mut TcpStream) -> bool {
    let mut byte = [0u8; 1];
    match stream.read(&mut byte) {
        Ok(0) => true,
        Ok(_) => false,
        Err(e) => !matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut),
    }
}

#[test]
fn inbound_frames_are_posted_as_remote_commands() {
    let broker = Arc::new(EventBroker::new());
    let remote = Probe::attach(&broker, &[Topic::RemoteCmd]);
    let comm = serve(&broker, 4096);
    let mut client = dial(&comm);

    send_raw(&mut client, b"not json");
    send(&mut client, &json!({"event_id": 9999}));
    send(&mut client, &json!({"event_id": 34}));
    send(&mut client, &json!({"event_id": 34, "aperture": 1100}));

    let first = remote.wait_for(WAIT, |_| true);
    assert_eq!(first, Some(Event::ConfigSetAperture { aperture: 1100 }));
    assert!(comm.is_connected());
}

#[test]
fn forwarded_topics_reach_the_client() {
    let broker = Arc::new(EventBroker::new());
    let comm = serve(&broker, 4096);
    let mut client = dial(&comm);

    broker.post(Event::CameraCmdCapture, Topic::CameraCmd);
    broker.post(Event::CameraReady, Topic::CameraEvent);
    broker.post(Event::ConfigValueIso { iso: 800 }, Topic::CameraConfig);

    assert_eq!(recv(&mut client), json!({"event_id": 18}));
    assert_eq!(recv(&mut client), json!({"event_id": 40, "iso": 800}));
}

#[test]
fn oversized_frame_drops_the_client_and_server_accepts_again() {
    let broker = Arc::new(EventBroker::new());
    let comm = serve(&broker, 64);
    let mut client = dial(&comm);

    client.write_all(&1000u32.to_be_bytes()).unwrap();
    assert!(is_closed(&mut client));
    assert!(eventually(WAIT, || !comm.is_connected()));

    let mut again = dial(&comm);
    broker.post(Event::CameraDisconnected, Topic::CameraEvent);
    assert_eq!(recv(&mut again), json!({"event_id": 19}));
}

#[test]
fn status_request_round_trips_through_the_camera() {
    let dir = tempfile::tempdir().unwrap();
    let broker = Arc::new(EventBroker::new());
    broker.start().unwrap();
    let (device, _script) = ScriptedCamera::new();
    let mut camera = StateMachineActor::new(
        CameraController::new(Box::new(device), fast_settings(dir.path())),
        Arc::clone(&broker),
        camera::TOPICS,
    );
    let mut gate = StateMachineActor::new(PassThrough::new(), Arc::clone(&broker), pass_through::TOPICS);
    camera.start().unwrap();
    gate.start().unwrap();

    let comm = serve(&broker, 4096);
    let mut client = dial(&comm);
    send(&mut client, &json!({"event_id": 25}));

    assert_eq!(
        recv(&mut client),
        json!({
            "event_id": 26,
            "state": "disconnected",
            "camera_connected": false,
            "download": false,
        })
    );

    gate.stop();
    camera.stop();
    broker.stop();
}
