use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::watch;

use gcs_drone::{Arbiter, AtCodec, DroneLink, Handovers, SendRetry};
use gcs_nav::WaypointStore;
use gcs_operator::SessionManager;
use gcs_proto::{Authority, GpsPoint};

struct Rig {
    vehicle: UdpSocket,
    arbiter: Arc<Arbiter>,
    waypoints: WaypointStore,
    addr: String,
    shutdown: watch::Sender<bool>,
    manager: tokio::task::JoinHandle<anyhow::Result<()>>,
}

async fn rig() -> Rig {
    let vehicle = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = vehicle.local_addr().unwrap().port();
    let link = DroneLink::open("127.0.0.1", port, AtCodec::default(), SendRetry::none()).await.unwrap();
    let arbiter = Arc::new(Arbiter::new(link));
    let waypoints = WaypointStore::default();
    let manager = SessionManager::bind("127.0.0.1:0", arbiter.clone(), waypoints.clone()).await.unwrap();
    let addr = manager.local_addr().unwrap().to_string();
    let (shutdown, rx) = watch::channel(false);
    let manager = tokio::spawn(manager.run(rx));
    Rig { vehicle, arbiter, waypoints, addr, shutdown, manager }
}

async fn wait_for_handback(arbiter: &Arbiter, expected: u64) -> Handovers {
    for _ in 0..200 {
        let h = arbiter.handovers().await;
        if h.to_autonomous >= expected {
            return h;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("authority was never handed back");
}

async fn recv_frame(vehicle: &UdpSocket) -> String {
    let mut buf = [0u8; 128];
    let n = tokio::time::timeout(Duration::from_secs(2), vehicle.recv(&mut buf)).await.unwrap().unwrap();
    String::from_utf8_lossy(&buf[..n]).into_owned()
}

#[tokio::test]
async fn manual_session_round_trip() {
    let rig = rig().await;

    let mut client = TcpStream::connect(&rig.addr).await.unwrap();
    client
        .write_all(b"cmd land\nmanual\ncmd takeoff\nmanual\nlist2 38.9 -95.2 38.8 -95.1\nbogus\n")
        .await
        .unwrap();

    // only the maneuver after `manual` reaches the vehicle
    assert_eq!(recv_frame(&rig.vehicle).await, "AT*REF=1,290718208\r");
    drop(client);

    let h = wait_for_handback(&rig.arbiter, 1).await;
    assert_eq!(h, Handovers { to_manual: 1, to_autonomous: 1 });
    assert_eq!(rig.arbiter.authority().await, Authority::Autonomous);
    assert_eq!(rig.arbiter.next_seq().await, 2);

    assert_eq!(rig.waypoints.points(), vec![GpsPoint::new(38.9, -95.2), GpsPoint::new(38.8, -95.1)]);
    assert_eq!(rig.waypoints.cursor(), Some(0));

    rig.shutdown.send(true).unwrap();
    rig.manager.await.unwrap().unwrap();
}

#[tokio::test]
async fn sessions_are_served_one_after_another() {
    let rig = rig().await;

    let mut first = TcpStream::connect(&rig.addr).await.unwrap();
    first.write_all(b"manual\ncmd hover\n").await.unwrap();
    assert_eq!(recv_frame(&rig.vehicle).await, "AT*PCMD=1,0,0,0,0,0\r");

    // queued in the backlog until the first operator leaves
    let mut second = TcpStream::connect(&rig.addr).await.unwrap();
    second.write_all(b"manual\0\0\0\0cmd land\0\0\0\0").await.unwrap();
    drop(first);

    assert_eq!(recv_frame(&rig.vehicle).await, "AT*REF=2,290717696\r");
    drop(second);

    let h = wait_for_handback(&rig.arbiter, 2).await;
    assert_eq!(h, Handovers { to_manual: 2, to_autonomous: 2 });

    rig.shutdown.send(true).unwrap();
    rig.manager.await.unwrap().unwrap();
}

#[tokio::test]
async fn autopilot_is_refused_while_manual() {
    let rig = rig().await;

    let mut client = TcpStream::connect(&rig.addr).await.unwrap();
    client.write_all(b"manual\n").await.unwrap();
    for _ in 0..200 {
        if rig.arbiter.authority().await == Authority::Manual {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let issued = rig.arbiter.issue(Authority::Autonomous, gcs_proto::Maneuver::MoveForward).await.unwrap();
    assert_eq!(issued, gcs_drone::Issued::Refused { holder: Authority::Manual });

    rig.shutdown.send(true).unwrap();
    rig.manager.await.unwrap().unwrap();
    assert_eq!(rig.arbiter.authority().await, Authority::Autonomous);
}
