use std::time::Duration;

use tokio::net::TcpListener;

use super::probe::probe_once;
use super::*;

#[test]
fn reports_initial_state() {
    assert!(Connectivity::new(true).is_available());
    assert!(!Connectivity::new(false).is_available());
    assert!(Connectivity::default().is_available());
}

#[test]
fn set_available_reports_only_regained_edges() {
    let conn = Connectivity::new(true);
    assert!(!conn.set_available(true), "no change");
    assert!(!conn.set_available(false), "lost is not a regained edge");
    assert!(!conn.is_available());
    assert!(!conn.set_available(false), "no change");
    assert!(conn.set_available(true), "regained");
    assert!(conn.is_available());
}

#[test]
fn clones_share_state() {
    let conn = Connectivity::new(true);
    let other = conn.clone();
    other.set_available(false);
    assert!(!conn.is_available());
}

#[tokio::test]
async fn subscribers_wake_on_change_only() {
    let conn = Connectivity::new(true);
    let mut rx = conn.subscribe();

    conn.set_available(true);
    assert!(!rx.has_changed().unwrap());

    conn.set_available(false);
    rx.changed().await.unwrap();
    assert!(!*rx.borrow_and_update());
}

#[tokio::test]
async fn probe_once_detects_listening_port() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    assert!(probe_once("127.0.0.1", port, Duration::from_secs(1)).await);
}

#[tokio::test]
async fn probe_once_detects_closed_port() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    assert!(!probe_once("127.0.0.1", port, Duration::from_secs(1)).await);
}

#[tokio::test]
async fn probe_pushes_results_and_stops_cleanly() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let conn = Connectivity::new(true);
    let mut rx = conn.subscribe();

    let probe = ReachabilityProbe::spawn(
        conn.clone(),
        "127.0.0.1".into(),
        port,
        Duration::from_millis(20),
        Duration::from_millis(200),
    );

    tokio::time::timeout(Duration::from_secs(5), rx.changed())
        .await
        .expect("probe should report within timeout")
        .unwrap();
    assert!(!conn.is_available());

    probe.stop().await;
}
