use std::sync::Arc;

use grid_arena::app::Session;
use grid_arena::config::Config;
use grid_arena::game::{DrawKind, InputSnapshot, Key};
use grid_arena::sync::{BroadcastMsg, LocalHub, PlayerMove, SubscribeOptions, Transport};

fn config(vars: &[(&str, &str)]) -> Config {
    let vars: Vec<(String, String)> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Config::from_lookup(|name| {
        vars.iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    })
    .expect("config")
}

#[test]
fn movement_reaches_the_other_client() {
    let config = config(&[]);
    let hub = Arc::new(LocalHub::new());
    let mut a = Session::with_id(&config, hub.clone(), "p1");
    let mut b = Session::with_id(&config, hub.clone(), "p2");
    let idle = InputSnapshot::new();

    a.tick(0, &idle);
    b.tick(0, &idle);
    assert_eq!(b.remote().get("p1").unwrap().player.position(), (64, 64));

    let delta = a.handle_key(Key::C, 10);
    assert_eq!(delta.player_moved(), Some((96, 64)));

    let frame = b.tick(33, &idle);
    assert_eq!(b.remote().get("p1").unwrap().player.position(), (96, 64));
    let remote = frame
        .of_kind(DrawKind::RemotePlayer)
        .find(|d| d.id.as_deref() == Some("p1"))
        .unwrap();
    assert_eq!((remote.x, remote.y), (96, 64));

    // own broadcasts never come back as remote entries
    a.tick(33, &idle);
    assert!(a.remote().get("p1").is_none());
}

#[test]
fn leaving_client_is_removed() {
    let config = config(&[]);
    let hub = Arc::new(LocalHub::new());
    let mut a = Session::with_id(&config, hub.clone(), "p1");
    let mut b = Session::with_id(&config, hub.clone(), "p2");
    let idle = InputSnapshot::new();

    b.tick(0, &idle);
    assert!(b.remote().get("p1").is_some());

    a.shutdown();
    b.tick(33, &idle);
    assert!(b.remote().is_empty());
}

#[test]
fn power_hits_a_remote_player() {
    let config = config(&[("POWER_PERIOD_MS", "60")]);
    let hub = Arc::new(LocalHub::new());
    let mut shooter = Session::with_id(&config, hub.clone(), "p1");
    let mut target = Session::with_id(&config, hub.clone(), "p2");
    let idle = InputSnapshot::new();

    // target steps two cells right to (128, 64)
    target.handle_key(Key::C, 0);
    target.handle_key(Key::C, 1);

    shooter.tick(0, &idle);
    assert_eq!(shooter.remote().get("p2").unwrap().player.position(), (128, 64));

    // face right by stepping into (96, 64), then launch
    shooter.handle_key(Key::C, 2);
    shooter.handle_key(Key::Space, 10);
    assert!(shooter.simulation().power().is_some());

    shooter.tick(70, &idle);
    assert!(shooter.simulation().power().is_none());
}

#[test]
fn creation_policy_decides_on_unseen_movers() {
    let hub = Arc::new(LocalHub::new());
    let idle = InputSnapshot::new();
    let mut strict = Session::with_id(&config(&[]), hub.clone(), "p1");
    let mut lazy = Session::with_id(&config(&[("CREATE_ON_MOVE", "true")]), hub.clone(), "p2");

    // a peer that broadcasts without ever tracking presence
    let ghost = hub.subscribe("room-6", SubscribeOptions::default()).unwrap();
    let text = BroadcastMsg::PlayerMove(PlayerMove {
        id: "p9".into(),
        x: 160,
        y: 96,
    })
    .encode()
    .unwrap();
    hub.send(&ghost, text).unwrap();

    strict.tick(33, &idle);
    lazy.tick(33, &idle);
    assert!(strict.remote().get("p9").is_none());
    assert_eq!(lazy.remote().get("p9").unwrap().player.position(), (160, 96));
}

#[test]
fn move_then_leave_does_not_resurrect_a_lazy_entry() {
    let hub = Arc::new(LocalHub::new());
    let idle = InputSnapshot::new();
    let mut obs = Session::with_id(&config(&[("CREATE_ON_MOVE", "true")]), hub.clone(), "p1");
    let mut peer = Session::with_id(&config(&[]), hub.clone(), "p2");

    obs.tick(0, &idle);
    assert!(obs.remote().get("p2").is_some());

    // last move is queued before the leave
    peer.handle_key(Key::C, 10);
    peer.shutdown();

    obs.tick(33, &idle);
    assert!(obs.remote().get("p2").is_none());
}

#[test]
fn move_sent_before_tracking_is_not_replayed_over_the_sync() {
    let hub = Arc::new(LocalHub::new());
    let idle = InputSnapshot::new();
    let mut obs = Session::with_id(&config(&[]), hub.clone(), "p1");
    obs.tick(0, &idle);

    let movement = hub.subscribe("room-6", SubscribeOptions::default()).unwrap();
    let text = BroadcastMsg::PlayerMove(PlayerMove {
        id: "p3".into(),
        x: 160,
        y: 96,
    })
    .encode()
    .unwrap();
    hub.send(&movement, text).unwrap();

    let presence = hub
        .subscribe("online-users-room-6", SubscribeOptions::presence("p3"))
        .unwrap();
    hub.track(&presence, chrono::Utc::now()).unwrap();

    // the move predates the peer's presence and is dropped
    obs.tick(33, &idle);
    assert_eq!(obs.remote().get("p3").unwrap().player.position(), (64, 64));
}
