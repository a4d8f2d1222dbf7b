//! Registration, spawning and the crash/restart policy.

mod common;

use std::time::Duration;

use common::*;
use graphene_session::config::MatchPolicy;
use graphene_session::session::{
    ClientStatus, ExitStatus, OutboundSignal, SessionEvent, SessionOutcome, SessionPhase,
};

#[tokio::test]
async fn register_twice_returns_same_path() {
    let mut m = running_manager(config()).await;

    let first = m.register_client(":1.5", "org.example.Editor", "").await;
    let second = m.register_client(":1.5", "org.example.Editor", "").await;

    assert!(first.starts_with("/org/gnome/SessionManager/Client"));
    assert_eq!(first, second);
    assert_eq!(m.clients().len(), 1);
    assert_eq!(m.backend().exported_clients.len(), 1);
    assert_eq!(
        m.backend()
            .count_signal(&OutboundSignal::ClientAdded(first.clone())),
        1
    );
}

#[tokio::test]
async fn registration_with_startup_id_adopts_launched_client() {
    let mut m = running_manager(config()).await;
    let id = m
        .launch_process(None, "editor --new", false, 0, Duration::ZERO, true)
        .await;
    let pid = pid_of(&m, &id);

    let path = m.register_client(":1.9", "org.example.Editor", &id).await;

    assert_eq!(m.clients().len(), 1);
    let client = m.clients().get(&id).unwrap();
    assert_eq!(client.object_path(), Some(path.as_str()));
    assert_eq!(client.status(), ClientStatus::Registered);
    assert_eq!(client.process_id(), Some(pid));
    // Pid and command line are already known, no lookup needed.
    assert!(m.backend().lookups.is_empty());
}

#[tokio::test]
async fn self_registered_peer_is_resolved() {
    let mut m = running_manager(config()).await;
    m.register_client(":1.12", "org.example.Chat", "").await;

    let lookup = m.backend().lookups.last().cloned().unwrap();
    assert_eq!(lookup.dbus_name, ":1.12");
    assert_eq!(lookup.known_pid, None);
    assert!(lookup.want_args);

    m.handle_event(SessionEvent::PeerResolved {
        startup_id: lookup.startup_id.clone(),
        dbus_name: lookup.dbus_name.clone(),
        pid: Some(4242),
        args: Some("chat --tray".to_string()),
    })
    .await;

    let client = m.clients().get(&lookup.startup_id).unwrap();
    assert_eq!(client.process_id(), Some(4242));
    assert_eq!(client.launch_args(), Some("chat --tray"));
}

#[tokio::test]
async fn peer_info_for_departed_client_is_dropped() {
    let mut m = running_manager(config()).await;
    let path = m.register_client(":1.12", "org.example.Chat", "").await;
    let id = m.backend().lookups[0].startup_id.clone();
    m.unregister_client(&path).await;

    m.handle_event(SessionEvent::PeerResolved {
        startup_id: id.clone(),
        dbus_name: ":1.12".to_string(),
        pid: Some(4242),
        args: None,
    })
    .await;

    assert_eq!(m.clients().get(&id).unwrap().process_id(), None);
}

#[tokio::test]
async fn strict_policy_does_not_merge_on_app_id() {
    let mut loose = running_manager(config()).await;
    loose.register_client(":1.1", "org.example.App", "").await;
    loose.register_client(":1.2", "org.example.App", "explicit-id").await;
    assert_eq!(loose.clients().len(), 1);

    let mut cfg = config();
    cfg.session.match_policy = MatchPolicy::Strict;
    let mut strict = running_manager(cfg).await;
    strict.register_client(":1.1", "org.example.App", "").await;
    strict.register_client(":1.2", "org.example.App", "explicit-id").await;
    assert_eq!(strict.clients().len(), 2);
}

#[tokio::test]
async fn export_failure_returns_empty_path() {
    let mut m = running_manager(config()).await;
    m.backend_mut().fail_exports = true;

    let path = m.register_client(":1.3", "org.example.App", "").await;

    assert_eq!(path, "");
    assert!(m.clients().is_empty());
    assert!(m.backend().watches.is_empty());
}

#[tokio::test]
async fn unregister_keeps_client_tracked() {
    let mut m = running_manager(config()).await;
    let path = m.register_client(":1.3", "org.example.App", "").await;

    m.unregister_client(&path).await;

    assert_eq!(m.clients().len(), 1);
    assert!(m.backend().exported_clients.is_empty());
    assert!(m.backend().watches.is_empty());
    assert_eq!(
        m.backend().count_signal(&OutboundSignal::ClientRemoved(path)),
        1
    );
}

#[tokio::test]
async fn spawn_failure_removes_client() {
    let mut m = running_manager(config()).await;
    m.backend_mut().fail_spawn = true;

    m.launch_process(None, "missing-binary", true, 0, Duration::ZERO, true)
        .await;

    assert!(m.clients().is_empty());
}

#[tokio::test]
async fn delayed_launch_waits_for_its_token() {
    let mut m = running_manager(config()).await;
    let id = m
        .launch_process(None, "clock", false, 0, Duration::from_secs(3), true)
        .await;

    assert_eq!(m.backend().spawn_count(), 0);
    let (timer_id, token, delay) = m.backend().launch_timers[0].clone();
    assert_eq!(timer_id, id);
    assert_eq!(delay, Duration::from_secs(3));
    assert!(m.clients().get(&id).unwrap().launch_pending());

    m.handle_event(SessionEvent::LaunchDue {
        startup_id: id.clone(),
        token: token + 1,
    })
    .await;
    assert_eq!(m.backend().spawn_count(), 0);

    let due = SessionEvent::LaunchDue {
        startup_id: id.clone(),
        token,
    };
    m.handle_event(due).await;
    m.handle_event(SessionEvent::LaunchDue {
        startup_id: id.clone(),
        token,
    })
    .await;
    assert_eq!(m.backend().spawn_count(), 1);
    assert!(!m.clients().get(&id).unwrap().launch_pending());
}

#[tokio::test]
async fn crashing_client_stops_after_restart_budget() {
    let mut m = running_manager(config()).await;
    let id = m
        .launch_process(None, "flaky", true, 0, Duration::ZERO, true)
        .await;

    for attempt in 1..=5 {
        let pid = pid_of(&m, &id);
        exit(&mut m, &id, pid, ExitStatus::Code(1)).await;
        assert_eq!(m.clients().get(&id).unwrap().restart_count(), attempt);
    }
    assert_eq!(m.backend().spawn_count(), 6);

    let pid = pid_of(&m, &id);
    exit(&mut m, &id, pid, ExitStatus::Signaled(11)).await;

    assert_eq!(m.backend().spawn_count(), 6);
    let client = m.clients().get(&id).unwrap();
    assert_eq!(client.restart_count(), 5);
    assert!(client.has_failed());
    assert_eq!(client.status(), ClientStatus::Failed);
    assert_eq!(m.outcome(), None);
}

#[tokio::test]
async fn clean_exit_is_not_restarted() {
    let mut m = running_manager(config()).await;
    let id = m
        .launch_process(None, "tool", true, 0, Duration::ZERO, true)
        .await;
    let pid = pid_of(&m, &id);

    exit(&mut m, &id, pid, ExitStatus::Code(0)).await;

    assert!(m.clients().is_empty());
    assert_eq!(m.backend().spawn_count(), 1);
}

#[tokio::test]
async fn exit_of_stale_pid_is_ignored() {
    let mut m = running_manager(config()).await;
    let id = m
        .launch_process(None, "tool", true, 0, Duration::ZERO, true)
        .await;

    exit(&mut m, &id, 1, ExitStatus::Code(1)).await;

    assert_eq!(m.clients().len(), 1);
    assert_eq!(m.backend().spawn_count(), 1);
}

#[tokio::test]
async fn panel_reload_resets_restart_count() {
    let mut m = running_manager(config()).await;
    let id = m
        .launch_process(
            None,
            "/usr/bin/graphene-panel --replace",
            true,
            3,
            Duration::ZERO,
            true,
        )
        .await;

    for _ in 0..10 {
        let pid = pid_of(&m, &id);
        exit(&mut m, &id, pid, ExitStatus::Code(120)).await;
        assert_eq!(m.clients().get(&id).unwrap().restart_count(), 0);
    }
    assert_eq!(m.backend().spawn_count(), 11);
    assert_eq!(m.outcome(), None);
}

#[tokio::test]
async fn reload_code_from_other_clients_is_a_crash() {
    let mut m = running_manager(config()).await;
    let id = m
        .launch_process(None, "editor", true, 0, Duration::ZERO, true)
        .await;
    let pid = pid_of(&m, &id);

    exit(&mut m, &id, pid, ExitStatus::Code(120)).await;

    assert_eq!(m.clients().get(&id).unwrap().restart_count(), 1);
}

#[tokio::test]
async fn panel_crash_loop_fails_the_session() {
    let mut m = running_manager(config()).await;
    let id = m
        .launch_process(None, "/usr/bin/graphene-panel", true, 0, Duration::ZERO, true)
        .await;

    for _ in 0..6 {
        let pid = pid_of(&m, &id);
        exit(&mut m, &id, pid, ExitStatus::Code(1)).await;
    }

    assert_eq!(m.outcome(), Some(SessionOutcome::Failed));
    assert_eq!(m.phase(), SessionPhase::Exit);
    assert_eq!(m.backend().count_signal(&OutboundSignal::SessionOver), 1);
}

#[tokio::test]
async fn vanished_peer_without_child_is_treated_as_crash() {
    let mut m = running_manager(config()).await;
    m.register_client(":1.20", "org.example.Applet", "").await;
    let id = m.backend().lookups[0].startup_id.clone();
    let watch = m.clients().get(&id).unwrap().bus_watch().unwrap();

    m.handle_event(SessionEvent::NameVanished {
        startup_id: id.clone(),
        watch,
    })
    .await;

    // Never launched by us, so there is nothing to restart.
    assert!(m.clients().is_empty());
}

#[tokio::test]
async fn vanished_peer_with_child_waits_for_exit_status() {
    let mut m = running_manager(config()).await;
    let id = m
        .launch_process(None, "/usr/bin/graphene-panel", true, 0, Duration::ZERO, true)
        .await;
    m.register_client(":1.21", "org.graphene.Panel", &id).await;
    let watch = m.clients().get(&id).unwrap().bus_watch().unwrap();

    m.handle_event(SessionEvent::NameVanished {
        startup_id: id.clone(),
        watch,
    })
    .await;
    let client = m.clients().get(&id).unwrap();
    assert!(!client.is_registered());
    assert_eq!(m.backend().spawn_count(), 1);

    let pid = pid_of(&m, &id);
    exit(&mut m, &id, pid, ExitStatus::Code(120)).await;
    assert_eq!(m.backend().spawn_count(), 2);
    assert_eq!(m.clients().get(&id).unwrap().restart_count(), 0);
}

#[tokio::test]
async fn stale_watch_is_ignored() {
    let mut m = running_manager(config()).await;
    let path = m.register_client(":1.22", "org.example.App", "").await;
    let id = m.backend().lookups[0].startup_id.clone();
    let old_watch = m.clients().get(&id).unwrap().bus_watch().unwrap();
    m.unregister_client(&path).await;
    m.register_client(":1.22", "org.example.App", &id).await;

    m.handle_event(SessionEvent::NameVanished {
        startup_id: id.clone(),
        watch: old_watch,
    })
    .await;

    assert!(m.clients().get(&id).unwrap().is_registered());
}

#[tokio::test]
async fn setenv_only_during_startup() {
    let mut m = manager(config(), vec![entry("wm", "graphene-wm", "WindowManager", false)]);
    m.setenv("GTK_THEME", "Adwaita").unwrap();
    m.setenv("GTK_THEME", "Adwaita:dark").unwrap();
    assert!(m.setenv("", "x").is_err());
    assert!(m.setenv("A=B", "x").is_err());

    m.start().await;
    let (request, _) = &m.backend().spawned[0];
    assert_eq!(
        request.env,
        vec![("GTK_THEME".to_string(), "Adwaita:dark".to_string())]
    );

    let m = &mut running_manager(config()).await;
    assert!(m.setenv("GTK_THEME", "Adwaita").is_err());
}

#[tokio::test]
async fn show_output_controls_silence() {
    let mut quiet = entry("quiet", "quiet", "Applications", false);
    quiet.show_output = false;
    let mut loud = entry("loud", "loud", "Applications", false);
    loud.show_output = true;

    let mut m = manager(config(), vec![quiet.clone(), loud.clone()]);
    m.start().await;
    let silent: Vec<bool> = m.backend().spawned.iter().map(|(r, _)| r.silent).collect();
    assert_eq!(silent, vec![true, false]);

    let mut cfg = config();
    cfg.session.show_all_output = true;
    let mut m = manager(cfg, vec![quiet, loud]);
    m.start().await;
    assert!(m.backend().spawned.iter().all(|(r, _)| !r.silent));
}
