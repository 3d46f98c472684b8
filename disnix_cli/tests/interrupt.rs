mod common;

use std::thread;
use std::time::Duration;

use common::*;

#[test]
fn interrupting_the_lock_phase_releases_acquired_locks() {
    let fx = Fixture::new();
    let manifest = fx.write_manifest("fleet.xml", &fleet_manifest());

    let mut cmd = fx.command(env!("CARGO_BIN_EXE_disnix-lock"));
    cmd.env("DISNIX_STUB_SLEEP", "slow")
        .env("DISNIX_STUB_SLEEP_SECS", "2")
        .arg(&manifest);
    let mut child = cmd.spawn().unwrap();

    // three fast targets lock immediately, two are still in flight
    thread::sleep(Duration::from_millis(500));
    unsafe {
        libc::kill(child.id() as libc::pid_t, libc::SIGINT);
    }
    let status = child.wait().unwrap();
    assert!(!status.success());

    let lines = fx.log_lines();
    let locked: Vec<&String> = lines.iter().filter(|l| l.contains(" lock ")).collect();
    let unlocked: Vec<&String> = lines.iter().filter(|l| l.contains(" unlock ")).collect();

    // in-flight acquisitions were waited for, and exactly the acquired set
    // was released again
    assert_eq!(locked.len(), 5);
    assert_eq!(unlocked.len(), locked.len());
    for l in &locked {
        let address = l.split_whitespace().next().unwrap();
        assert_eq!(
            unlocked
                .iter()
                .filter(|u| u.split_whitespace().next() == Some(address))
                .count(),
            1,
            "target {} must be unlocked exactly once",
            address
        );
    }

    // no downstream stage ran
    assert!(fx.position(&["activate"]).is_none());
    assert!(fx.position(&["set"]).is_none());
}

#[test]
fn interrupting_a_deploy_during_lock_aborts_before_activation() {
    let fx = Fixture::new();
    let manifest = fx.write_manifest("new.xml", &fresh_manifest());

    let mut cmd = fx.command(env!("CARGO_BIN_EXE_disnix-env"));
    cmd.env("DISNIX_STUB_SLEEP", "t1.example.org lock")
        .env("DISNIX_STUB_SLEEP_SECS", "2")
        .arg("--coordinator-profile-path")
        .arg(&fx.coordinator)
        .arg(&manifest);
    let mut child = cmd.spawn().unwrap();

    thread::sleep(Duration::from_millis(700));
    unsafe {
        libc::kill(child.id() as libc::pid_t, libc::SIGINT);
    }
    let status = child.wait().unwrap();
    assert_eq!(status.code(), Some(1));

    let verbs = fx.verbs_for("t1.example.org");
    assert!(verbs.iter().any(|v| v == "lock"));
    assert!(verbs.iter().any(|v| v == "unlock"));
    assert!(!verbs.iter().any(|v| v == "activate"));
    assert_eq!(fx.generation_count("default"), 0);
}
