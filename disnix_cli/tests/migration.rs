mod common;

use common::*;

#[test]
fn moved_state_travels_before_the_old_instance_goes_down() {
    let fx = Fixture::new();
    let old = fx.write_manifest("old.xml", &move_manifest("t1"));
    let new = fx.write_manifest("new.xml", &move_manifest("t2"));

    let output = fx.run(
        env!("CARGO_BIN_EXE_disnix-env"),
        &[
            "-o",
            old.to_str().unwrap(),
            "--coordinator-profile-path",
            fx.coordinator.to_str().unwrap(),
            new.to_str().unwrap(),
        ],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    // snapshot on the old side, restore and activation on the new side,
    // deactivation of the old instance strictly last
    let snapshot = fx.position(&["t1.example.org", "snapshot"]).expect("snapshot");
    let restore = fx.position(&["t2.example.org", "restore"]).expect("restore");
    let activate = fx.position(&["t2.example.org", "activate", "aaaa-db"]).expect("activate");
    let deactivate = fx.position(&["t1.example.org", "deactivate", "aaaa-db"]).expect("deactivate");
    assert!(snapshot < restore);
    assert!(restore < activate);
    assert!(activate < deactivate);

    // the transfer went through the coordinator state store
    assert!(fx.position(&["t1.example.org", "resolve-snapshots"]).is_some());
    assert!(fx.position(&["t1.example.org", "export"]).is_some());
    assert!(fx.position(&["t2.example.org", "print-missing-snapshots"]).is_some());
    assert!(fx.statedir.join("mysql-database/db/1").is_file());

    // cleanup was deliberately left to the operator
    assert!(fx.position(&["delete-state"]).is_none());
    assert!(stderr(&output).contains("disnix-delete-state"));

    assert_eq!(fx.generation_count("default"), 1);
}

#[test]
fn delete_state_removes_the_old_state_after_activation() {
    let fx = Fixture::new();
    let old = fx.write_manifest("old.xml", &move_manifest("t1"));
    let new = fx.write_manifest("new.xml", &move_manifest("t2"));

    let output = fx.run(
        env!("CARGO_BIN_EXE_disnix-env"),
        &[
            "--delete-state",
            "-o",
            old.to_str().unwrap(),
            "--coordinator-profile-path",
            fx.coordinator.to_str().unwrap(),
            new.to_str().unwrap(),
        ],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let activate = fx.position(&["t2.example.org", "activate", "aaaa-db"]).expect("activate");
    let delete = fx.position(&["t1.example.org", "delete-state"]).expect("delete-state");
    assert!(activate < delete);
    assert!(!stderr(&output).contains("disnix-delete-state"));
}

#[test]
fn failures_after_restore_never_revert_and_name_the_recovery_commands() {
    let fx = Fixture::new();
    let old = fx.write_manifest("old.xml", &move_manifest("t1"));
    let new = fx.write_manifest("new.xml", &move_manifest("t2"));

    let mut cmd = fx.command(env!("CARGO_BIN_EXE_disnix-env"));
    cmd.env("DISNIX_STUB_FAIL", "activate mysql-database")
        .arg("--delete-state")
        .arg("-o")
        .arg(&old)
        .arg("--coordinator-profile-path")
        .arg(&fx.coordinator)
        .arg(&new);
    let output = cmd.output().unwrap();

    assert_eq!(output.status.code(), Some(1));

    // the migration had begun, so the old instance must stay untouched
    assert!(fx.position(&["t1.example.org", "snapshot"]).is_some());
    assert!(fx.position(&["t2.example.org", "restore"]).is_some());
    assert!(fx.position(&["deactivate"]).is_none());
    assert!(fx.position(&["delete-state"]).is_none());

    let err = stderr(&output);
    assert!(err.contains("disnix-migrate"), "stderr: {}", err);
    assert!(err.contains("disnix-set"), "stderr: {}", err);
    assert!(err.contains("--delete-state"), "stderr: {}", err);
    assert!(err.contains("--coordinator-profile-path"), "stderr: {}", err);

    assert_eq!(fx.generation_count("default"), 0);
}

#[test]
fn rerunning_a_migration_skips_transferred_generations() {
    let fx = Fixture::new();
    let old = fx.write_manifest("old.xml", &move_manifest("t1"));
    let new = fx.write_manifest("new.xml", &move_manifest("t2"));

    let output = fx.run(
        env!("CARGO_BIN_EXE_disnix-migrate"),
        &[
            "-o",
            old.to_str().unwrap(),
            "--coordinator-profile-path",
            fx.coordinator.to_str().unwrap(),
            new.to_str().unwrap(),
        ],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(fx.position(&["t1.example.org", "export"]).is_some());
    fx.clear_log();

    // the generation is already in the local state store now
    let output = fx.run(
        env!("CARGO_BIN_EXE_disnix-migrate"),
        &[
            "-o",
            old.to_str().unwrap(),
            "--coordinator-profile-path",
            fx.coordinator.to_str().unwrap(),
            new.to_str().unwrap(),
        ],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(fx.position(&["t1.example.org", "export"]).is_none());
    assert!(fx.position(&["t2.example.org", "restore"]).is_some());
}
