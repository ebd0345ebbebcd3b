mod common;

use std::fs;

use common::{init_tracing, pattern, Host};
use savestate::container::SnapshotError;
use savestate::{
    SnapshotConfig, SnapshotManager, StateError, StatePaths, TaskEvent, TaskKind,
};

fn drain(manager: &mut SnapshotManager, host: &mut Host) -> Option<TaskEvent> {
    let mut last = None;
    while let Some(event) = manager.poll(host) {
        last = Some(event);
    }
    last
}

#[test]
fn compressed_states_load_back() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("game.state");
    let saved = pattern(6000, 2);
    let mut host = Host::new(saved.clone());
    let mut manager = SnapshotManager::new(SnapshotConfig {
        chunk_size: 1024,
        compression: true,
        ..SnapshotConfig::default()
    })
    .unwrap();

    manager.save(&mut host, &path, true).unwrap();
    drain(&mut manager, &mut host);
    let on_disk = fs::read(&path).unwrap();
    assert_eq!(&on_disk[..4], &[0x04, 0x22, 0x4d, 0x18]);
    assert!(on_disk.len() < saved.len());

    host.core.mem = pattern(6000, 3);
    manager.load(&path, false).unwrap();
    drain(&mut manager, &mut host);
    assert_eq!(host.core.mem, saved);
}

#[test]
fn sram_guard_follows_configuration() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("game.state");

    for (guarded, expected_sram) in [(true, vec![2u8; 8]), (false, vec![1u8; 8])] {
        let mut host = Host::with_sram(pattern(64, 1), vec![1; 8]);
        let mut manager = SnapshotManager::new(SnapshotConfig {
            block_sram_overwrite: guarded,
            ..SnapshotConfig::default()
        })
        .unwrap();

        manager.save(&mut host, &path, true).unwrap();
        drain(&mut manager, &mut host);

        host.core.mem = pattern(64, 9);
        host.core.sram = vec![2; 8];
        manager.load(&path, false).unwrap();
        drain(&mut manager, &mut host);

        assert_eq!(host.core.mem, pattern(64, 1));
        assert_eq!(host.core.sram, expected_sram, "guarded = {guarded}");
        fs::remove_file(&path).unwrap();
    }
}

#[test]
fn unsupported_core_is_reported_up_front() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("game.state");
    let mut host = Host::new(vec![1; 16]);
    host.core.supported = false;
    let mut manager = SnapshotManager::new(SnapshotConfig::default()).unwrap();

    assert!(matches!(
        manager.save(&mut host, &path, true),
        Err(StateError::Snapshot(SnapshotError::Unsupported))
    ));
    assert!(matches!(
        manager.save(&mut host, &path, false),
        Err(StateError::Snapshot(SnapshotError::Unsupported))
    ));
    assert!(manager.serialized_size(&mut host).is_none());
    assert!(!path.exists());
}

#[test]
fn unsupported_core_refuses_loads() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("game.state");
    fs::write(&path, [0u8; 16]).unwrap();
    let mut host = Host::new(vec![1; 16]);
    host.core.supported = false;
    let mut manager = SnapshotManager::new(SnapshotConfig::default()).unwrap();

    manager.load(&path, false).unwrap();
    match drain(&mut manager, &mut host) {
        Some(TaskEvent::Failed {
            message: Some(message),
            ..
        }) => assert_eq!(message, "Core does not support save states."),
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(host.core.unserialize_calls, 0);
}

#[test]
fn thumbnail_is_requested_for_manual_saves() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("game.state");
    let mut host = Host::new(pattern(32, 0));
    let mut manager = SnapshotManager::new(SnapshotConfig {
        thumbnail: true,
        ..SnapshotConfig::default()
    })
    .unwrap();

    manager.save(&mut host, &path, true).unwrap();
    assert!(matches!(
        drain(&mut manager, &mut host),
        Some(TaskEvent::Completed {
            kind: TaskKind::Save,
            request_thumbnail: true,
            ..
        })
    ));
}

#[test]
fn session_resumes_slot_and_auto_state() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("game.state");
    fs::write(dir.path().join("game.state1"), b"x").unwrap();
    fs::write(dir.path().join("game.state4"), b"x").unwrap();
    let paths = StatePaths::new(&base);
    let config = SnapshotConfig::from_json(
        r#"{"auto_save": true, "auto_load": true, "auto_index": true, "chunk_size": 512}"#,
    )
    .unwrap();

    let played = pattern(3000, 11);
    let mut host = Host::new(pattern(3000, 10));
    let mut manager = SnapshotManager::with_paths(config.clone(), paths.clone()).unwrap();
    let start = manager.begin_session(&mut host);
    assert_eq!(start.state_slot, Some(4));
    assert_eq!(start.auto_loaded, None);

    host.core.mem = played.clone();
    manager.end_session(&mut host).unwrap();
    assert!(paths.auto_path().exists());

    let mut host = Host::new(pattern(3000, 12));
    let mut manager = SnapshotManager::with_paths(config, paths.clone()).unwrap();
    let start = manager.begin_session(&mut host);
    assert_eq!(start.auto_loaded, Some(true));
    assert!(start
        .message
        .as_deref()
        .unwrap()
        .starts_with("Auto-loaded state from"));
    assert_eq!(host.core.mem, played);
    // The auto-load is undoable like any other load.
    assert!(manager.undo_load(&mut host).performed());
    assert_eq!(host.core.mem, pattern(3000, 12));
}

#[test]
fn broken_auto_state_is_reported() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let paths = StatePaths::new(dir.path().join("game.state"));
    fs::write(paths.auto_path(), b"RASTATE\x01garbage").unwrap();
    let mut host = Host::new(vec![5; 64]);
    let mut manager = SnapshotManager::with_paths(
        SnapshotConfig {
            auto_load: true,
            ..SnapshotConfig::default()
        },
        paths,
    )
    .unwrap();

    let start = manager.begin_session(&mut host);
    assert_eq!(start.auto_loaded, Some(false));
    assert!(start
        .message
        .as_deref()
        .unwrap()
        .starts_with("Failed to auto-load state from"));
    assert_eq!(host.core.mem, vec![5; 64]);
}

#[test]
fn end_session_finishes_pending_work() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let paths = StatePaths::new(dir.path().join("game.state"));
    let slot = paths.slot_path(2);
    let ram_slot = paths.slot_path(3);
    let mut host = Host::new(pattern(5000, 1));
    let mut manager = SnapshotManager::with_paths(
        SnapshotConfig {
            chunk_size: 256,
            ..SnapshotConfig::default()
        },
        paths.clone(),
    )
    .unwrap();

    manager.save(&mut host, &slot, true).unwrap();
    manager.poll(&mut host);
    manager.ram_save(&mut host, &ram_slot).unwrap();
    manager.end_session(&mut host).unwrap();

    assert!(slot.exists());
    assert!(ram_slot.exists());
    // Auto-save is off.
    assert!(!paths.auto_path().exists());
    assert!(manager.slots().ram.get().is_none());
    assert!(!manager.is_save_in_progress());
}

#[test]
fn rewind_snapshot_fits_its_buffer() {
    init_tracing();
    let mut host = Host::new(pattern(400, 3));
    let manager = SnapshotManager::new(SnapshotConfig::default()).unwrap();

    let size = manager.rewind_size(&mut host).unwrap();
    assert_eq!(size, manager.serialized_size(&mut host).unwrap());
    let mut buf = vec![0u8; size];
    assert!(manager.rewind_snapshot(&mut host, &mut buf));
    let mut small = vec![0u8; size - 8];
    assert!(!manager.rewind_snapshot(&mut host, &mut small));
    assert!(small.iter().all(|&b| b == 0));
}
