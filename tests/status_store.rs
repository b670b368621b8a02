use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use cadence::status::{FileStatusStore, MemoryStatusStore, StatusManager, StatusStore};
use cadence::types::{NO_SEQUENCE, Status};

fn stores() -> Vec<(Box<dyn StatusStore>, Option<tempfile::TempDir>)> {
    let dir = tempfile::tempdir().unwrap();
    let file: Box<dyn StatusStore> = Box::new(FileStatusStore::new(dir.path()));
    let memory: Box<dyn StatusStore> = Box::new(MemoryStatusStore::new());
    vec![(file, Some(dir)), (memory, None)]
}

#[test]
fn terminal_marker_wins_over_stale_in_progress() {
    for (store, _dir) in stores() {
        let now = Utc::now();
        store
            .commit_status("task/A", 3, Status::InProgress, now, false)
            .unwrap();
        store
            .commit_status("task/A", 3, Status::Success, now, false)
            .unwrap();

        assert_eq!(store.check_status("task/A", 3).unwrap(), Status::Success, "{store:?}");

        store
            .commit_status("task/B", 3, Status::InProgress, now, false)
            .unwrap();
        store
            .commit_status("task/B", 3, Status::Error, now, false)
            .unwrap();
        assert_eq!(store.check_status("task/B", 3).unwrap(), Status::Error, "{store:?}");
    }
}

#[test]
fn overwrite_clears_previous_markers() {
    for (store, _dir) in stores() {
        let now = Utc::now();
        store
            .commit_status("task/A", 1, Status::Error, now, true)
            .unwrap();
        store
            .commit_status("task/A", 1, Status::InProgress, now, true)
            .unwrap();

        assert_eq!(store.check_status("task/A", 1).unwrap(), Status::InProgress);
        assert!(store
            .status_update_time("task/A", 1, Status::Error)
            .unwrap()
            .is_none());
    }
}

#[test]
fn negative_sequence_numbers_read_as_default() {
    for (store, _dir) in stores() {
        assert_eq!(
            store.check_status("task/A", NO_SEQUENCE).unwrap(),
            Status::Default
        );
        assert_eq!(store.check_status("task/A", 0).unwrap(), Status::Default);
    }
}

#[test]
fn current_iteration_is_highest_sequence_number() {
    for (store, _dir) in stores() {
        assert_eq!(store.current_iteration_number("pipeline/p").unwrap(), 0);

        let now = Utc::now();
        for seq in [3, 11, 7] {
            store
                .commit_status("pipeline/p", seq, Status::Success, now, true)
                .unwrap();
        }
        assert_eq!(store.current_iteration_number("pipeline/p").unwrap(), 11);
        assert_eq!(store.current_iteration_number("pipeline/other").unwrap(), 0);
    }
}

#[test]
fn removing_the_last_marker_drops_the_key() {
    for (store, dir) in stores() {
        let now = Utc::now();
        store
            .commit_status("pipeline/p", 3, Status::Success, now, true)
            .unwrap();
        store
            .commit_status("pipeline/p", 8, Status::InProgress, now, true)
            .unwrap();
        assert_eq!(store.current_iteration_number("pipeline/p").unwrap(), 8);

        store
            .remove_status("pipeline/p", 8, Status::InProgress)
            .unwrap();

        assert_eq!(store.current_iteration_number("pipeline/p").unwrap(), 3, "{store:?}");
        assert_eq!(store.last_update_time("pipeline/p", 8).unwrap(), None);
        if let Some(dir) = dir {
            assert!(!dir.path().join("pipeline/p/8").exists());
            assert!(dir.path().join("pipeline/p/3/SUCCESS").is_file());
        }
    }
}

#[test]
fn update_times_follow_commit_times() {
    for (store, _dir) in stores() {
        let earlier = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let later = earlier + Duration::hours(2);

        store
            .commit_status("task/A", 2, Status::InProgress, earlier, false)
            .unwrap();
        store
            .commit_status("task/A", 2, Status::Success, later, false)
            .unwrap();

        assert_eq!(
            store
                .status_update_time("task/A", 2, Status::InProgress)
                .unwrap(),
            Some(earlier)
        );
        assert_eq!(store.last_update_time("task/A", 2).unwrap(), Some(later));
        assert_eq!(store.last_update_time("task/A", 9).unwrap(), None);
    }
}

#[test]
fn clear_all_and_remove_are_idempotent() {
    for (store, _dir) in stores() {
        let now = Utc::now();
        store
            .remove_status("task/A", 5, Status::InProgress)
            .unwrap();
        store.clear_all_statuses("task/A", 5).unwrap();

        store
            .commit_status("task/A", 5, Status::Error, now, false)
            .unwrap();
        store.clear_all_statuses("task/A", 5).unwrap();
        assert_eq!(store.check_status("task/A", 5).unwrap(), Status::Default);
    }
}

#[test]
fn file_store_layout_is_identifier_then_sequence_then_marker() {
    let dir = tempfile::tempdir().unwrap();
    let status = StatusManager::new(Arc::new(FileStatusStore::new(dir.path())));

    status
        .commit_task_status("extract", 12, Status::Success, true)
        .unwrap();
    status
        .commit_pipeline_status("nightly", 12, Status::Success)
        .unwrap();

    assert!(dir.path().join("task/extract/12/SUCCESS").is_file());
    assert!(dir.path().join("pipeline/nightly/12/SUCCESS").is_file());

    // A second manager over the same directory sees the same state.
    let reopened = StatusManager::new(Arc::new(FileStatusStore::new(dir.path())));
    assert!(reopened.is_task_complete("extract", 12));
    assert_eq!(
        reopened
            .current_iteration_number_for_pipeline("nightly")
            .unwrap(),
        12
    );
}
