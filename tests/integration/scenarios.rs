//! End-to-end job runs against the stand-in cracking tool.

use chrono::Duration as ChronoDuration;
use serial_test::serial;
use std::thread;
use std::time::Duration;

use sift::clock::Clock;
use sift::models::{AttemptStatus, ItemStatus, JobStatus};
use sift::orchestrator::runner::EXHAUSTED_ERROR;
use sift::store::JobStore;

use super::helpers::{file_in, wait_for, Target, TestEnv};

#[test]
#[serial]
fn test_match_in_second_dictionary_completes_job() {
    let env = TestEnv::new();
    let [d1, d2, _d3] = env.add_three_dictionaries("letmein99");
    let job = env.add_single_job("office", "Office", "letmein99");

    let engine = env.engine();
    let status = engine.runner.run(job.id).expect("run failed");
    assert_eq!(status, Some(JobStatus::Completed));

    let stored = env.job(&job);
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.current_dictionary.as_deref(), Some(d2.name.as_str()));
    assert_eq!(stored.progress, 100.0);
    assert!(stored.session.is_none());
    assert!(stored.completed_at.is_some());

    let results = env.store.results_for_job(job.id).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].password, "letmein99");
    assert_eq!(results[0].essid.as_deref(), Some("Office"));

    let attempts = env.store.attempts_for_job(job.id).unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].dictionary_id, d1.id);
    assert_eq!(attempts[0].status, AttemptStatus::Failed);
    assert_eq!(attempts[1].dictionary_id, d2.id);
    assert_eq!(attempts[1].status, AttemptStatus::Completed);

    assert_eq!(env.dictionaries_tried(), vec!["d1-small.txt", "d2-medium.txt"]);
    assert!(file_in(&env.config.completed_dir(), "office.pcapng"));
    assert!(!file_in(&env.config.pending_dir(), "office.pcapng"));
    assert!(stored.logs.contains("Trying dictionary d2-medium.txt"));
}

#[test]
#[serial]
fn test_no_match_fails_job_and_relocates_capture() {
    let env = TestEnv::new();
    env.add_three_dictionaries("not-the-password");
    let job = env.add_single_job("cafe", "Cafe", "s3cret-unknown");

    let status = env.engine().runner.run(job.id).expect("run failed");
    assert_eq!(status, Some(JobStatus::Failed));

    let stored = env.job(&job);
    assert_eq!(stored.error.as_deref(), Some(EXHAUSTED_ERROR));
    assert!(env.store.results_for_job(job.id).unwrap().is_empty());

    let attempts = env.store.attempts_for_job(job.id).unwrap();
    assert_eq!(attempts.len(), 3);
    assert!(attempts.iter().all(|a| a.status == AttemptStatus::Failed));

    assert!(file_in(&env.config.failed_dir(), "cafe.pcapng"));
    assert!(!file_in(&env.config.pending_dir(), "cafe.pcapng"));
    assert_eq!(stored.source_file, Some(env.config.failed_dir().join("cafe.pcapng")));
}

#[test]
#[serial]
fn test_batch_partial_crack_completes_and_settles_items() {
    let env = TestEnv::new();
    env.add_dictionary("d1.txt", &["apple", "alpha-pass", "charlie-pass"]);
    env.add_dictionary("d2.txt", &["banana", "cherry", "damson", "elder", "fig"]);
    let (job, items) = env.add_batch_job(
        "survey",
        &[
            Target {
                essid: "Alpha",
                bssid: "aa:bb:cc:00:00:0a",
                password: "alpha-pass",
            },
            Target {
                essid: "Bravo",
                bssid: "aa:bb:cc:00:00:0b",
                password: "bravo-never-found",
            },
            Target {
                essid: "Charlie",
                bssid: "aa:bb:cc:00:00:0c",
                password: "charlie-pass",
            },
        ],
    );

    let status = env.engine().runner.run(job.id).expect("run failed");
    assert_eq!(status, Some(JobStatus::Completed));

    let stored = env.job(&job);
    assert_eq!(stored.items_cracked, 2);
    assert_eq!(stored.items_total, 3);
    assert_eq!(env.dictionaries_tried(), vec!["d1.txt", "d2.txt"]);

    let results = env.store.results_for_job(job.id).unwrap();
    assert_eq!(results.len(), 2);

    let stored_items = env.store.items_for_job(job.id).unwrap();
    for item in &items {
        let current = stored_items.iter().find(|i| i.id == item.id).unwrap();
        let capture = format!("{}.pcapng", item.essid);
        if item.essid == "Bravo" {
            assert_eq!(current.status, ItemStatus::Failed);
            assert!(current.password.is_none());
            assert!(file_in(&env.config.failed_dir(), &capture));
        } else {
            assert_eq!(current.status, ItemStatus::Completed);
            assert!(current.password.is_some());
            assert!(file_in(&env.config.completed_dir(), &capture));
        }
        assert!(!file_in(&env.config.pending_dir(), &capture));
    }
}

#[test]
#[serial]
fn test_orphaned_job_is_reset_then_rerun_by_worker() {
    let env = TestEnv::new();
    env.add_three_dictionaries("orphan-pass");
    let job = env.add_single_job("orphan", "Orphan", "orphan-pass");

    // A previous worker died mid-run
    let crashed_at = env.clock.now();
    env.store
        .update_job(job.id, &mut |job| {
            job.try_start("sift-dead-session".to_string(), crashed_at)?;
            Ok(())
        })
        .unwrap();
    let old_run = env.job(&job).run_id;
    env.clock.advance(ChronoDuration::minutes(10));

    let worker = env.worker();
    let handle = worker.handle();
    let running = thread::spawn(move || worker.run());

    let store = env.store.clone();
    let finished = wait_for(Duration::from_secs(20), || {
        store
            .get_job(job.id)
            .map(|j| j.status == JobStatus::Completed)
            .unwrap_or(false)
    });
    handle.shutdown();
    running.join().unwrap().unwrap();
    assert!(finished, "worker never completed the recovered job");

    let stored = env.job(&job);
    assert_ne!(stored.run_id, old_run);
    assert!(stored.logs.contains("Reset to pending after worker restart"));
    assert!(stored.started_at.unwrap() > crashed_at);
    assert_eq!(env.store.results_for_job(job.id).unwrap().len(), 1);
}

#[test]
#[serial]
fn test_timeout_fails_job_and_kills_running_tool() {
    let env = TestEnv::new();
    env.add_dictionary("hang.txt", &["HANG"]);
    let job = env.add_single_job("slow", "Slow", "never");

    let engine = env.engine();
    let runner = engine.runner.clone();
    let running = thread::spawn(move || runner.run(job.id));

    let slot = engine.slot.clone();
    assert!(wait_for(Duration::from_secs(10), || slot.owner() == Some(job.id)));

    let started = env.job(&job).started_at.unwrap();
    let timed_out = engine
        .recovery
        .check_timeouts(started + ChronoDuration::hours(25));
    assert_eq!(timed_out, vec![job.id]);

    let status = running.join().unwrap().expect("run failed");
    assert_eq!(status, Some(JobStatus::Failed));
    assert!(engine.slot.owner().is_none());

    let stored = env.job(&job);
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.error.as_deref(), Some("Job timed out after 24 hours"));
    assert!(file_in(&env.config.failed_dir(), "slow.pcapng"));
}

#[test]
#[serial]
fn test_job_within_ceiling_is_left_alone() {
    let env = TestEnv::new();
    let job = env.add_single_job("fresh", "Fresh", "pw");
    let now = env.clock.now();
    env.store
        .update_job(job.id, &mut |job| {
            job.try_start("sift-fresh".to_string(), now)?;
            Ok(())
        })
        .unwrap();

    let engine = env.engine();
    assert!(engine
        .recovery
        .check_timeouts(now + ChronoDuration::hours(24))
        .is_empty());
    assert_eq!(env.job(&job).status, JobStatus::Processing);
}
