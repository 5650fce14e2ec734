//! Engine-wide guarantees: ordering, exclusivity, idempotence and the
//! ways a running attack can be cut short.

use chrono::Duration as ChronoDuration;
use serial_test::serial;
use std::thread;
use std::time::Duration;

use sift::clock::Clock;
use sift::commands::jobs::{apply_action, JobAction};
use sift::models::{JobStatus, ItemStatus};
use sift::orchestrator::monitor::{SessionOutcome, STALE_SESSION_ERROR};
use sift::orchestrator::runner::NO_DICTIONARIES_ERROR;
use sift::store::JobStore;

use super::helpers::{file_in, wait_for, Target, TestEnv};

#[test]
#[serial]
fn test_scheduler_runs_jobs_oldest_first() {
    let env = TestEnv::new();
    env.add_dictionary("words.txt", &["nope"]);
    let first = env.add_single_job("first", "First", "x1");
    env.clock.advance(ChronoDuration::seconds(1));
    let second = env.add_single_job("second", "Second", "x2");
    env.clock.advance(ChronoDuration::seconds(1));
    let third = env.add_single_job("third", "Third", "x3");

    let (scheduler, _slot) = env.scheduler(false);
    assert_eq!(scheduler.next_job().unwrap().unwrap().id, first.id);
    while scheduler.poll_once() {}

    let hash_files: Vec<String> = env
        .invocations()
        .iter()
        .map(|line| line.split_whitespace().next().unwrap().to_string())
        .collect();
    assert_eq!(
        hash_files,
        vec!["first.22000", "second.22000", "third.22000"]
    );
    for job in [&first, &second, &third] {
        assert_eq!(env.job(job).status, JobStatus::Failed);
    }
}

#[test]
#[serial]
fn test_priority_ordering_prefers_higher_priority() {
    let env = TestEnv::new();
    let low = env.add_single_job("low", "Low", "x");
    env.clock.advance(ChronoDuration::seconds(1));
    let high = env
        .add_single_job("high", "High", "y")
        .with_priority(5);
    env.store.save_job(&high).unwrap();

    let (fifo, _) = env.scheduler(false);
    assert_eq!(fifo.next_job().unwrap().unwrap().id, low.id);

    let (by_priority, _) = env.scheduler(true);
    assert_eq!(by_priority.next_job().unwrap().unwrap().id, high.id);
}

#[test]
#[serial]
fn test_only_one_job_runs_at_a_time() {
    let env = TestEnv::new();
    env.add_dictionary("hang.txt", &["HANG"]);
    let busy_job = env.add_single_job("busy", "Busy", "x");
    env.clock.advance(ChronoDuration::seconds(1));
    let waiting = env.add_single_job("waiting", "Waiting", "y");

    let (scheduler, slot) = env.scheduler(false);
    let background = scheduler.clone();
    let running = thread::spawn(move || background.poll_once());

    assert!(wait_for(Duration::from_secs(10), || slot.owner() == Some(busy_job.id)));
    assert!(scheduler.is_busy());
    assert!(!scheduler.poll_once(), "a second poll must not start another job");
    assert_eq!(env.job(&waiting).status, JobStatus::Pending);

    slot.kill_current_process();
    assert!(running.join().unwrap());
    assert!(!scheduler.is_busy());
    assert_eq!(env.job(&busy_job).status, JobStatus::Failed);
    assert!(!env.overlapped());
}

#[test]
#[serial]
fn test_dictionary_order_is_stable_across_runs() {
    let env = TestEnv::new();
    env.add_dictionary("zz-tiny.txt", &["a"]);
    env.add_dictionary("aa-huge.txt", &["one", "two", "three", "four", "five"]);
    env.add_dictionary("mm-mid.txt", &["b", "c"]);
    let job = env.add_single_job("repeat", "Repeat", "absent");
    let engine = env.engine();

    engine.runner.run(job.id).unwrap();
    let first_run = env.dictionaries_tried();

    env.clock.advance(ChronoDuration::minutes(1));
    apply_action(env.store.as_ref(), &job.id.to_string(), JobAction::Requeue, env.clock.now())
        .unwrap();
    engine.runner.run(job.id).unwrap();
    let both_runs = env.dictionaries_tried();

    assert_eq!(first_run, vec!["zz-tiny.txt", "mm-mid.txt", "aa-huge.txt"]);
    assert_eq!(&both_runs[3..], first_run.as_slice());
}

#[test]
#[serial]
fn test_duplicate_credentials_are_recorded_once() {
    let env = TestEnv::new();
    // Both dictionaries crack Alpha; Bravo is never found
    env.add_dictionary("d1.txt", &["alpha-pass"]);
    env.add_dictionary("d2.txt", &["alpha-pass", "zzz", "yyy"]);
    let (job, _) = env.add_batch_job(
        "dupes",
        &[
            Target {
                essid: "Alpha",
                bssid: "aa:bb:cc:00:00:0a",
                password: "alpha-pass",
            },
            Target {
                essid: "Bravo",
                bssid: "aa:bb:cc:00:00:0b",
                password: "bravo-pass",
            },
        ],
    );

    env.engine().runner.run(job.id).unwrap();

    assert_eq!(env.dictionaries_tried(), vec!["d1.txt", "d2.txt"]);
    let stored = env.job(&job);
    assert_eq!(stored.items_cracked, 1);
    assert_eq!(env.store.results_for_job(job.id).unwrap().len(), 1);
}

#[test]
#[serial]
fn test_fully_cracked_batch_starts_no_more_attempts() {
    let env = TestEnv::new();
    env.add_dictionary("d1.txt", &["pa", "pb"]);
    env.add_dictionary("d2.txt", &["pa", "pb", "pc", "pd"]);
    let (job, _) = env.add_batch_job(
        "all",
        &[
            Target {
                essid: "A",
                bssid: "aa:bb:cc:00:00:01",
                password: "pa",
            },
            Target {
                essid: "B",
                bssid: "aa:bb:cc:00:00:02",
                password: "pb",
            },
        ],
    );

    let status = env.engine().runner.run(job.id).unwrap();
    assert_eq!(status, Some(JobStatus::Completed));
    assert_eq!(env.dictionaries_tried(), vec!["d1.txt"]);

    let stored = env.job(&job);
    assert_eq!(stored.items_cracked, stored.items_total);
    assert!(env
        .store
        .items_for_job(job.id)
        .unwrap()
        .iter()
        .all(|item| item.status == ItemStatus::Completed));
}

#[test]
#[serial]
fn test_no_dictionaries_fails_job() {
    let env = TestEnv::new();
    let job = env.add_single_job("lonely", "Lonely", "x");

    let status = env.engine().runner.run(job.id).unwrap();
    assert_eq!(status, Some(JobStatus::Failed));
    assert_eq!(env.job(&job).error.as_deref(), Some(NO_DICTIONARIES_ERROR));
    assert!(env.invocations().is_empty());
}

#[test]
#[serial]
fn test_stale_session_fails_job_and_kills_tool() {
    let env = TestEnv::new();
    env.add_dictionary("hang.txt", &["HANG"]);
    let job = env.add_single_job("stuck", "Stuck", "x");

    let mut engine = env.engine();
    let runner = engine.runner.clone();
    let running = thread::spawn(move || runner.run(job.id));
    let slot = engine.slot.clone();
    assert!(wait_for(Duration::from_secs(10), || slot.owner() == Some(job.id)));

    // Let the first status block reach the transcript
    let transcript = env.storage.session_transcript(env.job(&job).session.as_deref().unwrap());
    assert!(wait_for(Duration::from_secs(10), || {
        std::fs::read_to_string(&transcript)
            .map(|t| t.contains("Progress"))
            .unwrap_or(false)
    }));

    let start = env.clock.now();
    assert_eq!(
        engine.monitor.tick(start),
        vec![(job.id, SessionOutcome::Updated)]
    );
    assert_eq!(
        engine.monitor.tick(start + ChronoDuration::seconds(30)),
        vec![(job.id, SessionOutcome::Updated)]
    );
    assert_eq!(
        engine.monitor.tick(start + ChronoDuration::seconds(31)),
        vec![(job.id, SessionOutcome::Stale)]
    );

    let status = running.join().unwrap().unwrap();
    assert_eq!(status, Some(JobStatus::Failed));
    let stored = env.job(&job);
    assert_eq!(stored.error.as_deref(), Some(STALE_SESSION_ERROR));
    assert_eq!(stored.progress, 50.0);
    assert!(file_in(&env.config.failed_dir(), "stuck.pcapng"));
}

#[test]
#[serial]
fn test_user_stop_kills_tool_and_keeps_stopped_status() {
    let env = TestEnv::new();
    env.add_dictionary("hang.txt", &["HANG"]);
    env.add_dictionary("later.txt", &["x", "y", "z", "w"]);
    let job = env.add_single_job("halt", "Halt", "never");

    let mut engine = env.engine();
    let runner = engine.runner.clone();
    let running = thread::spawn(move || runner.run(job.id));
    let slot = engine.slot.clone();
    assert!(wait_for(Duration::from_secs(10), || slot.owner() == Some(job.id)));

    apply_action(env.store.as_ref(), &job.short_id(), JobAction::Stop, env.clock.now()).unwrap();
    engine.monitor.tick(env.clock.now());

    let status = running.join().unwrap().unwrap();
    assert_eq!(status, Some(JobStatus::Stopped));
    assert_eq!(env.job(&job).status, JobStatus::Stopped);
    assert_eq!(env.dictionaries_tried(), vec!["hang.txt"]);
    // Stopped captures stay where they are
    assert!(file_in(&env.config.pending_dir(), "halt.pcapng"));
}

#[test]
#[serial]
fn test_worker_shutdown_leaves_job_for_recovery() {
    let env = TestEnv::new();
    env.add_dictionary("hang.txt", &["HANG"]);
    let job = env.add_single_job("interrupted", "Interrupted", "x");

    let worker = env.worker();
    let handle = worker.handle();
    let slot = worker.slot().clone();
    let running = thread::spawn(move || worker.run());

    assert!(wait_for(Duration::from_secs(10), || slot.owner() == Some(job.id)));
    handle.shutdown();
    running.join().unwrap().unwrap();

    assert!(slot.owner().is_none());
    assert_eq!(env.job(&job).status, JobStatus::Processing);

    let report = env
        .engine()
        .recovery
        .cleanup_orphaned_jobs(env.clock.now())
        .unwrap();
    assert_eq!(report.reset, vec![job.id]);
    let stored = env.job(&job);
    assert_eq!(stored.status, JobStatus::Pending);
    assert!(stored.started_at.is_none());
}
