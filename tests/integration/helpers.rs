//! Shared fixtures: a temporary data directory, a stand-in cracking tool and
//! builders for the engine components.

use chrono::{TimeZone, Utc};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use sift::clock::{Clock, ManualClock};
use sift::config::WorkerConfig;
use sift::fs::Storage;
use sift::models::{Dictionary, Job, JobItem};
use sift::orchestrator::{
    AttackExecutor, BatchCoordinator, JobRunner, RecoveryManager, Scheduler, SessionMonitor,
    TranscriptProbe, Worker,
};
use sift::process::ProcessSlot;
use sift::store::{FileStore, JobStore};

/// Stand-in for hashcat, called with the same arguments.
///
/// The last `*` field of every hash line is the password that cracks it.
/// A dictionary containing the word `HANG` makes the tool print its first
/// status block and then block forever without further output.
const FAKE_HASHCAT: &str = r#"#!/bin/sh
hash="$5"
dict="$6"
bindir=$(dirname "$0")
echo "$(basename "$hash") $(basename "$dict")" >> "$bindir/invocations.log"

echo "Session..........: $8"
echo "Status...........: Running"
echo "Speed.#1.........:     1234.5 kH/s (12.34ms) @ Accel:64 Loops:128 Thr:1 Vec:8"
echo "Time.Estimated...: Sat Jan  6 10:00:00 2024 (1 min, 2 secs)"
echo "Progress.........: 1/2 (50.00%)"

if grep -qx 'HANG' "$dict"; then
    exec sleep 600
fi

if ! mkdir "$bindir/active.lock" 2>/dev/null; then
    echo overlap >> "$bindir/overlap.log"
fi

total=0
found=0
while IFS= read -r line; do
    [ -z "$line" ] && continue
    total=$((total + 1))
    expected="${line##*\*}"
    if [ -n "$expected" ] && grep -qxF -- "$expected" "$dict"; then
        echo "$line:$expected"
        found=$((found + 1))
    fi
done < "$hash"

echo "Progress.........: 2/2 (100.00%)"
rmdir "$bindir/active.lock" 2>/dev/null

if [ "$found" -gt 0 ] && [ "$found" -eq "$total" ]; then
    echo "Status...........: Cracked"
    exit 0
fi
echo "Status...........: Exhausted"
if [ "$found" -gt 0 ]; then
    exit 0
fi
exit 1
"#;

pub struct TestEnv {
    pub temp: TempDir,
    pub config: WorkerConfig,
    pub store: Arc<FileStore>,
    pub storage: Storage,
    pub clock: Arc<ManualClock>,
}

/// One batch target: ESSID, BSSID and the password in its hash line.
pub struct Target<'a> {
    pub essid: &'a str,
    pub bssid: &'a str,
    pub password: &'a str,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let bin = temp.path().join("bin");
        fs::create_dir_all(&bin).expect("Failed to create bin dir");
        let cracker = bin.join("hashcat");
        fs::write(&cracker, FAKE_HASHCAT).expect("Failed to write fake hashcat");
        fs::set_permissions(&cracker, fs::Permissions::from_mode(0o755))
            .expect("Failed to make fake hashcat executable");

        let mut config = WorkerConfig::with_data_dir(temp.path().join("data"));
        config.cracker_path = cracker;
        config.poll_interval_secs = 1;
        config.monitor_interval_secs = 1;
        config.timeout_check_interval_secs = 1;
        config.kill_grace_millis = 200;
        config.status_timer_secs = 1;

        let store = Arc::new(FileStore::open(config.store_dir()).expect("Failed to open store"));
        let storage = Storage::from_config(&config);
        storage.ensure().expect("Failed to create storage areas");
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        Self {
            temp,
            config,
            store,
            storage,
            clock: Arc::new(ManualClock::new(start)),
        }
    }

    pub fn dyn_store(&self) -> Arc<dyn JobStore> {
        self.store.clone()
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.temp.path().join("bin")
    }

    /// Register a dictionary. Later dictionaries must be larger to keep the
    /// attempt order obvious.
    pub fn add_dictionary(&self, name: &str, words: &[&str]) -> Dictionary {
        let path = self.config.dictionaries_dir().join(name);
        let mut content = words.join("\n");
        content.push('\n');
        fs::write(&path, &content).expect("Failed to write dictionary");
        let dictionary = Dictionary::new(name, path, content.len() as u64);
        self.store
            .save_dictionary(&dictionary)
            .expect("Failed to save dictionary");
        dictionary
    }

    /// Three dictionaries of growing size; only `second` holds `password`.
    pub fn add_three_dictionaries(&self, password: &str) -> [Dictionary; 3] {
        [
            self.add_dictionary("d1-small.txt", &["alpha", "bravo"]),
            self.add_dictionary("d2-medium.txt", &["charlie", password, "delta", "echo"]),
            self.add_dictionary(
                "d3-large.txt",
                &["foxtrot", "golf", "hotel", "india", "juliett", "kilo"],
            ),
        ]
    }

    fn write_pending(&self, name: &str, content: &str) -> PathBuf {
        let path = self.config.pending_dir().join(name);
        fs::write(&path, content).expect("Failed to write pending file");
        path
    }

    /// Pending single-target job with a capture in the pending area.
    pub fn add_single_job(&self, name: &str, essid: &str, password: &str) -> Job {
        let hash_file = self.write_pending(
            &format!("{name}.22000"),
            &format!("{}\n", hash_line(essid, "aabbcc000001", password)),
        );
        let capture = self.write_pending(&format!("{name}.pcapng"), "capture");
        let job = Job::new(name, hash_file, self.clock.now()).with_source_file(capture);
        self.store.save_job(&job).expect("Failed to save job");
        job
    }

    /// Pending batch job with one item and one capture per target.
    pub fn add_batch_job(&self, name: &str, targets: &[Target<'_>]) -> (Job, Vec<JobItem>) {
        let lines: String = targets
            .iter()
            .map(|t| format!("{}\n", hash_line(t.essid, &t.bssid.replace(':', ""), t.password)))
            .collect();
        let hash_file = self.write_pending(&format!("{name}.22000"), &lines);
        let job = Job::new_batch(name, hash_file, targets.len() as u32, self.clock.now());
        self.store.save_job(&job).expect("Failed to save job");

        let items = targets
            .iter()
            .map(|t| {
                let capture = self.write_pending(&format!("{}.pcapng", t.essid), "capture");
                let item = JobItem::new(job.id, t.essid, Some(t.bssid.to_string()))
                    .with_source_file(capture);
                self.store.save_item(&item).expect("Failed to save item");
                item
            })
            .collect();
        (job, items)
    }

    /// Dictionary file names in the order the tool was invoked with them.
    pub fn invocations(&self) -> Vec<String> {
        fs::read_to_string(self.bin_dir().join("invocations.log"))
            .unwrap_or_default()
            .lines()
            .map(|line| line.to_string())
            .collect()
    }

    pub fn dictionaries_tried(&self) -> Vec<String> {
        self.invocations()
            .iter()
            .filter_map(|line| line.split_whitespace().nth(1).map(str::to_string))
            .collect()
    }

    pub fn overlapped(&self) -> bool {
        self.bin_dir().join("overlap.log").exists()
    }

    pub fn engine(&self) -> Engine {
        let slot = ProcessSlot::new(self.config.kill_grace());
        let store = self.dyn_store();
        let clock: Arc<dyn Clock> = self.clock.clone();
        let runner = JobRunner::new(
            store.clone(),
            AttackExecutor::new(&self.config, slot.clone()),
            BatchCoordinator::new(store.clone(), self.storage.clone()),
            self.storage.clone(),
            clock,
        );
        let recovery = RecoveryManager::new(store.clone(), slot.clone(), self.config.job_timeout());
        let monitor = SessionMonitor::new(
            store.clone(),
            Box::new(TranscriptProbe::new(self.storage.clone())),
            BatchCoordinator::new(store, self.storage.clone()),
            slot.clone(),
            self.config.stale_threshold(),
        );
        Engine {
            slot,
            runner: Arc::new(runner),
            recovery: Arc::new(recovery),
            monitor,
        }
    }

    pub fn scheduler(&self, priority_ordering: bool) -> (Arc<Scheduler>, ProcessSlot) {
        let Engine {
            slot,
            runner,
            recovery,
            ..
        } = self.engine();
        let runner = Arc::try_unwrap(runner)
            .unwrap_or_else(|_| panic!("runner should not be shared yet"));
        let scheduler = Scheduler::new(
            self.dyn_store(),
            runner,
            recovery,
            self.clock.clone(),
            self.config.poll_interval(),
            priority_ordering,
        );
        (Arc::new(scheduler), slot)
    }

    pub fn worker(&self) -> Worker {
        Worker::new(self.config.clone(), self.dyn_store(), self.clock.clone())
            .expect("Failed to build worker")
    }

    pub fn job(&self, job: &Job) -> Job {
        self.store.get_job(job.id).expect("Failed to load job")
    }
}

pub struct Engine {
    pub slot: ProcessSlot,
    pub runner: Arc<JobRunner>,
    pub recovery: Arc<RecoveryManager>,
    pub monitor: SessionMonitor,
}

/// `WPA*02` hash line whose last field is the password that cracks it.
pub fn hash_line(essid: &str, bssid_hex: &str, password: &str) -> String {
    format!(
        "WPA*02*00112233445566778899aabbccddeeff*{bssid_hex}*112233445566*{}*aa00*0103*{password}",
        hex::encode(essid)
    )
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    condition()
}

pub fn file_in(dir: &Path, name: &str) -> bool {
    dir.join(name).is_file()
}
