//! Integration tests for the listener agent

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use listener::error::SamplerResult;
use listener::presence::FsDirectoryLister;
use listener::{HistoryStore, ListenerConfig, PresenceChecker, Sampler, Scheduler};

/// Replays a fixed series of readings
struct ScriptedSampler {
    name: &'static str,
    readings: std::vec::IntoIter<&'static str>,
}

impl ScriptedSampler {
    fn boxed(name: &'static str, readings: &[&'static str]) -> Box<dyn Sampler> {
        Box::new(Self {
            name,
            readings: readings.to_vec().into_iter(),
        })
    }
}

impl Sampler for ScriptedSampler {
    fn name(&self) -> &str {
        self.name
    }

    fn sample(&mut self) -> SamplerResult<String> {
        Ok(self.readings.next().unwrap_or("0").to_string())
    }
}

/// Write a config file whose log and watch directory live in a temp dir
fn create_test_config(capacity: usize, files: &[&str]) -> (ListenerConfig, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let watch_dir = temp_dir.path().join("watched");
    fs::create_dir(&watch_dir).unwrap();

    let files = files
        .iter()
        .map(|file| format!("\"{}\"", file))
        .collect::<Vec<_>>()
        .join(", ");
    let content = format!(
        "log_name = {:?}\ndelay_time = 0.01\nnumber_of_items_per_line = {}\nfiles = [{}]\nwatch_dir = {:?}\n",
        temp_dir.path().join("listenerLog.log"),
        capacity,
        files,
        watch_dir,
    );
    let config_path = temp_dir.path().join("listener.toml");
    fs::write(&config_path, content).unwrap();

    let config = ListenerConfig::load_with_fallback(Some(&config_path)).unwrap();
    (config, temp_dir)
}

fn host_like_samplers() -> Vec<Box<dyn Sampler>> {
    vec![
        ScriptedSampler::boxed("cpu", &["10", "22", "17", "3"]),
        ScriptedSampler::boxed("memory", &["41.0", "41.5", "42.0", "40.9"]),
        ScriptedSampler::boxed("network", &["100/200", "150/260", "180/300", "181/305"]),
        ScriptedSampler::boxed("disk", &["5000/9000", "5001/8999", "5002/8998", "5003/8997"]),
    ]
}

#[test]
fn test_four_channel_log_layout() {
    let (config, _temp_dir) = create_test_config(3, &[]);
    let checker = PresenceChecker::from_config(&config);
    let mut scheduler = Scheduler::new(&config, host_like_samplers(), checker);

    for _ in 0..3 {
        scheduler.tick().unwrap();
    }
    assert_eq!(
        fs::read_to_string(&config.log_name).unwrap(),
        "10|22|17\n41.0|41.5|42.0\n100/200|150/260|180/300\n5000/9000|5001/8999|5002/8998\n"
    );

    scheduler.tick().unwrap();
    assert_eq!(
        fs::read_to_string(&config.log_name).unwrap(),
        "22|17|3\n41.5|42.0|40.9\n150/260|180/300|181/305\n5001/8999|5002/8998|5003/8997\n"
    );
}

#[test]
fn test_missing_required_file_is_reported_every_tick() {
    let (config, _temp_dir) = create_test_config(2, &["hosts.txt", "config.py"]);
    fs::write(config.watch_dir.join("config.py"), "").unwrap();

    let checker = PresenceChecker::new(
        config.files.clone(),
        Box::new(FsDirectoryLister::new(config.watch_dir.clone())),
    );
    let mut scheduler = Scheduler::new(&config, host_like_samplers(), checker);

    for _ in 0..2 {
        let report = scheduler.tick().unwrap();
        let missing: Vec<&str> = report.missing.iter().map(|alert| alert.file.as_str()).collect();
        assert_eq!(missing, vec!["hosts.txt"]);
    }

    fs::write(config.watch_dir.join("hosts.txt"), "").unwrap();
    assert!(scheduler.tick().unwrap().missing.is_empty());
}

#[test]
fn test_restart_continues_existing_history() {
    let (config, _temp_dir) = create_test_config(2, &[]);

    {
        let mut scheduler = Scheduler::new(
            &config,
            vec![ScriptedSampler::boxed("cpu", &["5", "7"])],
            PresenceChecker::from_config(&config),
        );
        scheduler.tick().unwrap();
        scheduler.tick().unwrap();
    }

    let mut scheduler = Scheduler::new(
        &config,
        vec![ScriptedSampler::boxed("cpu", &["9"])],
        PresenceChecker::from_config(&config),
    );
    scheduler.tick().unwrap();

    assert_eq!(scheduler.store().read_channel(0).unwrap(), vec!["7", "9"]);
}

#[test]
fn test_corrupted_log_recovers_without_error() {
    let (config, _temp_dir) = create_test_config(3, &[]);
    fs::write(&config.log_name, "1|2|3|4|5|6|7\n\u{0}garbage|||\n").unwrap();

    let mut scheduler = Scheduler::new(
        &config,
        vec![
            ScriptedSampler::boxed("cpu", &["8"]),
            ScriptedSampler::boxed("memory", &["50.0"]),
        ],
        PresenceChecker::from_config(&config),
    );
    scheduler.tick().unwrap();

    let store = HistoryStore::from_config(&config);
    assert_eq!(store.read_channel(0).unwrap(), vec!["6", "7", "8"]);
    assert_eq!(store.read_channel(1).unwrap().last().map(String::as_str), Some("50.0"));
    assert_eq!(store.read_channel(1).unwrap().len(), 3);
}

#[test]
fn test_no_temp_files_left_behind() {
    let (config, temp_dir) = create_test_config(2, &[]);
    let mut scheduler = Scheduler::new(
        &config,
        host_like_samplers(),
        PresenceChecker::from_config(&config),
    );
    for _ in 0..4 {
        scheduler.tick().unwrap();
    }

    let mut names: Vec<PathBuf> = fs::read_dir(temp_dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            temp_dir.path().join("listener.toml"),
            temp_dir.path().join("listenerLog.log"),
            temp_dir.path().join("watched"),
        ]
    );
}
