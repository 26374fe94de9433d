use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha3::Digest;
use std::collections::HashMap;
use std::io::{BufRead, Read, Write};
use std::path::PathBuf;

/// Summary of a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// The unique run id
    ///
    /// Chosen by the runner. Unique for each run.
    pub run_id: String,
    /// The name of the scenario that was run
    pub scenario_name: String,
    /// The time the run started
    ///
    /// This is a Unix timestamp in seconds.
    pub started_at: i64,
    /// The planned duration of the stages, in seconds
    pub planned_duration: u64,
    /// The stage plan as `(duration in milliseconds, target VUs)` pairs
    pub stages: Vec<(u64, usize)>,
    /// The number of VUs at the start of the first stage
    pub start_vus: usize,
    /// The highest number of VUs that were running at the same time
    pub peak_vus: usize,
    /// The total number of iterations completed by all VUs
    pub iterations: u64,
    /// True if the run was stopped before its stages completed or VUs had to be abandoned.
    pub forced: bool,
    /// The reason the run was stopped early, if it was
    pub stop_reason: Option<String>,
    /// The result of every threshold
    pub thresholds: Vec<ThresholdSummary>,
    /// The overall verdict, `passed`, `failed` or `inconclusive`
    pub verdict: String,
    /// Environment variables set for the run
    ///
    /// This won't capture all environment variables. Just the ones that the runner is aware of or
    /// that are included by the scenario itself.
    pub env: HashMap<String, String>,
    /// The version of Stampede that was used for this run
    pub stampede_version: String,
}

/// Result of a single threshold
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThresholdSummary {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub limit: f64,
    pub status: String,
}

impl RunSummary {
    /// Create a new run summary
    pub fn new(
        run_id: String,
        scenario_name: String,
        started_at: i64,
        planned_duration: u64,
        stages: Vec<(u64, usize)>,
        start_vus: usize,
        stampede_version: String,
    ) -> Self {
        Self {
            run_id,
            scenario_name,
            started_at,
            planned_duration,
            stages,
            start_vus,
            peak_vus: 0,
            iterations: 0,
            forced: false,
            stop_reason: None,
            thresholds: Vec::with_capacity(0),
            verdict: "inconclusive".to_string(),
            env: HashMap::with_capacity(0),
            stampede_version,
        }
    }

    /// Add an environment variable
    pub fn add_env(&mut self, key: String, value: String) {
        self.env.insert(key, value);
    }

    /// Compute a fingerprint for this run summary
    ///
    /// The fingerprint is intended to uniquely identify the configuration used to run the scenario,
    /// so that results of runs with the same load profile can be compared. It uses the
    ///     - Scenario name
    ///     - Stage plan and start VUs
    ///     - Threshold expressions
    ///     - Selected environment variables
    ///     - Stampede version
    ///
    /// The fingerprint is computed using [sha3::Sha3_256].
    pub fn fingerprint(&self) -> String {
        let mut hasher = sha3::Sha3_256::new();
        Digest::update(&mut hasher, self.scenario_name.as_bytes());
        Digest::update(&mut hasher, self.start_vus.to_le_bytes());
        for (duration, target) in &self.stages {
            Digest::update(&mut hasher, duration.to_le_bytes());
            Digest::update(&mut hasher, target.to_le_bytes());
        }
        self.thresholds
            .iter()
            .map(|t| (t.metric.as_str(), t.expression.as_str()))
            .sorted()
            .for_each(|(metric, expression)| {
                Digest::update(&mut hasher, metric.as_bytes());
                Digest::update(&mut hasher, expression.as_bytes());
            });
        self.env
            .iter()
            .sorted_by_key(|(k, _)| k.to_owned())
            .for_each(|(k, v)| {
                Digest::update(&mut hasher, k.as_bytes());
                Digest::update(&mut hasher, v.as_bytes());
            });
        Digest::update(&mut hasher, self.stampede_version.as_bytes());

        format!("{:x}", hasher.finalize())
    }
}

/// Append the run summary to a file
///
/// The summary will be serialized to JSON and output as a single line followed by a newline. The
/// recommended file extension is `.jsonl`.
pub fn append_run_summary(run_summary: RunSummary, path: PathBuf) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    store_run_summary(run_summary, &mut file)?;
    file.write_all("\n".as_bytes())?;
    Ok(())
}

/// Serialize the run summary to a writer
pub fn store_run_summary<W: Write>(run_summary: RunSummary, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer(writer, &run_summary)?;
    Ok(())
}

/// Load a run summary from a reader
pub fn load_run_summary<R: Read>(reader: R) -> anyhow::Result<RunSummary> {
    let reader = std::io::BufReader::new(reader);
    let run_summary: RunSummary = serde_json::from_reader(reader)?;
    Ok(run_summary)
}

/// Load run summaries from a file
///
/// The file should contain one JSON object per line. This is the format produced by
/// [append_run_summary].
pub fn load_summary_runs(path: PathBuf) -> anyhow::Result<Vec<RunSummary>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut runs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let run: RunSummary = serde_json::from_str(&line)?;
        runs.push(run);
    }
    Ok(runs)
}
