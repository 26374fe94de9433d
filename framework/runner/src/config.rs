use crate::cli::StampedeScenarioCli;
use crate::stages::{Stage, StagePlan};
use serde::Deserialize;
use stampede_instruments::{Threshold, ThresholdParseError, ThresholdSet};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_TICK: Duration = Duration::from_secs(1);
const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid threshold [{expression}] for metric [{metric}]: {source}")]
    Threshold {
        metric: String,
        expression: String,
        source: ThresholdParseError,
    },
    #[error("`--vus` requires a duration, set `--duration` or a default duration for the scenario")]
    MissingDuration,
    #[error("No load profile, set `--stage`, `--vus` and `--duration` or configure stages")]
    NoLoadProfile,
    #[error("The scheduler tick must be greater than zero")]
    ZeroTick,
}

/// A threshold as written in the config file, either just the expression or a table with options.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ThresholdEntry {
    Expression(String),
    Detailed {
        threshold: String,
        #[serde(default)]
        abort_on_fail: bool,
        #[serde(default)]
        allow_empty: bool,
    },
}

impl ThresholdEntry {
    fn to_threshold(&self, metric: &str) -> Result<Threshold, ConfigError> {
        let (expression, abort_on_fail, allow_empty) = match self {
            ThresholdEntry::Expression(expression) => (expression, false, false),
            ThresholdEntry::Detailed {
                threshold,
                abort_on_fail,
                allow_empty,
            } => (threshold, *abort_on_fail, *allow_empty),
        };

        Threshold::parse(metric, expression)
            .map(|t| {
                t.with_abort_on_fail(abort_on_fail)
                    .with_allow_empty(allow_empty)
            })
            .map_err(|source| ConfigError::Threshold {
                metric: metric.to_string(),
                expression: expression.to_string(),
                source,
            })
    }
}

/// The contents of a run configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default)]
    pub start_vus: Option<usize>,
    #[serde(default, with = "humantime_serde")]
    pub tick: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub iteration_pause: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub drain_grace: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub max_duration: Option<Duration>,
    #[serde(default)]
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub thresholds: BTreeMap<String, Vec<ThresholdEntry>>,
    /// Settings for the scenario itself, see [crate::context::RunnerContext::scenario_config].
    #[serde(default)]
    pub scenario: Option<toml::Table>,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Defaults chosen by the scenario author, used when neither the command line nor the config file
/// say otherwise.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScenarioDefaults {
    pub(crate) vus: Option<usize>,
    pub(crate) duration: Option<Duration>,
    pub(crate) start_vus: usize,
    pub(crate) stages: Vec<Stage>,
    pub(crate) iteration_pause: Option<Duration>,
    pub(crate) thresholds: Vec<(String, String)>,
}

/// Everything the runner needs to know about a run, after combining the command line, the config
/// file and the scenario defaults.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub stages: StagePlan,
    pub tick: Duration,
    pub iteration_pause: Duration,
    pub drain_grace: Duration,
    pub max_duration: Duration,
    pub thresholds: ThresholdSet,
    pub seed: u64,
    pub run_id: String,
    pub base_url: Option<String>,
    pub scenario: toml::Table,
}

impl RunPlan {
    pub(crate) fn resolve(
        cli: &StampedeScenarioCli,
        defaults: &ScenarioDefaults,
    ) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => RunConfig::load(path)?,
            None => RunConfig::default(),
        };

        Self::resolve_with(cli, file, defaults)
    }

    fn resolve_with(
        cli: &StampedeScenarioCli,
        file: RunConfig,
        defaults: &ScenarioDefaults,
    ) -> Result<Self, ConfigError> {
        let stages = resolve_stages(cli, &file, defaults)?;

        let tick = file.tick.unwrap_or(DEFAULT_TICK);
        if tick.is_zero() {
            return Err(ConfigError::ZeroTick);
        }

        let drain_grace = file.drain_grace.unwrap_or(DEFAULT_DRAIN_GRACE);
        let max_duration = cli
            .max_duration
            .or(file.max_duration)
            .unwrap_or_else(|| stages.total_duration() + drain_grace);

        let mut thresholds = Vec::new();
        if file.thresholds.is_empty() {
            for (metric, expression) in &defaults.thresholds {
                thresholds
                    .push(ThresholdEntry::Expression(expression.clone()).to_threshold(metric)?);
            }
        } else {
            for (metric, entries) in &file.thresholds {
                for entry in entries {
                    thresholds.push(entry.to_threshold(metric)?);
                }
            }
        }
        for (metric, expression) in &cli.thresholds {
            thresholds.push(ThresholdEntry::Expression(expression.clone()).to_threshold(metric)?);
        }

        let seed = cli.seed.unwrap_or_else(|| {
            let now = chrono::Utc::now();
            now.timestamp_nanos_opt()
                .unwrap_or_else(|| now.timestamp_micros()) as u64
        });

        Ok(Self {
            stages,
            tick,
            iteration_pause: file
                .iteration_pause
                .or(defaults.iteration_pause)
                .unwrap_or(Duration::ZERO),
            drain_grace,
            max_duration,
            thresholds: ThresholdSet::new(thresholds),
            seed,
            run_id: cli.run_id.clone().unwrap_or_else(|| nanoid::nanoid!()),
            base_url: cli.base_url.clone(),
            scenario: file.scenario.unwrap_or_default(),
        })
    }
}

fn resolve_stages(
    cli: &StampedeScenarioCli,
    file: &RunConfig,
    defaults: &ScenarioDefaults,
) -> Result<StagePlan, ConfigError> {
    if !cli.stages.is_empty() {
        return Ok(StagePlan::new(
            file.start_vus.unwrap_or(0),
            cli.stages.clone(),
        ));
    }

    if cli.vus.is_some() || cli.duration.is_some() {
        let vus = cli.vus.or(defaults.vus).unwrap_or(1);
        let duration = cli
            .duration
            .or(defaults.duration)
            .ok_or(ConfigError::MissingDuration)?;
        return Ok(StagePlan::constant(vus, duration));
    }

    if !file.stages.is_empty() {
        return Ok(StagePlan::new(
            file.start_vus.unwrap_or(0),
            file.stages.clone(),
        ));
    }

    if !defaults.stages.is_empty() {
        return Ok(StagePlan::new(
            file.start_vus.unwrap_or(defaults.start_vus),
            defaults.stages.clone(),
        ));
    }

    match defaults.duration {
        Some(duration) => Ok(StagePlan::constant(defaults.vus.unwrap_or(1), duration)),
        None => Err(ConfigError::NoLoadProfile),
    }
}
