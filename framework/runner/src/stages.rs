use serde::Deserialize;
use std::time::Duration;

/// One step of the load profile. Concurrency ramps linearly from wherever the previous stage ended
/// to `target` over `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Stage {
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub target: usize,
}

impl Stage {
    pub fn new(duration: Duration, target: usize) -> Self {
        Self { duration, target }
    }
}

/// Parse a stage from the command line, in the format `duration:target`, for example `1m:1000`.
pub(crate) fn parse_stage(s: &str) -> anyhow::Result<Stage> {
    let (duration, target) = s
        .rsplit_once(':')
        .ok_or_else(|| anyhow::anyhow!("Stage [{s}] must be in the format `duration:target`"))?;

    let duration = humantime::parse_duration(duration.trim())
        .map_err(|e| anyhow::anyhow!("Invalid stage duration [{duration}]: {e}"))?;
    let target = target
        .trim()
        .parse::<usize>()
        .map_err(|e| anyhow::anyhow!("Invalid stage target [{target}]: {e}"))?;

    Ok(Stage::new(duration, target))
}

/// The ordered, immutable list of stages for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    start_vus: usize,
    stages: Vec<Stage>,
}

impl StagePlan {
    pub fn new(start_vus: usize, stages: Vec<Stage>) -> Self {
        Self { start_vus, stages }
    }

    /// A fixed number of VUs for a fixed duration.
    pub fn constant(vus: usize, duration: Duration) -> Self {
        Self::new(vus, vec![Stage::new(duration, vus)])
    }

    pub fn start_vus(&self) -> usize {
        self.start_vus
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// The highest concurrency that the plan asks for at any point.
    pub fn max_vus(&self) -> usize {
        self.stages
            .iter()
            .map(|s| s.target)
            .fold(self.start_vus, usize::max)
    }

    /// The number of VUs that should be running `elapsed` into the run.
    ///
    /// Inside a stage the value is interpolated between the previous stage's target and this
    /// stage's target, rounded to the nearest VU. Once every stage has elapsed the run is over and
    /// the desired concurrency is zero.
    pub fn desired_at(&self, elapsed: Duration) -> usize {
        let mut stage_start = Duration::ZERO;
        let mut previous = self.start_vus;

        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                let progress = (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                let delta = stage.target as f64 - previous as f64;
                return (previous as f64 + progress * delta).round().max(0.0) as usize;
            }

            stage_start = stage_end;
            previous = stage.target;
        }

        0
    }

    /// Index of the stage that is active at `elapsed`, `None` once the plan has finished.
    pub fn stage_index_at(&self, elapsed: Duration) -> Option<usize> {
        let mut stage_end = Duration::ZERO;
        self.stages.iter().position(|stage| {
            stage_end += stage.duration;
            elapsed < stage_end
        })
    }
}
