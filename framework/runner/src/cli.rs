use crate::stages::{parse_stage, Stage};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Used when neither `--base-url` nor `BASE_URL` is set.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Clone, Debug, Default, ValueEnum)]
pub enum ReporterOpt {
    /// Print tables of every metric and threshold to stdout once the run is complete.
    #[default]
    Summary,
    /// Do not report anything. Mostly useful for tests.
    Noop,
}

#[derive(Parser, Clone, Debug)]
#[command(about, long_about = None)]
pub struct StampedeScenarioCli {
    /// Base URL of the service to test.
    #[clap(short, long, env = "BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: Option<String>,

    /// Path to a TOML file with the load profile, thresholds and scenario settings.
    ///
    /// Values given on the command line take precedence over values in this file.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Run a constant number of VUs. Must be combined with `--duration`, replaces any configured stages.
    #[clap(long)]
    pub vus: Option<usize>,

    /// How long to run a constant number of VUs for, for example `30s` or `5m`.
    #[clap(long, value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,

    /// Add a stage to the load profile in the format `duration:target`. For example `--stage 1m:1000`.
    ///
    /// You can specify multiple stages by using the flag multiple times. They run in the order given.
    /// Any stages given here replace the stages from the config file and the scenario defaults.
    #[clap(long = "stage", value_parser = parse_stage)]
    pub stages: Vec<Stage>,

    /// Add a threshold in the format `metric:expression`. For example `--threshold "http_req_duration:p(95)<50"`.
    ///
    /// Thresholds given here are added to any configured thresholds.
    #[clap(long = "threshold", value_parser = parse_threshold_arg)]
    pub thresholds: Vec<(String, String)>,

    /// Hard limit on the run time, including the drain at the end of the run. When it is reached the
    /// run is stopped and the verdict is at best inconclusive.
    #[clap(long, value_parser = humantime::parse_duration)]
    pub max_duration: Option<Duration>,

    /// Seed for the random choices that VUs make. Runs with the same seed make the same choices.
    #[clap(long)]
    pub seed: Option<u64>,

    /// Identifier for this run, included in the run summary. A random one is generated if not set.
    #[clap(long)]
    pub run_id: Option<String>,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,

    /// How to report the results of the run
    #[clap(long, value_enum, default_value_t = ReporterOpt::Summary)]
    pub reporter: ReporterOpt,

    /// Append a JSON summary of the run to this file
    #[clap(long)]
    pub summary_file: Option<PathBuf>,
}

fn parse_threshold_arg(s: &str) -> anyhow::Result<(String, String)> {
    let (metric, expression) = s.split_once(':').ok_or_else(|| {
        anyhow::anyhow!("Threshold [{s}] must be in the format `metric:expression`")
    })?;

    let metric = metric.trim();
    if metric.is_empty() {
        anyhow::bail!("No metric specified for threshold [{s}]");
    }

    Ok((metric.to_string(), expression.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;
    use std::ffi::OsStr;

    #[test]
    fn parse_full_command_line() {
        let cli = StampedeScenarioCli::parse_from([
            "merch_store",
            "--base-url",
            "http://localhost:8080",
            "--stage",
            "1m:1000",
            "--stage",
            "3m:1000",
            "--threshold",
            "http_req_duration:p(95)<50",
            "--max-duration",
            "10m",
            "--seed",
            "42",
            "--reporter",
            "noop",
        ]);

        assert_eq!(Some("http://localhost:8080".to_string()), cli.base_url);
        assert_eq!(
            vec![
                Stage::new(Duration::from_secs(60), 1000),
                Stage::new(Duration::from_secs(180), 1000)
            ],
            cli.stages
        );
        assert_eq!(
            vec![("http_req_duration".to_string(), "p(95)<50".to_string())],
            cli.thresholds
        );
        assert_eq!(Some(Duration::from_secs(600)), cli.max_duration);
        assert_eq!(Some(42), cli.seed);
        assert!(matches!(cli.reporter, ReporterOpt::Noop));
    }

    #[test]
    fn base_url_falls_back_to_env_then_default() {
        let command = StampedeScenarioCli::command();
        let base_url = command
            .get_arguments()
            .find(|arg| arg.get_id() == "base_url")
            .unwrap();

        assert_eq!(Some(OsStr::new("BASE_URL")), base_url.get_env());
        let defaults = base_url.get_default_values();
        assert_eq!(1, defaults.len());
        assert_eq!(Some(DEFAULT_BASE_URL), defaults[0].to_str());
    }

    #[test]
    fn threshold_arg_requires_metric() {
        assert!(parse_threshold_arg("p(95)<50").is_err());
        assert!(parse_threshold_arg(":p(95)<50").is_err());
        assert_eq!(
            ("http_req_failed".to_string(), "rate<0.01".to_string()),
            parse_threshold_arg("http_req_failed: rate<0.01").unwrap()
        );
    }
}
