use crate::scheduler::{ConcurrencyGauge, SchedulerState};
use crate::stages::StagePlan;
use indicatif::{ProgressBar, ProgressState, ProgressStyle};
use stampede_core::prelude::DelegatedShutdownListener;
use std::cmp::min;
use std::fmt::Write;
use std::time::{Duration, Instant};

/// Displays a progress bar while the test is running to show the user how long is left and how
/// many VUs are running.
pub(crate) fn start_progress(
    plan: StagePlan,
    gauge: ConcurrencyGauge,
    mut shutdown_listener: DelegatedShutdownListener,
) -> anyhow::Result<()> {
    let planned_runtime = plan.total_duration();
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{wide_bar:.cyan/blue}] [{elapsed_precise} / {planned_runtime}] {msg}",
    )?
    .with_key("planned_runtime", {
        let hours = planned_runtime.as_secs() / 3600;
        let minutes = (planned_runtime.as_secs() % 3600) / 60;
        let seconds = planned_runtime.as_secs() % 60;
        move |_state: &ProgressState, w: &mut dyn Write| {
            let _ = write!(w, "{:02}:{:02}:{:02}", hours, minutes, seconds);
        }
    })
    .progress_chars("#>-");

    std::thread::Builder::new()
        .name("progress".to_string())
        .spawn(move || {
            let start_time = Instant::now();
            let pb = ProgressBar::new(planned_runtime.as_secs());
            pb.set_style(style);

            loop {
                if shutdown_listener.should_shutdown() {
                    log::trace!("Progress thread shutting down");
                    pb.finish_and_clear();
                    break;
                }

                pb.set_message(progress_message(&plan, start_time.elapsed(), &gauge.snapshot()));

                let new = min(start_time.elapsed().as_secs(), planned_runtime.as_secs());
                pb.set_position(new);
                std::thread::sleep(Duration::from_millis(500));
            }
        })?;

    Ok(())
}

fn progress_message(plan: &StagePlan, elapsed: Duration, state: &SchedulerState) -> String {
    let stage = match plan.stage_index_at(elapsed) {
        Some(index) => format!("stage {}/{}", index + 1, plan.stages().len()),
        None => "draining".to_string(),
    };

    format!(
        "{stage}: {} VUs ({} draining, target {})",
        state.running, state.draining, state.desired
    )
}
