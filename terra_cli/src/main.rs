// main.rs

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use terra_pipeline::{CancellationFlag, PipelineController};
use terra_shared::progress::ProgressEvent;
use terra_shared::TaskConfig;
use tokio::sync::mpsc;

/// Runs one tile enumerate/download/stitch/crop/export task from a JSON
/// task descriptor (spec §6 "Inputs (task descriptor)").
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a JSON file deserializing to the task descriptor.
    task_file: PathBuf,

    /// Suppress the progress bar; only the final result is printed.
    #[arg(long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_task_config(&cli.task_file)?;
    let controller = PipelineController::new(config);
    spawn_ctrl_c_watcher(controller.cancellation());

    if cli.quiet {
        controller.run().await?;
    } else {
        run_with_progress(controller).await?;
    }
    Ok(())
}

fn load_task_config(path: &PathBuf) -> Result<TaskConfig> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading task descriptor {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing task descriptor {}", path.display()))
}

/// Asserts the controller's cancellation flag on Ctrl-C (spec §4.5
/// "Cancellation", §5 "the user may pause"). Runs for the life of the
/// process; a second Ctrl-C after the task already finished is a no-op
/// since the flag is marked completed by then.
fn spawn_ctrl_c_watcher(cancel: CancellationFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });
}

/// Drives the pipeline in the background and renders its progress channel
/// (spec §6, `(progress_info, process_done, taskname)` tuples) on an
/// indicatif spinner.
async fn run_with_progress(controller: PipelineController) -> Result<()> {
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{spinner} {msg}").unwrap());
    bar.enable_steady_tick(Duration::from_millis(120));

    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
    let run_handle = tokio::spawn(async move { controller.run_with_progress(Some(tx)).await });

    let mut last_event = None;
    while let Some(event) = rx.recv().await {
        bar.set_message(progress_message(&event));
        last_event = Some(event);
    }

    let result = run_handle.await.context("pipeline task panicked")?;
    match (&result, last_event.as_ref().and_then(|e| first_exception(&e.progress_info))) {
        (Ok(()), _) => bar.finish_with_message("done"),
        (Err(err), _) => bar.finish_with_message(format!("failed: {err}")),
    }
    result
}

fn first_exception(info: &terra_shared::progress::ProgressInfo) -> Option<&str> {
    info.enumerate_exception
        .as_deref()
        .or(info.download_exception.as_deref())
        .or(info.stitch_exception.as_deref())
        .or(info.crop_exception.as_deref())
}

fn progress_message(event: &ProgressEvent) -> String {
    let info = &event.progress_info;
    if let Some(err) = first_exception(info) {
        return format!("{}: error: {err}", event.taskname);
    }
    if !info.is_calculate_tiles_done {
        return format!("{}: enumerating tiles", event.taskname);
    }
    if !info.is_tile_download_done {
        return format!("{}: downloading: {}/{} ok, {} failed", event.taskname, info.download_success, info.download_total, info.download_fail);
    }
    if !info.is_tile_stitch_done {
        return format!("{}: stitching: {}/{}", event.taskname, info.stitched_tiles, info.stitch_total);
    }
    if event.process_done {
        format!("{}: done", event.taskname)
    } else {
        format!("{}: writing output", event.taskname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terra_shared::progress::ProgressInfo;

    fn event(info: ProgressInfo, process_done: bool) -> ProgressEvent {
        ProgressEvent { progress_info: info, process_done, taskname: "demo".to_string() }
    }

    #[test]
    fn progress_message_reflects_the_earliest_unfinished_stage() {
        let info = ProgressInfo::default();
        assert!(progress_message(&event(info.clone(), false)).contains("enumerating"));

        let mut info = info;
        info.is_calculate_tiles_done = true;
        info.download_total = 10;
        info.download_success = 3;
        assert!(progress_message(&event(info.clone(), false)).contains("downloading"));

        info.is_tile_download_done = true;
        info.stitch_total = 4;
        info.stitched_tiles = 1;
        assert!(progress_message(&event(info.clone(), false)).contains("stitching"));

        info.is_tile_stitch_done = true;
        assert!(progress_message(&event(info.clone(), false)).contains("writing output"));
        assert!(progress_message(&event(info, true)).contains("done"));
    }

    #[test]
    fn progress_message_surfaces_the_first_reported_exception() {
        let mut info = ProgressInfo::default();
        info.download_exception = Some("disk full".to_string());
        assert!(progress_message(&event(info, false)).contains("disk full"));
    }
}
