//! CLI output formatting and display helpers.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use appfetch_core::{Batch, BatchSnapshot, Catalog, ItemSnapshot, ItemStatus};
use indicatif::{DecimalBytes, MultiProgress, ProgressBar, ProgressStyle};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Bar length used to map `[0, 1]` fractions onto indicatif positions.
const PROGRESS_SCALE: u64 = 1000;

/// Minimum gap between two redraws.
const REFRESH_INTERVAL: Duration = Duration::from_millis(100);

/// Speeds at or below this many bytes per second are not shown.
const MIN_DISPLAYED_SPEED: f64 = 100.0;

/// Returns terminal width from COLUMNS, or 80 if unset/invalid.
pub fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|width| *width >= 20)
        .unwrap_or(80)
}

/// Truncates text to at most `width` chars, appending ellipsis if truncated.
pub fn truncate_to_width(text: &str, width: usize) -> String {
    let text_len = text.chars().count();
    if text_len <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }
    if width == 1 {
        return "…".to_string();
    }

    let mut output: String = text.chars().take(width - 1).collect();
    output.push('…');
    output
}

/// Human label for an item status.
pub(crate) fn status_label(status: &ItemStatus) -> &'static str {
    match status {
        ItemStatus::Queued => "Queued",
        ItemStatus::Resolving => "Resolving…",
        ItemStatus::Downloading => "Downloading",
        ItemStatus::Completed => "Complete",
        ItemStatus::Failed(_) => "Failed",
    }
}

/// `Waiting…`, `"{downloaded} / {total}"`, or just the downloaded amount.
pub(crate) fn size_text(item: &ItemSnapshot) -> String {
    if item.bytes_downloaded == 0 && item.total_bytes == 0 {
        return "Waiting…".to_string();
    }
    let downloaded = DecimalBytes(item.bytes_downloaded);
    if item.total_bytes > 0 {
        format!("{downloaded} / {}", DecimalBytes(item.total_bytes))
    } else {
        downloaded.to_string()
    }
}

/// Transfer rate, or empty while too slow to be meaningful.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn speed_text(item: &ItemSnapshot) -> String {
    if item.speed_bytes_per_sec <= MIN_DISPLAYED_SPEED {
        return String::new();
    }
    format!("{}/s", DecimalBytes(item.speed_bytes_per_sec as u64))
}

/// `~Ns left` under a minute, `~Mm Ss left` above, empty when unknown.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn eta_text(item: &ItemSnapshot) -> String {
    let Some(eta) = item.eta_seconds.filter(|eta| *eta > 0.0) else {
        return String::new();
    };
    let seconds = eta as u64;
    if eta < 60.0 {
        return format!("~{seconds}s left");
    }
    format!("~{}m {}s left", seconds / 60, seconds % 60)
}

/// Detail line shown next to an item's bar.
pub(crate) fn item_detail(item: &ItemSnapshot) -> String {
    if let Some(reason) = item.status.failure_reason() {
        return format!("{}: {reason}", status_label(&item.status));
    }
    let mut parts = vec![status_label(&item.status).to_string(), size_text(item)];
    let speed = speed_text(item);
    if !speed.is_empty() {
        parts.push(speed);
    }
    let eta = eta_text(item);
    if !eta.is_empty() {
        parts.push(eta);
    }
    parts.join("  ·  ")
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn scaled(fraction: f64) -> u64 {
    (fraction.clamp(0.0, 1.0) * PROGRESS_SCALE as f64).round() as u64
}

/// Spawns the live progress view when requested.
///
/// The view redraws whenever the batch reports a change and stops on
/// completion or when `stop` fires.
pub(crate) fn spawn_progress_ui(
    enabled: bool,
    batch: Arc<Batch>,
    stop: CancellationToken,
) -> Option<JoinHandle<()>> {
    if !enabled {
        return None;
    }
    Some(tokio::spawn(render_progress(batch, stop)))
}

async fn render_progress(batch: Arc<Batch>, stop: CancellationToken) {
    let multi = MultiProgress::new();
    let overall = multi.add(ProgressBar::new(PROGRESS_SCALE));
    overall.set_style(
        ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let width = terminal_width();
    let name_width = batch
        .items()
        .iter()
        .map(|item| item.name().chars().count())
        .max()
        .unwrap_or(0)
        .min(width / 3);
    let rows: Vec<ProgressBar> = batch
        .items()
        .iter()
        .map(|item| {
            let bar = multi.add(ProgressBar::new(PROGRESS_SCALE));
            bar.set_style(
                ProgressStyle::with_template("  {prefix} [{bar:24.green/white}] {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> "),
            );
            let name = truncate_to_width(item.name(), name_width);
            bar.set_prefix(format!("{name:<name_width$}"));
            bar
        })
        .collect();

    let mut changes = batch.subscribe();
    loop {
        changes.borrow_and_update();
        let snapshot = batch.snapshot();
        draw(&snapshot, &overall, &rows, width);
        if snapshot.all_complete {
            break;
        }

        tokio::select! {
            () = stop.cancelled() => break,
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
        tokio::time::sleep(REFRESH_INTERVAL).await;
    }

    draw(&batch.snapshot(), &overall, &rows, width);
    for row in &rows {
        row.finish();
    }
    overall.finish();
}

fn draw(snapshot: &BatchSnapshot, overall: &ProgressBar, rows: &[ProgressBar], width: usize) {
    overall.set_prefix(format!(
        "{} {}/{}",
        snapshot.phase.headline(),
        snapshot.counts.completed,
        snapshot.items.len()
    ));
    overall.set_position(scaled(snapshot.overall_progress));
    overall.set_message(snapshot.overall_status_text.clone());

    for (row, item) in rows.iter().zip(&snapshot.items) {
        let fraction = match item.status {
            ItemStatus::Completed => 1.0,
            ItemStatus::Downloading => item.progress,
            _ => 0.0,
        };
        row.set_position(scaled(fraction));
        row.set_message(truncate_to_width(&item_detail(item), width / 2));
    }
}

/// Prints the effective catalog (for `--list`).
pub(crate) fn print_catalog(catalog: &Catalog) {
    for definition in catalog.definitions() {
        println!(
            "{:<24} {:<24} {}",
            definition.display_name, definition.file_name, definition.source
        );
    }
}

/// Prints the per-item outcome and the count line.
pub(crate) fn print_completion_summary(snapshot: &BatchSnapshot, output_dir: &Path, interrupted: bool) {
    let headline = if interrupted {
        "Cancelled."
    } else {
        snapshot.phase.headline()
    };
    println!("{headline}");

    let width = terminal_width();
    for item in &snapshot.items {
        let detail = match &item.status {
            ItemStatus::Completed => format!("{}  {}", item.file_name, DecimalBytes(item.total_bytes)),
            ItemStatus::Failed(reason) => reason.clone(),
            other => status_label(other).to_string(),
        };
        let line = format!(
            "  {:<12} {:<24} {detail}",
            status_label(&item.status),
            item.name
        );
        println!("{}", truncate_to_width(&line, width));
    }

    println!("{}", snapshot.overall_status_text);
    if snapshot.counts.completed > 0 {
        println!("Saved to {}", output_dir.display());
    }
}

/// Prints the snapshot as pretty JSON (for `--json`).
pub(crate) fn print_json(snapshot: &BatchSnapshot) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(snapshot)?);
    Ok(())
}
