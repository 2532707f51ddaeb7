// UI layer: terminal output for the batch commands.
// - `Progress` wraps an indicatif bar; per-item lines are printed above the
//   bar when it is drawn and go straight to stdout otherwise.
// - `confirm` asks before destructive commands using `dialoguer`.
// - `banner` and `print_summary` frame each run.

use anyhow::Result;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};

use crate::batch::Summary;

const RULE: &str = "============================================================";

/// Progress bar for one batch run.
pub struct Progress {
    bar: ProgressBar,
}

impl Progress {
    pub fn new(len: u64, visible: bool, label: &str) -> Self {
        let bar = if visible {
            let bar = ProgressBar::new(len);
            if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} [{bar:30}] {pos}/{len}")
            {
                bar.set_style(style.progress_chars("=> "));
            }
            bar.set_message(label.to_string());
            bar
        } else {
            ProgressBar::hidden()
        };
        Self { bar }
    }

    /// Print one line without tearing the bar.
    pub fn line(&self, msg: impl AsRef<str>) {
        if self.bar.is_hidden() {
            println!("{}", msg.as_ref());
        } else {
            self.bar.println(msg.as_ref());
        }
    }

    pub fn inc(&self) {
        self.bar.inc(1);
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// Yes/no prompt defaulting to "no".
pub fn confirm(prompt: &str) -> Result<bool> {
    Ok(Confirm::new().with_prompt(prompt).default(false).interact()?)
}

/// Heading printed at the start of a command.
pub fn banner(title: &str, rows: &[(&str, String)]) {
    println!("{RULE}");
    println!("{title}");
    println!("{RULE}");
    for (key, value) in rows {
        println!("{:<10} {value}", format!("{key}:"));
    }
    println!();
}

/// Counts plus every failed identifier with its reason.
pub fn print_summary(summary: &Summary, dry_run: bool) {
    println!();
    println!("{RULE}");
    println!("SUMMARY");
    println!("{RULE}");
    println!("Total:     {}", summary.total);
    if dry_run {
        println!("Planned:   {}", summary.planned);
    } else {
        println!("Succeeded: {}", summary.succeeded);
        println!("Failed:    {}", summary.failed);
    }
    println!("Skipped:   {}", summary.skipped);

    if !summary.failures.is_empty() {
        println!();
        println!("Failed items:");
        for (id, reason) in &summary.failures {
            println!("  - {id}: {reason}");
        }
    }
}
