use crate::ingest::IngestReport;
use crate::ui::theme;
use crate::ui::Icons;
use crate::IngestMessage;
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::time::Duration;

/// Progress bar over the documents of one ingest run.
///
/// Hidden when stdout is not a terminal, so piped output stays clean.
pub struct IngestProgress {
    bar: ProgressBar,
}

impl IngestProgress {
    pub fn new(total_documents: usize) -> Self {
        let bar = if console::Term::stdout().is_term() {
            let bar = ProgressBar::new(total_documents as u64);
            if let Ok(style) =
                ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {wide_msg}")
            {
                bar.set_style(style.progress_chars("=> "));
            }
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        } else {
            ProgressBar::hidden()
        };
        Self { bar }
    }

    pub fn observe(&self, message: &IngestMessage) {
        match message {
            IngestMessage::Processed { summary, .. } => {
                self.bar.set_message(summary.path.clone());
            }
            IngestMessage::Error(document, error) => {
                self.bar.println(format!(
                    "{} {}: {}",
                    Icons::CROSS,
                    document,
                    error.style(theme().error.clone())
                ));
            }
        }
        self.bar.inc(1);
    }

    pub fn finish_with_summary(&self, duration: Duration, report: &IngestReport) {
        self.bar.finish_and_clear();
        println!();
        let headline = format!("Ingested in {}", HumanDuration(duration));
        if report.is_clean() {
            println!("{} {}", Icons::CHECK, headline.style(theme().success.clone()));
        } else {
            println!("{} {}", Icons::WARN, headline.style(theme().warn.clone()));
        }
        println!(
            "  {} {}  {} {}  {} {}  {} {}",
            Icons::FILE.style(theme().info.clone()),
            report.files,
            Icons::MOD.style(theme().info.clone()),
            report.replaced,
            Icons::PACKAGE.style(theme().info.clone()),
            report.symbols,
            Icons::CROSS.style(theme().info.clone()),
            report.failures.len()
        );
    }
}

pub struct Spinner {
    pb: ProgressBar,
}

impl Spinner {
    pub fn new(message: &str) -> Self {
        let pb = if console::Term::stdout().is_term() {
            let pb = ProgressBar::new_spinner();
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        } else {
            ProgressBar::hidden()
        };
        pb.set_message(message.to_string());
        Self { pb }
    }

    pub fn finish_and_clear(&self) {
        self.pb.finish_and_clear();
    }
}
