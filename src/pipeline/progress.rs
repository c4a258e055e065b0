use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Receives download progress. `advanced` fires at least once per
/// configured step, `finished` exactly once when the copy completes.
pub trait ProgressObserver: Send {
    fn started(&mut self, _total: Option<u64>) {}
    fn advanced(&mut self, written: u64, total: Option<u64>);
    fn finished(&mut self, written: u64, total: Option<u64>);
}

/// Percentage of `total`, if the size is known and non-zero.
pub fn percent(written: u64, total: Option<u64>) -> Option<f64> {
    match total {
        Some(total) if total > 0 => Some(written as f64 / total as f64 * 100.0),
        _ => None,
    }
}

/// Reports progress as tracing events.
#[derive(Debug, Default)]
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn started(&mut self, total: Option<u64>) {
        match total {
            Some(total) => info!(bytes = total, "start downloading"),
            None => info!("start downloading, size unknown"),
        }
    }

    fn advanced(&mut self, written: u64, total: Option<u64>) {
        match percent(written, total) {
            Some(p) => info!("downloaded {p:.2}%"),
            None => info!(bytes = written, "downloaded"),
        }
    }

    fn finished(&mut self, written: u64, _total: Option<u64>) {
        info!(bytes = written, "download finished");
    }
}

/// Terminal progress bar for interactive runs.
pub struct BarProgress {
    bar: ProgressBar,
    label: String,
}

impl BarProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            bar: ProgressBar::hidden(),
            label: label.into(),
        }
    }
}

impl ProgressObserver for BarProgress {
    fn started(&mut self, total: Option<u64>) {
        let bar = match total {
            Some(total) => ProgressBar::new(total),
            None => ProgressBar::no_length(),
        };
        if let Ok(style) = ProgressStyle::with_template(
            "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] \
             {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
        ) {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_message(format!("Downloading {}", self.label));
        self.bar = bar;
    }

    fn advanced(&mut self, written: u64, _total: Option<u64>) {
        self.bar.set_position(written);
    }

    fn finished(&mut self, written: u64, _total: Option<u64>) {
        self.bar.set_position(written);
        self.bar
            .finish_with_message(format!("Downloaded {}", self.label));
    }
}
