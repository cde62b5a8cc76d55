use indicatif::{ProgressBar, ProgressStyle};

/// Per-batch progress bar for one pass over a data source.
///
/// A disabled bar is hidden and every call is a no-op, so the loops can
/// report unconditionally.
pub struct BatchProgress {
    bar: ProgressBar,
}

impl BatchProgress {
    pub fn new(batches: usize, label: &str, enabled: bool) -> Self {
        if !enabled {
            return BatchProgress {
                bar: ProgressBar::hidden(),
            };
        }
        let bar = ProgressBar::new(batches as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_prefix(label.to_string());
        BatchProgress { bar }
    }

    pub fn advance(&self, loss: f64, accuracy: f64) {
        self.bar
            .set_message(format!("loss {loss:.3} | acc {accuracy:.3}%"));
        self.bar.inc(1);
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
