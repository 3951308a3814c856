//! Progress bar for request submission

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use reconcile::{ProgressCallback, Request};

use crate::ui;

/// Shows one tick per request sent
///
/// Failed requests are printed above the bar so they survive `finish`.
pub struct RequestProgress {
    bar: Option<ProgressBar>,
}

impl RequestProgress {
    pub fn new() -> Self {
        Self { bar: None }
    }
}

impl Default for RequestProgress {
    fn default() -> Self {
        Self::new()
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
}

impl ProgressCallback for RequestProgress {
    fn on_batch_start(&mut self, count: usize) {
        let bar = ProgressBar::new(count as u64);
        bar.set_style(bar_style());
        self.bar = Some(bar);
    }

    fn on_request_start(&mut self, request: &Request) {
        if let Some(bar) = &self.bar {
            bar.set_message(ui::truncate_path(&request.to_string(), 60));
        }
    }

    fn on_request_complete(&mut self, request: &Request, ok: bool) {
        if let Some(bar) = &self.bar {
            if !ok {
                bar.suspend(|| println!("  {} {}", "✗".red(), request));
            }
            bar.inc(1);
        }
    }

    fn on_batch_complete(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_lives_for_one_batch() {
        let mut progress = RequestProgress::new();
        let ok = Request::delete("data/openconfig-ars:ars");
        let bad = Request::delete("data/openconfig-mclag:mclag");

        progress.on_batch_start(2);
        assert!(progress.bar.is_some());
        progress.on_request_start(&ok);
        progress.on_request_complete(&ok, true);
        progress.on_request_start(&bad);
        progress.on_request_complete(&bad, false);
        progress.on_batch_complete();

        assert!(progress.bar.is_none());
    }
}
