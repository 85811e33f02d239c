use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

const PERCENT_TEMPLATE: &str =
    "{spinner:.cyan} {prefix:<20} [{bar:40.cyan/blue}] {pos:>3}% | {msg}";

fn percent_style() -> ProgressStyle {
    ProgressStyle::with_template(PERCENT_TEMPLATE)
        .unwrap()
        .progress_chars("=> ")
}

/// A 0..=100 bar on stderr. Hidden when stderr is not a terminal.
pub fn percent_bar(prefix: &str) -> ProgressBar {
    if !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(100);
    pb.set_style(percent_style());
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Several percent bars drawn together with a free-form line underneath.
pub struct StackedBars {
    multi: Option<MultiProgress>,
    pub bars: Vec<ProgressBar>,
    pub status_line: ProgressBar,
}

impl StackedBars {
    pub fn is_visible(&self) -> bool {
        self.multi.is_some()
    }

    pub fn finish(&self) {
        for bar in &self.bars {
            bar.abandon();
        }
        self.status_line.abandon();
    }
}

pub fn stacked_percent_bars(prefixes: &[&str], visible: bool) -> StackedBars {
    if !visible || !std::io::stderr().is_terminal() {
        return StackedBars {
            multi: None,
            bars: prefixes.iter().map(|_| ProgressBar::hidden()).collect(),
            status_line: ProgressBar::hidden(),
        };
    }

    let multi = MultiProgress::new();
    let bars = prefixes
        .iter()
        .map(|prefix| {
            let pb = multi.add(ProgressBar::new(100));
            pb.set_style(percent_style());
            pb.set_prefix(prefix.to_string());
            pb.enable_steady_tick(Duration::from_millis(80));
            pb
        })
        .collect();

    let status_line = multi.add(ProgressBar::new_spinner());
    status_line.set_style(ProgressStyle::with_template("  {msg}").unwrap());
    status_line.enable_steady_tick(Duration::from_millis(300));

    StackedBars {
        multi: Some(multi),
        bars,
        status_line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_bars_report_not_visible() {
        let stacked = stacked_percent_bars(&["Parsing", "Importing", "Completed"], false);
        assert!(!stacked.is_visible());
        assert_eq!(stacked.bars.len(), 3);

        stacked.bars[1].set_position(40);
        assert_eq!(stacked.bars[1].position(), 40);
        stacked.finish();
    }
}
