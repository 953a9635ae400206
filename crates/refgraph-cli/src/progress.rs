//! Progress feedback for CLI commands
//!
//! Progress is drawn on stderr so facts on stdout stay clean. All progress
//! output is suppressed when --quiet is set.

use indicatif::{ProgressBar, ProgressStyle};

/// Create a progress bar with a known total
pub fn progress_bar(total: u64, message: &str, quiet: bool) -> Option<ProgressBar> {
    if quiet {
        return None;
    }

    let style = ProgressStyle::default_bar()
        .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓░");

    let pb = ProgressBar::new(total);
    pb.set_style(style);
    pb.set_message(message.to_string());
    Some(pb)
}

/// Finish a progress bar
pub fn finish_progress(pb: Option<ProgressBar>) {
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_bar_quiet_returns_none() {
        let pb = progress_bar(100, "test", true);
        assert!(pb.is_none());
    }

    #[test]
    fn test_progress_bar_tracks_position() {
        let pb = progress_bar(3, "test", false).unwrap();
        pb.inc(2);
        assert_eq!(pb.position(), 2);
        assert_eq!(pb.length(), Some(3));
        finish_progress(Some(pb));
    }

    #[test]
    fn test_finish_progress_handles_none() {
        // Should not panic
        finish_progress(None);
    }
}
