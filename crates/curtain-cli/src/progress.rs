//! Progress indicators for ingestion and searches

use curtain_core::IngestProgress;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress bar driven by [`IngestProgress`] percentages
pub fn create_ingest_progress(dataset_id: &str) -> ProgressBar {
    let pb = ProgressBar::new(100);
    let style = ProgressStyle::default_bar()
        .template("{prefix:.bold} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos:>3}% {msg}")
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_prefix(dataset_id.to_string());
    pb
}

/// Apply one ingestion update to `pb`
pub fn update_ingest_progress(pb: &ProgressBar, progress: IngestProgress) {
    pb.set_position(u64::from(progress.percent));
    pb.set_message(progress.stage.to_string());
}

/// Spinner for operations without a known length
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use curtain_core::ingest::IngestStage;

    #[test]
    fn test_ingest_progress_tracks_stage() {
        let pb = create_ingest_progress("d1");
        assert_eq!(pb.length(), Some(100));

        update_ingest_progress(&pb, IngestStage::StoringRaw.into());
        assert_eq!(pb.position(), u64::from(IngestStage::StoringRaw.percent()));
        assert_eq!(pb.message(), "Storing raw rows");

        update_ingest_progress(&pb, IngestStage::Done.into());
        assert_eq!(pb.position(), 100);
        pb.finish_and_clear();
    }

    #[test]
    fn test_create_spinner() {
        let pb = create_spinner("Searching...");
        assert!(!pb.is_finished());
        pb.finish();
    }
}
