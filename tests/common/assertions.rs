//! Custom test assertions for integration tests

use comic_dl::Event;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::Receiver;

/// Drain every event already queued on `events`
pub fn drain_events(events: &mut Receiver<Event>) -> Vec<Event> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

/// Count drained events matching `predicate`
pub fn count_events<F>(events: &[Event], predicate: F) -> usize
where
    F: Fn(&Event) -> bool,
{
    events.iter().filter(|event| predicate(event)).count()
}

/// Assert that `files` are `00001.jpg`, `00002.jpg`, ... inside `dir`, in that order
pub fn assert_sequential_pages(files: &[PathBuf], dir: &Path) {
    for (i, file) in files.iter().enumerate() {
        let expected = dir.join(format!("{:05}.jpg", i + 1));
        assert_eq!(file, &expected, "page {} out of order", i + 1);
    }
}
