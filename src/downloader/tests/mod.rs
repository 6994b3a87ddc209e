use super::test_helpers::{create_test_downloader, create_test_downloader_with_config, test_config};
use super::*;
use crate::delivery::DeliveryReport;
use crate::test_helpers::{MockSource, RecordingConsumer, Sent};
use crate::types::{ChatId, ContentId, ContentRecord, UserId};


const CHAT: ChatId = ChatId(-100);
const ALICE: UserId = UserId(7);
const BOB: UserId = UserId(8);

/// Unwrap a delivered outcome or fail the test
fn delivered(outcome: RequestOutcome) -> (ContentRecord, bool, DeliveryReport) {
    match outcome {
        RequestOutcome::Delivered {
            record,
            cache_hit,
            report,
        } => (record, cache_hit, report),
        other => panic!("expected a delivery, got {:?}", other),
    }
}

/// Unwrap a selection outcome or fail the test
fn selection(outcome: RequestOutcome) -> crate::session::PageView {
    match outcome {
        RequestOutcome::Selection(view) => view,
        other => panic!("expected a selection, got {:?}", other),
    }
}
