//! End-to-end runs of the orchestrator with in-process sessions

use crate::common::{
    fast_config, flaky_orchestrator, items, orchestrator, shared_ledger, success_for,
    FlakyLedger, MockExtractor, MockFactory,
};
use ripple_harvest::config::ResumeFrom;
use ripple_harvest::extractor::ExtractionError;
use ripple_harvest::state::{ExtractionOutcome, RunState};
use ripple_harvest::storage::{Ledger, RunStatus};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_completed_run_records_every_item() {
    let factory = Arc::new(MockFactory::new());
    let extractor = Arc::new(MockExtractor::succeeding());
    let ledger = shared_ledger();

    let report = orchestrator(fast_config(), &factory, &extractor, &ledger)
        .run(items(30))
        .await;

    assert_eq!(report.final_state, RunState::Completed);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.completed, 30);
    assert_eq!(report.succeeded, 30);
    assert_eq!(report.cursor_index, 30);

    let ledger = ledger.lock().unwrap();
    let results = ledger.latest_results().unwrap();
    assert_eq!(results.len(), 30);
    assert!(results.iter().all(|r| r.attempt_count == 1));

    let run = ledger.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(ledger.load_latest().unwrap().unwrap().cursor_index, 30);

    assert_eq!(factory.acquired(), 1);
    assert_eq!(factory.released(), 1);
}

#[tokio::test]
async fn test_checkpoint_written_on_cadence() {
    let factory = Arc::new(MockFactory::new());
    let ledger = shared_ledger();
    let observed: Arc<Mutex<Vec<(String, usize, usize)>>> = Arc::new(Mutex::new(Vec::new()));

    let extractor = {
        let ledger = ledger.clone();
        let observed = observed.clone();
        Arc::new(MockExtractor::new(move |item| {
            // Look at the ledger while the 25th and 26th items are in flight
            if item.id == "24" || item.id == "25" {
                let ledger = ledger.lock().unwrap();
                let run = ledger.get_latest_run().unwrap().unwrap();
                let checkpoints = ledger.checkpoints_for_run(run.id).unwrap();
                let cursor = ledger.load_latest().unwrap().unwrap().cursor_index;
                let persisted = ledger.results_for_run(run.id).unwrap().len();
                observed
                    .lock()
                    .unwrap()
                    .push((item.id.clone(), checkpoints.len(), cursor.max(persisted)));
            }
            Ok(success_for(item))
        }))
    };

    let report = orchestrator(fast_config(), &factory, &extractor, &ledger)
        .run(items(30))
        .await;
    assert_eq!(report.final_state, RunState::Completed);

    let observed = observed.lock().unwrap();
    // After 24 items only the initial checkpoint exists and nothing is persisted
    assert_eq!(observed[0], ("24".to_string(), 1, 0));
    // The 25th item triggered a flush and a checkpoint at cursor 25
    assert_eq!(observed[1], ("25".to_string(), 2, 25));

    let ledger = ledger.lock().unwrap();
    let run = ledger.get_latest_run().unwrap().unwrap();
    let cursors: Vec<usize> = ledger
        .checkpoints_for_run(run.id)
        .unwrap()
        .iter()
        .map(|c| c.cursor_index)
        .collect();
    assert_eq!(cursors, vec![0, 25, 30]);
}

#[tokio::test]
async fn test_graceful_interruption() {
    let factory = Arc::new(MockFactory::new());
    let ledger = shared_ledger();
    let cancel = CancellationToken::new();

    let extractor = {
        let cancel = cancel.clone();
        Arc::new(MockExtractor::new(move |item| {
            if item.id == "9" {
                cancel.cancel();
            }
            Ok(success_for(item))
        }))
    };

    let mut config = fast_config();
    config.run.session_recycle_every = 300;

    let report = orchestrator(config, &factory, &extractor, &ledger)
        .with_cancellation_token(cancel)
        .run(items(100))
        .await;

    assert_eq!(report.final_state, RunState::Interrupted);
    assert_eq!(report.exit_code(), 130);
    assert_eq!(report.completed, 10);
    assert_eq!(extractor.calls(), 10);

    let ledger = ledger.lock().unwrap();
    let run = ledger.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Interrupted);
    assert_eq!(ledger.results_for_run(run.id).unwrap().len(), 10);
    assert!(ledger.load_latest().unwrap().unwrap().cursor_index <= 10);

    assert_eq!(factory.acquired(), 1);
    assert_eq!(factory.released(), 1);
}

#[tokio::test]
async fn test_session_recycled_on_cadence() {
    let factory = Arc::new(MockFactory::new());
    let extractor = Arc::new(MockExtractor::succeeding());
    let ledger = shared_ledger();

    let mut config = fast_config();
    config.run.session_recycle_every = 5;

    let report = orchestrator(config, &factory, &extractor, &ledger)
        .run(items(20))
        .await;

    assert_eq!(report.final_state, RunState::Completed);
    assert_eq!(factory.acquired(), 20 / 5 + 1);
    assert_eq!(report.session_acquisitions, 20 / 5 + 1);
    assert_eq!(factory.released(), factory.acquired());
}

#[tokio::test]
async fn test_retry_bound() {
    let factory = Arc::new(MockFactory::new());
    let extractor = Arc::new(MockExtractor::new(|_| {
        Err(ExtractionError::Other("page never loaded".to_string()))
    }));
    let ledger = shared_ledger();

    let mut config = fast_config();
    config.run.max_retries = 2;

    let report = orchestrator(config, &factory, &extractor, &ledger)
        .run(items(1))
        .await;

    assert_eq!(report.final_state, RunState::Completed);
    assert_eq!(report.failed, 1);
    assert_eq!(extractor.calls(), 3);

    let ledger = ledger.lock().unwrap();
    let results = ledger.latest_results().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].attempt_count, 3);
    match &results[0].outcome {
        ExtractionOutcome::Failure { reason, .. } => {
            assert!(reason.contains("page never loaded"));
        }
        other => panic!("expected a failure, got {:?}", other),
    }

    let pending = ledger.pending_failures().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].item.id, "0");
}

#[tokio::test]
async fn test_idempotent_resume_after_fatal_error() {
    let mut config = fast_config();
    config.run.checkpoint_every = 10;
    config.run.session_recycle_every = 15;

    // Reference: one uninterrupted run
    let reference_ledger = shared_ledger();
    let reference = orchestrator(
        config.clone(),
        &Arc::new(MockFactory::new()),
        &Arc::new(MockExtractor::succeeding()),
        &reference_ledger,
    )
    .run(items(40))
    .await;
    assert_eq!(reference.final_state, RunState::Completed);

    // First attempt: the second recycle (after item 30) cannot get a session
    let ledger = shared_ledger();
    let failing = Arc::new(MockFactory::with_limit(2));
    let first = orchestrator(
        config.clone(),
        &failing,
        &Arc::new(MockExtractor::succeeding()),
        &ledger,
    )
    .run(items(40))
    .await;

    assert_eq!(first.final_state, RunState::FatalError);
    assert_eq!(first.exit_code(), 2);
    assert!(first.error.is_some());
    assert_eq!(failing.released(), failing.acquired());
    {
        let ledger = ledger.lock().unwrap();
        assert_eq!(
            ledger.get_latest_run().unwrap().unwrap().status,
            RunStatus::Failed
        );
        assert_eq!(ledger.load_latest().unwrap().unwrap().cursor_index, 30);
    }

    // Second attempt resumes from the checkpoint
    let extractor = Arc::new(MockExtractor::succeeding());
    let second = orchestrator(config, &Arc::new(MockFactory::new()), &extractor, &ledger)
        .run(items(40))
        .await;

    assert_eq!(second.final_state, RunState::Completed);
    assert_eq!(second.start_index, 30);
    assert_eq!(extractor.calls(), 10);

    let resumed: Vec<_> = ledger
        .lock()
        .unwrap()
        .latest_results()
        .unwrap()
        .into_iter()
        .map(|r| (r.position, r.item, r.outcome))
        .collect();
    let expected: Vec<_> = reference_ledger
        .lock()
        .unwrap()
        .latest_results()
        .unwrap()
        .into_iter()
        .map(|r| (r.position, r.item, r.outcome))
        .collect();
    assert_eq!(resumed, expected);
}

#[tokio::test]
async fn test_explicit_resume_index() {
    let factory = Arc::new(MockFactory::new());
    let extractor = Arc::new(MockExtractor::succeeding());
    let ledger = shared_ledger();

    let mut config = fast_config();
    config.run.resume_from_index = ResumeFrom::Index(6);

    let report = orchestrator(config, &factory, &extractor, &ledger)
        .run(items(10))
        .await;

    assert_eq!(report.final_state, RunState::Completed);
    assert_eq!(report.start_index, 6);
    assert_eq!(report.completed, 4);

    let positions: Vec<usize> = ledger
        .lock()
        .unwrap()
        .latest_results()
        .unwrap()
        .iter()
        .map(|r| r.position)
        .collect();
    assert_eq!(positions, vec![6, 7, 8, 9]);
}

#[tokio::test]
async fn test_session_failure_at_start_is_fatal() {
    let factory = Arc::new(MockFactory::with_limit(0));
    let extractor = Arc::new(MockExtractor::succeeding());
    let ledger = shared_ledger();

    let report = orchestrator(fast_config(), &factory, &extractor, &ledger)
        .run(items(5))
        .await;

    assert_eq!(report.final_state, RunState::FatalError);
    assert_eq!(report.completed, 0);
    assert_eq!(extractor.calls(), 0);

    let ledger = ledger.lock().unwrap();
    assert_eq!(
        ledger.get_latest_run().unwrap().unwrap().status,
        RunStatus::Failed
    );
    assert!(ledger.latest_results().unwrap().is_empty());
}

#[tokio::test]
async fn test_parallel_workers() {
    let factory = Arc::new(MockFactory::new());
    let extractor = Arc::new(MockExtractor::new(|item| {
        // Every seventh item fails for good
        if item.id.parse::<usize>().unwrap_or(0) % 7 == 0 {
            Ok(ExtractionOutcome::failure("HTTP 404", 1))
        } else {
            Ok(success_for(item))
        }
    }));
    let ledger = shared_ledger();

    let mut config = fast_config();
    config.run.workers = 4;
    config.run.max_retries = 0;
    config.run.checkpoint_every = 7;

    let report = orchestrator(config, &factory, &extractor, &ledger)
        .run(items(60))
        .await;

    assert_eq!(report.final_state, RunState::Completed);
    assert_eq!(report.completed, 60);
    assert_eq!(report.failed, 9);
    assert_eq!(report.cursor_index, 60);
    assert_eq!(factory.acquired(), 4);
    assert_eq!(factory.released(), 4);

    let ledger = ledger.lock().unwrap();
    let results = ledger.latest_results().unwrap();
    let positions: HashSet<usize> = results.iter().map(|r| r.position).collect();
    assert_eq!(results.len(), 60);
    assert_eq!(positions.len(), 60);

    // Checkpoints never move backwards
    let run = ledger.get_latest_run().unwrap().unwrap();
    let cursors: Vec<usize> = ledger
        .checkpoints_for_run(run.id)
        .unwrap()
        .iter()
        .map(|c| c.cursor_index)
        .collect();
    assert!(cursors.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(cursors.last(), Some(&60));
}

#[tokio::test]
async fn test_empty_input_completes_without_sessions() {
    let factory = Arc::new(MockFactory::new());
    let extractor = Arc::new(MockExtractor::succeeding());
    let ledger = shared_ledger();

    let report = orchestrator(fast_config(), &factory, &extractor, &ledger)
        .run(Vec::new())
        .await;

    assert_eq!(report.final_state, RunState::Completed);
    assert_eq!(factory.acquired(), 0);
}

#[tokio::test]
async fn test_append_failure_is_retried_once() {
    let factory = Arc::new(MockFactory::new());
    let extractor = Arc::new(MockExtractor::succeeding());
    let ledger = Arc::new(Mutex::new(FlakyLedger::new(1)));

    let report = flaky_orchestrator(fast_config(), &factory, &extractor, &ledger)
        .run(items(30))
        .await;

    assert_eq!(report.final_state, RunState::Completed);
    assert_eq!(report.cursor_index, 30);

    let ledger = ledger.lock().unwrap();
    // Failed and retried flush at 25, then the final flush
    assert_eq!(ledger.appends(), 3);
    assert_eq!(ledger.latest_results().unwrap().len(), 30);
    assert_eq!(ledger.load_latest().unwrap().unwrap().cursor_index, 30);
}

#[tokio::test]
async fn test_second_append_failure_is_fatal_and_resumable() {
    let factory = Arc::new(MockFactory::new());
    let ledger = Arc::new(Mutex::new(FlakyLedger::new(2)));

    let first = flaky_orchestrator(
        fast_config(),
        &factory,
        &Arc::new(MockExtractor::succeeding()),
        &ledger,
    )
    .run(items(30))
    .await;

    assert_eq!(first.final_state, RunState::FatalError);
    assert_eq!(first.exit_code(), 2);
    assert!(first.error.is_some());
    assert_eq!(factory.released(), factory.acquired());
    {
        let ledger = ledger.lock().unwrap();
        let run = ledger.get_latest_run().unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);

        // The ledger recovered for the final flush, so the buffered 25 landed
        let persisted = ledger.results_for_run(run.id).unwrap().len();
        let cursor = ledger.load_latest().unwrap().unwrap().cursor_index;
        assert_eq!(persisted, 25);
        assert!(cursor <= persisted, "cursor {} beyond {} stored", cursor, persisted);
        assert_eq!(first.cursor_index, cursor);
    }

    let extractor = Arc::new(MockExtractor::succeeding());
    let second = flaky_orchestrator(fast_config(), &factory, &extractor, &ledger)
        .run(items(30))
        .await;

    assert_eq!(second.final_state, RunState::Completed);
    assert_eq!(second.start_index, 25);
    assert_eq!(extractor.calls(), 5);

    let ids: HashSet<String> = ledger
        .lock()
        .unwrap()
        .latest_results()
        .unwrap()
        .into_iter()
        .map(|r| r.item.id)
        .collect();
    assert_eq!(ids.len(), 30);
}

#[tokio::test]
async fn test_unwritable_ledger_keeps_last_good_checkpoint() {
    let factory = Arc::new(MockFactory::new());
    let ledger = Arc::new(Mutex::new(FlakyLedger::new(usize::MAX)));

    let report = flaky_orchestrator(
        fast_config(),
        &factory,
        &Arc::new(MockExtractor::succeeding()),
        &ledger,
    )
    .run(items(30))
    .await;

    assert_eq!(report.final_state, RunState::FatalError);
    assert_eq!(report.exit_code(), 2);
    assert_eq!(report.cursor_index, 0);
    assert_eq!(factory.released(), factory.acquired());

    let ledger = ledger.lock().unwrap();
    assert!(ledger.latest_results().unwrap().is_empty());
    assert_eq!(ledger.load_latest().unwrap().unwrap().cursor_index, 0);
    assert_eq!(
        ledger.get_latest_run().unwrap().unwrap().status,
        RunStatus::Failed
    );
}

#[tokio::test]
async fn test_max_items_caps_each_run() {
    let mut config = fast_config();
    config.run.max_items = Some(12);
    let ledger = shared_ledger();

    for (start, cursor, calls) in [(0, 12, 12), (12, 24, 12), (24, 30, 6)] {
        let extractor = Arc::new(MockExtractor::succeeding());
        let factory = Arc::new(MockFactory::new());
        let report = orchestrator(config.clone(), &factory, &extractor, &ledger)
            .run(items(30))
            .await;

        assert_eq!(report.final_state, RunState::Completed);
        assert_eq!(report.start_index, start);
        assert_eq!(report.cursor_index, cursor);
        assert_eq!(extractor.calls(), calls);
    }

    assert_eq!(ledger.lock().unwrap().latest_results().unwrap().len(), 30);
}
