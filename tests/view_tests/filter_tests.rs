//! Tests for FilterEngine and FilterState
//!
//! These tests verify:
//! - Predicate bookkeeping (short names, buckets, defaults)
//! - Bypass when nothing is filtered
//! - Substring and logger filtering, idempotent re-application
//! - Independent paging of the filtered view
//! - Records arriving after the pass started
//! - Reset and restart on erase

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::Receiver;
use harnesslog::model::level;
use harnesslog::store::{LogStoreFile, Writer};
use harnesslog::view::{channel_listener, FilterEngine, FilterState, TailEngine, ViewEvent};
use harnesslog::{Config, LogRecord, SeverityBucket};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const TIMEOUT: Duration = Duration::from_secs(10);

struct Fixture {
    filter: FilterEngine,
    tail: Arc<TailEngine>,
    writer: Writer,
    _log_path: PathBuf,
    _temp: TempDir,
}

fn setup(page_size: usize) -> Fixture {
    let temp = TempDir::new().unwrap();
    let log_path = temp.path().join("harness.log");
    let config = Config::builder()
        .log_path(&log_path)
        .page_size(page_size)
        .poll_interval_ms(10)
        .autostart(false)
        .build();

    let store = Arc::new(LogStoreFile::open(&log_path).unwrap());
    let writer = Writer::new(Arc::clone(&store));
    let tail = Arc::new(TailEngine::new(store, &config));
    let filter = FilterEngine::new(Arc::clone(&tail), &config);
    tail.start().unwrap();

    Fixture {
        filter,
        tail,
        writer,
        _log_path: log_path,
        _temp: temp,
    }
}

fn wait_until(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

fn wait_tail(fixture: &Fixture, len: usize) {
    assert!(
        wait_until(|| fixture.tail.len() == len && fixture.tail.is_stable()),
        "tail stuck at {} records",
        fixture.tail.len()
    );
}

fn wait_filter(fixture: &Fixture, len: usize) {
    assert!(
        wait_until(|| fixture.filter.len() == len && fixture.filter.is_stable()),
        "filter stuck at {} records, expected {}",
        fixture.filter.len(),
        len
    );
}

/// Two records: "hello world" at INFO from test.A, "goodbye" at WARNING from test.B
fn write_greetings(fixture: &Fixture) -> (LogRecord, LogRecord) {
    let a = fixture.writer.write(level::INFO, 1, "test.A", "hello world").unwrap();
    let b = fixture.writer.write(level::WARNING, 2, "test.B", "goodbye").unwrap();
    wait_tail(fixture, 2);
    (a, b)
}

fn messages(fixture: &Fixture) -> Vec<String> {
    fixture
        .filter
        .snapshot()
        .iter()
        .map(|r| fixture.tail.message(r))
        .collect()
}

fn recv_until(events: &Receiver<ViewEvent>, wanted: &ViewEvent) -> Vec<ViewEvent> {
    let mut seen = Vec::new();
    loop {
        let event = events
            .recv_timeout(TIMEOUT)
            .unwrap_or_else(|_| panic!("never saw {:?}; got {:?}", wanted, seen));
        let done = event == *wanted;
        seen.push(event);
        if done {
            return seen;
        }
    }
}

// =============================================================================
// FilterState Tests
// =============================================================================

#[test]
fn test_state_defaults_to_enabled() {
    let state = FilterState::new();

    assert!(state.is_no_filter());
    assert!(state.is_enabled("never.Seen", SeverityBucket::Critical));
}

#[test]
fn test_state_keys_on_short_name() {
    let mut state = FilterState::new();
    state.register_logger("org.example.Net");
    state.set_enabled("org.example.Net", SeverityBucket::Debug, false);

    assert!(!state.is_enabled("Net", SeverityBucket::Debug));
    assert!(!state.is_enabled("other.pkg.Net", SeverityBucket::Debug));
    assert!(state.is_enabled("org.example.Net", SeverityBucket::Monitoring));
    assert!(!state.is_no_filter());
}

#[test]
fn test_state_register_keeps_existing_choice() {
    let mut state = FilterState::new();
    state.set_logger_enabled("a.Quiet", false);
    state.register_logger("a.Quiet");

    for bucket in SeverityBucket::ALL {
        assert!(!state.is_enabled("a.Quiet", bucket));
    }
}

#[test]
fn test_state_bucket_toggle() {
    let mut state = FilterState::new();
    state.register_logger("a.One");
    state.register_logger("b.Two");
    state.set_bucket_enabled(SeverityBucket::Warning, false);

    assert!(!state.is_enabled("a.One", SeverityBucket::Warning));
    assert!(!state.is_enabled("b.Two", SeverityBucket::Warning));
    assert!(state.is_enabled("b.Two", SeverityBucket::Critical));
}

#[test]
fn test_state_term_normalized() {
    let mut state = FilterState::new();
    state.set_term("  HeLLo ");

    assert_eq!(state.term(), "hello");
    assert!(!state.is_no_filter());

    state.set_term("   ");
    assert!(state.is_no_filter());
}

// =============================================================================
// Bypass Tests
// =============================================================================

#[test]
fn test_starts_in_bypass() {
    let fixture = setup(10);
    write_greetings(&fixture);

    assert!(fixture.filter.is_bypassed());
    assert_eq!(fixture.filter.len(), 2);
    assert_eq!(fixture.filter.snapshot(), fixture.tail.snapshot());
    assert!(fixture.filter.is_stable());
}

#[test]
fn test_clearing_filter_returns_to_bypass() {
    let fixture = setup(10);
    write_greetings(&fixture);

    fixture.filter.set_term("hello").unwrap();
    wait_filter(&fixture, 1);
    assert!(!fixture.filter.is_bypassed());

    fixture.filter.set_term("").unwrap();
    assert!(fixture.filter.is_bypassed());
    assert_eq!(fixture.filter.len(), 2);
}

// =============================================================================
// Predicate Tests
// =============================================================================

#[test]
fn test_substring_and_logger_filtering() {
    let fixture = setup(10);
    let (a, b) = write_greetings(&fixture);

    let mut state = FilterState::new();
    state.set_term("hello");
    fixture.filter.apply(state.clone()).unwrap();
    wait_filter(&fixture, 1);
    assert_eq!(fixture.filter.snapshot(), vec![a]);

    state.set_logger_enabled("test.A", false);
    fixture.filter.apply(state.clone()).unwrap();
    wait_filter(&fixture, 0);
    assert!(fixture.filter.is_empty());

    state.set_term("");
    fixture.filter.apply(state).unwrap();
    wait_filter(&fixture, 1);
    assert_eq!(fixture.filter.snapshot(), vec![b]);
}

#[test]
fn test_term_matches_header() {
    let fixture = setup(10);
    let (_, b) = write_greetings(&fixture);

    // Level name and logger are part of the searchable header
    fixture.filter.set_term("WARNING").unwrap();
    wait_filter(&fixture, 1);
    assert_eq!(fixture.filter.get(0), Some(b));

    fixture.filter.set_term("TEST.A").unwrap();
    wait_filter(&fixture, 1);
    assert_eq!(messages(&fixture), vec!["hello world"]);
}

#[test]
fn test_bucket_filtering() {
    let fixture = setup(10);
    let (a, _) = write_greetings(&fixture);

    let mut state = FilterState::new();
    for name in fixture.tail.loggers() {
        state.register_logger(&name);
    }
    state.set_bucket_enabled(SeverityBucket::Warning, false);
    fixture.filter.apply(state).unwrap();

    wait_filter(&fixture, 1);
    assert_eq!(fixture.filter.snapshot(), vec![a]);
}

#[test]
fn test_is_applicable() {
    let fixture = setup(10);
    let (a, b) = write_greetings(&fixture);

    fixture.filter.set_logger_enabled("test.B", false).unwrap();

    assert!(fixture.filter.is_applicable(&a));
    assert!(!fixture.filter.is_applicable(&b));
}

#[test]
fn test_reapply_is_idempotent() {
    let fixture = setup(7);
    for i in 0..60 {
        let logger = ["x.Alpha", "x.Beta", "x.Gamma"][i % 3];
        let message = if i % 4 == 0 { format!("match {}", i) } else { format!("other {}", i) };
        fixture.writer.write(level::INFO, i as i64, logger, &message).unwrap();
    }
    wait_tail(&fixture, 60);

    let mut state = FilterState::new();
    state.set_term("match");
    state.set_logger_enabled("x.Gamma", false);

    fixture.filter.apply(state.clone()).unwrap();
    wait_until(|| fixture.filter.is_stable());
    let first = fixture.filter.snapshot();

    fixture.filter.apply(state.clone()).unwrap();
    wait_until(|| fixture.filter.is_stable());
    let second = fixture.filter.snapshot();

    // Gamma is every third record; matches are every fourth
    let expected = (0..60).filter(|i| i % 4 == 0 && i % 3 != 2).count();
    assert_eq!(first.len(), expected);
    assert_eq!(first, second);
    assert_eq!(fixture.filter.state(), {
        let mut registered = state;
        for name in fixture.tail.loggers() {
            registered.register_logger(&name);
        }
        registered
    });
}

// =============================================================================
// Paging Tests
// =============================================================================

#[test]
fn test_filtered_view_pages_independently() {
    let fixture = setup(4);
    for i in 0..10 {
        let logger = if i % 2 == 0 { "p.Even" } else { "p.Odd" };
        fixture.writer.write(level::INFO, i, logger, "payload").unwrap();
    }
    wait_tail(&fixture, 10);

    let (listener, events) = channel_listener();
    fixture.filter.add_listener(listener);
    fixture.filter.set_logger_enabled("p.Odd", false).unwrap();

    let seen = recv_until(
        &events,
        &ViewEvent::NewPage {
            start: 4,
            end: 5,
            page: 1,
        },
    );

    let pages: Vec<_> = seen
        .iter()
        .filter(|e| matches!(e, ViewEvent::NewPage { .. }))
        .cloned()
        .collect();
    assert_eq!(
        pages,
        vec![
            ViewEvent::NewPage { start: 0, end: 4, page: 0 },
            ViewEvent::NewPage { start: 4, end: 5, page: 1 },
        ]
    );
    let drained: Vec<_> = events.try_iter().collect();
    assert!(seen.contains(&ViewEvent::FilterChanged) || drained.contains(&ViewEvent::FilterChanged));
}

// =============================================================================
// Incremental Tests
// =============================================================================

#[test]
fn test_picks_up_new_records() {
    let fixture = setup(10);
    write_greetings(&fixture);

    fixture.filter.set_term("needle").unwrap();
    wait_filter(&fixture, 0);

    fixture.writer.write(level::INFO, 3, "test.C", "a needle here").unwrap();
    fixture.writer.write(level::INFO, 4, "test.C", "nothing").unwrap();
    fixture.writer.write(level::SEVERE, 5, "test.D", "NEEDLE again").unwrap();

    wait_filter(&fixture, 2);
    assert_eq!(messages(&fixture), vec!["a needle here", "NEEDLE again"]);

    // New loggers were registered as enabled
    assert!(fixture.filter.state().is_enabled("test.D", SeverityBucket::Critical));
}

#[test]
fn test_stable_filter_covers_tail() {
    let fixture = setup(16);
    fixture.filter.set_term("payload").unwrap();

    let writer = Writer::new(Arc::clone(fixture.writer.store()));
    let producer = thread::spawn(move || {
        for i in 0..500 {
            writer.write(level::INFO, i, "load.Gen", "payload").unwrap();
        }
    });

    // Every record counted before the check must already be in a stable view
    while !producer.is_finished() {
        let seen = fixture.tail.len();
        if fixture.filter.is_stable() {
            let len = fixture.filter.len();
            assert!(len >= seen, "stable filter holds {} of {} records", len, seen);
        }
        thread::yield_now();
    }
    producer.join().unwrap();

    wait_tail(&fixture, 500);
    wait_filter(&fixture, 500);
}

#[test]
fn test_erase_resets_filtered_view() {
    let fixture = setup(10);
    write_greetings(&fixture);

    fixture.filter.set_term("hello").unwrap();
    wait_filter(&fixture, 1);

    let (listener, events) = channel_listener();
    fixture.filter.add_listener(listener);
    fixture.writer.erase_log_file().unwrap();

    assert!(fixture.filter.is_empty());
    assert!(events.try_iter().any(|e| e == ViewEvent::RemoveAllLoggers));
    assert!(!fixture.filter.is_bypassed());

    fixture.writer.write(level::INFO, 10, "test.A", "hello again").unwrap();
    fixture.writer.write(level::INFO, 11, "test.A", "bye").unwrap();
    wait_tail(&fixture, 2);
    wait_filter(&fixture, 1);
    assert_eq!(messages(&fixture), vec!["hello again"]);
}

#[test]
fn test_stop_halts_pass() {
    let fixture = setup(10);
    write_greetings(&fixture);

    fixture.filter.set_term("hello").unwrap();
    wait_filter(&fixture, 1);
    fixture.filter.stop();

    fixture.writer.write(level::INFO, 3, "test.A", "hello later").unwrap();
    wait_tail(&fixture, 3);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(fixture.filter.len(), 1);
}
