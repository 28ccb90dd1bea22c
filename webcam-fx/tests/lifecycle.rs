mod common;

use blurcam::segmentation::Quality;
use blurcam::{EngineError, InitStage, LifecycleState, StartOutcome, StopOutcome};
use common::{engine, engine_with, test_config, wait_for, Counters, FailAt, MockOptions};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn second_start_reports_already_running() {
    let (engine, counters) = engine(FailAt::Nothing);

    assert_eq!(engine.start().unwrap(), StartOutcome::Started);
    assert_eq!(engine.start().unwrap(), StartOutcome::AlreadyRunning);
    assert_eq!(Counters::get(&counters.source_opens), 1);
    assert_eq!(engine.state(), LifecycleState::Running);

    assert_eq!(engine.stop().unwrap(), StopOutcome::Stopped);
}

#[test]
fn stop_when_idle_is_a_no_op() {
    let (engine, counters) = engine(FailAt::Nothing);

    assert_eq!(engine.stop().unwrap(), StopOutcome::AlreadyStopped);
    assert_eq!(engine.state(), LifecycleState::Idle);
    assert_eq!(counters.opens(), 0);

    engine.start().unwrap();
    assert_eq!(engine.stop().unwrap(), StopOutcome::Stopped);
    assert_eq!(engine.stop().unwrap(), StopOutcome::AlreadyStopped);
}

#[test]
fn repeated_cycles_release_everything_they_open() {
    let (engine, counters) = engine(FailAt::Nothing);

    for cycle in 0..10 {
        let emitted_before = Counters::get(&counters.frames_emitted);
        assert_eq!(engine.start().unwrap(), StartOutcome::Started, "cycle {cycle}");

        // Counting restarts with every run
        let processed = engine.status().frames_processed;
        let emitted = Counters::get(&counters.frames_emitted) - emitted_before;
        assert!(processed as usize <= emitted, "cycle {cycle}");

        assert!(wait_for(WAIT, || engine.status().frames_processed >= 3));
        assert!(engine.status().running);

        assert_eq!(engine.stop().unwrap(), StopOutcome::Stopped);
        assert_eq!(engine.state(), LifecycleState::Idle);
        assert!(!engine.status().running);
        assert!(!engine.status().virtual_camera_active);
    }

    assert_eq!(Counters::get(&counters.source_opens), 10);
    assert_eq!(Counters::get(&counters.model_opens), 10);
    assert_eq!(Counters::get(&counters.sink_opens), 10);
    assert_eq!(counters.releases(), counters.opens());
}

#[test]
fn model_failure_rolls_back_the_source() {
    let (engine, counters) = engine(FailAt::Model);

    for _ in 0..2 {
        let err = engine.start().unwrap_err();
        assert_eq!(err.stage(), Some(InitStage::Model));
        assert!(err.to_string().contains("model file missing"));
        assert_eq!(engine.state(), LifecycleState::Idle);
    }

    assert_eq!(Counters::get(&counters.source_opens), 2);
    assert_eq!(Counters::get(&counters.source_releases), 2);
    assert_eq!(Counters::get(&counters.sink_opens), 0);
    assert_eq!(engine.stop().unwrap(), StopOutcome::AlreadyStopped);
}

#[test]
fn sink_failure_rolls_back_source_and_model() {
    let (engine, counters) = engine(FailAt::Sink);

    let err = engine.start().unwrap_err();
    assert_eq!(err.stage(), Some(InitStage::Sink));
    assert_eq!(engine.state(), LifecycleState::Idle);
    assert_eq!(Counters::get(&counters.source_releases), 1);
    assert_eq!(Counters::get(&counters.model_releases), 1);
    assert_eq!(counters.releases(), counters.opens());
}

#[test]
fn source_failure_opens_nothing_else() {
    let (engine, counters) = engine(FailAt::Source);

    let err = engine.start().unwrap_err();
    assert_eq!(err.stage(), Some(InitStage::Source));
    assert_eq!(counters.opens(), 0);
    assert!(!engine.is_running());
}

#[test]
fn blur_updates_apply_while_running() {
    let (engine, _counters) = engine(FailAt::Nothing);
    engine.start().unwrap();

    let ack = engine.update_blur(250.0, "gaussian");
    assert_eq!(ack.blur_strength, 100.0);
    assert_eq!(ack.mode, "gaussian");
    assert_eq!(engine.status().blur_strength, 100.0);

    assert_eq!(engine.update_blur(-5.0, "").blur_strength, 0.0);
    let before = engine.status().frames_processed;
    assert!(wait_for(WAIT, || engine.status().frames_processed > before + 2));

    engine.stop().unwrap();
    // Settings outlive the run
    assert_eq!(engine.status().blur_strength, 0.0);
}

#[test]
fn quality_change_reloads_the_running_model() {
    let (engine, counters) = engine(FailAt::Nothing);
    engine.start().unwrap();

    let ack = engine.update_quality(Quality::Fast, 0.7);
    assert!(ack.model_reload);
    assert_eq!(ack.quality, Quality::Fast);
    assert!((ack.smoothing_hint - 0.7).abs() < 1e-6);

    assert!(wait_for(WAIT, || Counters::get(&counters.fast_models) == 1));
    assert!(wait_for(WAIT, || Counters::get(&counters.model_releases) == 1));

    // Same preset again does not reload
    assert!(!engine.update_quality(Quality::Fast, 0.7).model_reload);

    engine.stop().unwrap();
    assert_eq!(Counters::get(&counters.model_opens), 2);
    assert_eq!(counters.releases(), counters.opens());
}

#[test]
fn quality_chosen_while_idle_is_used_on_start() {
    let (engine, counters) = engine(FailAt::Nothing);

    let ack = engine.update_quality(Quality::Fast, 2.0);
    assert!(!ack.model_reload);
    assert_eq!(ack.smoothing_hint, 1.0);

    engine.start().unwrap();
    assert_eq!(Counters::get(&counters.fast_models), 1);
    assert_eq!(Counters::get(&counters.model_opens), 1);
    engine.stop().unwrap();
}

#[test]
fn status_reports_performance_after_a_stats_window() {
    let (engine, _counters) = engine(FailAt::Nothing);
    assert_eq!(engine.status().performance_grade, None);

    engine.start().unwrap();
    assert!(wait_for(WAIT, || engine.status().performance_grade.is_some()));

    let status = engine.status();
    assert!(status.frames_processed >= 30);
    assert!(status.fps > 0.0);
    assert!(status.fps <= 1000.0);
    assert_eq!(status.state, LifecycleState::Running);

    engine.update_smoothing(false, false);
    engine.update_noise_reduction(true);
    let status = engine.status();
    assert!(!status.edge_smoothing);
    assert!(!status.temporal_smoothing);
    assert!(status.noise_reduction);

    engine.stop().unwrap();
}

#[test]
fn concurrent_starts_build_one_pipeline() {
    let (engine, counters) = engine(FailAt::Nothing);
    let engine = Arc::new(engine);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.start().unwrap())
        })
        .collect();
    let started = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|outcome| *outcome == StartOutcome::Started)
        .count();

    assert_eq!(started, 1);
    assert_eq!(Counters::get(&counters.source_opens), 1);
    engine.stop().unwrap();
    assert_eq!(counters.releases(), counters.opens());
}

#[test]
fn dropping_the_engine_stops_the_pipeline() {
    let (engine, counters) = engine(FailAt::Nothing);
    engine.start().unwrap();
    assert!(wait_for(WAIT, || counters.frames_emitted.load(Ordering::SeqCst) > 0));

    drop(engine);
    assert_eq!(counters.releases(), counters.opens());
}

#[test]
fn transient_source_and_sink_errors_do_not_end_the_run() {
    let options = MockOptions {
        source_errors: 3,
        sink_errors: 3,
        ..MockOptions::default()
    };
    let (engine, counters) = engine_with(FailAt::Nothing, test_config(), options);

    assert_eq!(engine.start().unwrap(), StartOutcome::Started);
    assert!(wait_for(WAIT, || {
        Counters::get(&counters.source_failures) == 3 && Counters::get(&counters.sink_failures) == 3
    }));

    let after_errors = engine.status().frames_processed;
    assert!(wait_for(WAIT, || engine.status().frames_processed >= after_errors + 5));
    assert_eq!(engine.state(), LifecycleState::Running);

    assert_eq!(engine.stop().unwrap(), StopOutcome::Stopped);
    assert_eq!(counters.releases(), counters.opens());
}

#[test]
fn panicking_model_does_not_end_the_run() {
    let options = MockOptions {
        panic_on_infer: Some(5),
        ..MockOptions::default()
    };
    let (engine, counters) = engine_with(FailAt::Nothing, test_config(), options);

    engine.start().unwrap();
    assert!(wait_for(WAIT, || Counters::get(&counters.infer_calls) > 5));
    assert!(wait_for(WAIT, || engine.status().frames_processed >= 8));
    assert!(engine.status().running);

    assert_eq!(engine.stop().unwrap(), StopOutcome::Stopped);
    assert_eq!(engine.state(), LifecycleState::Idle);
    assert_eq!(counters.releases(), counters.opens());
}

#[test]
fn stalled_iteration_keeps_the_engine_stopping_until_devices_are_released() {
    let config = blurcam::EngineConfig {
        stop_timeout: Duration::from_millis(100),
        ..test_config()
    };
    let options = MockOptions {
        acquire_delay: Some(Duration::from_millis(800)),
        exclusive: true,
        ..MockOptions::default()
    };
    let (engine, counters) = engine_with(FailAt::Nothing, config, options);

    assert_eq!(engine.start().unwrap(), StartOutcome::Started);
    assert!(wait_for(WAIT, || Counters::get(&counters.acquire_calls) >= 1));

    let err = engine.stop().unwrap_err();
    assert!(matches!(err, EngineError::StopTimedOut(_)), "{err}");
    assert_eq!(engine.state(), LifecycleState::Stopping);
    assert!(!engine.status().running);
    assert!(counters.releases() < counters.opens());

    // The stuck thread still owns the camera
    let err = engine.start().unwrap_err();
    assert!(matches!(err, EngineError::PreviousRunActive), "{err}");
    assert_eq!(Counters::get(&counters.source_opens), 1);

    assert!(wait_for(WAIT, || engine.state() == LifecycleState::Idle));
    assert_eq!(counters.releases(), counters.opens());

    assert_eq!(engine.start().unwrap(), StartOutcome::Started);
    assert_eq!(Counters::get(&counters.source_opens), 2);

    // Each stop attempt may still land inside a slow read
    assert!(wait_for(WAIT, || engine.stop().is_ok()));
    assert_eq!(engine.state(), LifecycleState::Idle);
    assert_eq!(counters.releases(), counters.opens());
}

#[test]
fn start_that_outlasts_its_timeout_releases_what_it_opened() {
    let config = blurcam::EngineConfig {
        start_timeout: Duration::from_millis(100),
        ..test_config()
    };
    let options = MockOptions {
        slow_opens: 1,
        open_delay: Duration::from_millis(400),
        ..MockOptions::default()
    };
    let (engine, counters) = engine_with(FailAt::Nothing, config, options);

    let err = engine.start().unwrap_err();
    assert!(matches!(err, EngineError::StartTimedOut(_)), "{err}");
    assert!(!engine.is_running());

    assert!(wait_for(WAIT, || engine.state() == LifecycleState::Idle));
    assert_eq!(counters.releases(), counters.opens());
    assert_eq!(Counters::get(&counters.frames_emitted), 0);

    assert_eq!(engine.start().unwrap(), StartOutcome::Started);
    assert!(wait_for(WAIT, || engine.status().frames_processed > 0));
    assert_eq!(engine.stop().unwrap(), StopOutcome::Stopped);
    assert_eq!(counters.releases(), counters.opens());
}
