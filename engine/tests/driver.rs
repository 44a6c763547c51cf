mod common;

use common::{Cue, Journal, Recorder, init_tracing, options, posix_promoter};
use nix::errno::Errno;
use rtblock_engine::domain::ThreadSched;
use rtblock_engine::{
    Domain, Driver, DriverError, DriverOptions, DriverState, HwError, Promoter, SimHardware, SimOptions, SubmitError,
    SyncError, Time, TimeBase,
};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn limited(blocks: u64) -> SimHardware {
    SimHardware::new(SimOptions {
        block_limit: Some(blocks),
        ..SimOptions::default()
    })
}

#[test]
fn runs_until_stopped_and_walks_the_state_machine() {
    init_tracing();
    let journal = Arc::new(Journal::default());
    let mut driver = Driver::<Cue>::new(options(), posix_promoter()).unwrap();
    assert_eq!(driver.state(), DriverState::Idle);
    assert!(matches!(driver.join(), Err(DriverError::NotRunning)));

    let hw = SimHardware::new(SimOptions::default());
    let probe = hw.probe();
    let params = driver.start(hw, Recorder::new(journal.clone())).unwrap();
    assert_eq!(driver.state(), DriverState::Running);
    assert_eq!(params.block_frames, 64);
    assert_eq!(*journal.prepared.lock(), Some(params));
    assert!(matches!(
        driver.start(limited(1), Recorder::new(journal.clone())),
        Err(DriverError::AlreadyStarted)
    ));

    assert!(driver.wait_blocks(20, Duration::from_secs(5)));
    driver.stop().unwrap();
    assert_eq!(driver.state(), DriverState::Stopped);
    assert!(probe.stopped.load(Ordering::Acquire));

    let stats = driver.stats();
    assert!(stats.blocks >= 20);
    assert_eq!(stats.blocks, journal.processed.load(Ordering::Relaxed));
    assert_eq!(probe.blocks_written.load(Ordering::Relaxed), stats.blocks);
    assert_eq!(probe.last_peak.load(Ordering::Relaxed), 0.25);
    assert!(matches!(
        driver.submit(Time::ZERO, Cue::Mark(0)),
        Err(SubmitError::Closed(_))
    ));
}

#[test]
fn negotiation_failure_never_reaches_running() {
    init_tracing();
    let journal = Arc::new(Journal::default());
    let mut driver = Driver::<Cue>::new(options(), posix_promoter()).unwrap();
    let hw = SimHardware::new(SimOptions {
        fail_negotiation: true,
        ..SimOptions::default()
    });
    let err = driver.start(hw, Recorder::new(journal.clone())).unwrap_err();
    assert!(matches!(err, DriverError::Setup(HwError::Negotiation(_))));
    assert_eq!(driver.state(), DriverState::Stopped);
    assert_eq!(driver.stats().blocks, 0);
    assert!(journal.prepared.lock().is_none());
    assert!(!driver.wait_blocks(1, Duration::from_millis(50)));
    assert!(matches!(driver.submit(Time::ZERO, Cue::Mark(1)), Err(SubmitError::Closed(_))));
}

#[test]
fn invalid_options_are_rejected_up_front() {
    let opts = DriverOptions {
        block_frames: 0,
        ..options()
    };
    assert!(matches!(
        Driver::<Cue>::new(opts, posix_promoter()),
        Err(DriverError::InvalidOptions(_))
    ));
}

struct BrokenDomain;

impl Domain for BrokenDomain {
    fn label(&self) -> &'static str {
        "broken"
    }

    fn initialize(&self) -> Result<(), Errno> {
        Err(Errno::ENOSYS)
    }

    fn is_initialized(&self) -> bool {
        false
    }

    fn is_member(&self) -> bool {
        false
    }

    fn register_current(&self, _sched: ThreadSched) -> Result<(), Errno> {
        Err(Errno::EPERM)
    }
}

#[test]
fn primitive_creation_failure_is_fatal_for_the_driver() {
    init_tracing();
    let err = Driver::<Cue>::new(options(), Promoter::new(BrokenDomain)).unwrap_err();
    assert!(matches!(
        err,
        DriverError::Primitive(SyncError::InitFailed { primitive: "mutex", .. })
    ));
}

#[test]
fn hardware_disconnect_stops_the_driver_by_itself() {
    init_tracing();
    let journal = Arc::new(Journal::default());
    let mut driver = Driver::<Cue>::new(options(), posix_promoter()).unwrap();
    let hw = SimHardware::new(SimOptions {
        block_limit: Some(10),
        xrun_blocks: vec![2, 3],
        ..SimOptions::default()
    });
    driver.start(hw, Recorder::new(journal.clone())).unwrap();
    driver.join().unwrap();
    assert_eq!(driver.state(), DriverState::Stopped);
    let stats = driver.stats();
    assert_eq!(stats.blocks, 8);
    assert_eq!(stats.xruns, 2);
    assert_eq!(stats.clock_anomalies, 1);
    assert_eq!(driver.clock().blocks, 8);

    let increment = (TimeBase::new(options().clock.time_units_per_second).units_per_second() as f64 * 64.0
        / 48_000.0)
        .floor() as i64;
    let starts = journal.blocks.lock().clone();
    assert_eq!(starts.len(), 8);
    assert!((starts[1] - starts[0] - increment).abs() <= 2);
    // Blocks 2 and 3 were lost; the window after them starts three blocks on.
    assert!((starts[2] - starts[1] - 3 * increment).abs() <= 4, "gap {}", starts[2] - starts[1]);
    assert!((starts[7] - starts[0] - 9 * increment).abs() <= 10);
}

#[test]
fn stop_mid_dispatch_finishes_the_current_block() {
    init_tracing();
    let journal = Arc::new(Journal::default());
    let opts = options();
    let base = TimeBase::new(opts.clock.time_units_per_second);
    let increment = (base.units_per_second() as f64 * 64.0 / 48_000.0) as i64;
    let step = increment / 3;

    let mut driver = Driver::<Cue>::new(opts, posix_promoter()).unwrap();
    let origin = base.after(Duration::from_secs(2));
    let mut deadlines = Vec::new();
    for id in 0..60_u32 {
        let deadline = origin + id as i64 * step;
        let cue = if id == 30 { Cue::StopHere(id) } else { Cue::Mark(id) };
        driver.submit(deadline, cue).unwrap();
        deadlines.push(deadline);
    }

    let mut recorder = Recorder::new(journal.clone());
    recorder.stop = Some(driver.stop_handle());
    driver.start(SimHardware::new(SimOptions::default()), recorder).unwrap();
    driver.join().unwrap();
    assert_eq!(driver.state(), DriverState::Stopped);

    let applied = journal.applied.lock().clone();
    let stop = applied.iter().find(|a| a.id == 30).copied().unwrap();
    let expected: Vec<u32> = (0..60).filter(|&id| deadlines[id as usize] < stop.block_end).collect();
    let ran: Vec<u32> = applied.iter().map(|a| a.id).collect();
    assert_eq!(ran, expected);
    assert!(ran.len() >= 31 && ran.len() < 60);

    let blocks = journal.blocks.lock().clone();
    assert_eq!(blocks.last().copied(), Some(stop.block_start));
    assert_eq!(driver.stats().events, ran.len() as u64);
    for a in &applied {
        assert!(a.offset < 64);
        assert!(a.deadline < a.block_end);
        assert!(a.slipped || a.deadline >= a.block_start);
    }
}

#[test]
fn panics_are_contained_and_counted() {
    init_tracing();
    let journal = Arc::new(Journal::default());
    let mut driver = Driver::<Cue>::new(options(), posix_promoter()).unwrap();
    driver.submit(Time::from_raw(0), Cue::Mark(1)).unwrap();
    driver.submit(Time::from_raw(1), Cue::Panic).unwrap();
    driver.submit(Time::from_raw(2), Cue::Mark(2)).unwrap();
    let mut recorder = Recorder::new(journal.clone());
    recorder.panic_in_block = Some(3);
    driver.start(limited(6), recorder).unwrap();
    driver.join().unwrap();

    let stats = driver.stats();
    assert_eq!(stats.panics, 2);
    assert_eq!(stats.blocks, 6);
    assert_eq!(stats.events, 3);
    assert_eq!(stats.slips, 3);
    let ids: Vec<u32> = journal.applied.lock().iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(journal.processed.load(Ordering::Relaxed), 5);
}

#[test]
fn clock_snapshot_tracks_the_device() {
    init_tracing();
    let journal = Arc::new(Journal::default());
    let mut driver = Driver::<Cue>::new(options(), posix_promoter()).unwrap();
    let hw = SimHardware::new(SimOptions {
        drift_ppm: 50.0,
        block_limit: Some(3_000),
        ..SimOptions::default()
    });
    driver.start(hw, Recorder::new(journal)).unwrap();
    driver.join().unwrap();

    let clock = driver.clock();
    assert_eq!(clock.blocks, 3_000);
    assert_eq!(clock.nominal_rate, 48_000.0);
    assert!((clock.smoothed_rate - 48_002.4).abs() < 0.1, "rate {}", clock.smoothed_rate);
    assert_eq!(clock.window_end - clock.window_start, clock.block_increment);
    assert_eq!(driver.stats().clock_anomalies, 0);
}

#[test]
fn preferred_period_is_forced_to_block_size() {
    init_tracing();
    let journal = Arc::new(Journal::default());
    let opts = DriverOptions {
        preferred_period_frames: Some(256),
        ..options()
    };
    let mut driver = Driver::<Cue>::new(opts, posix_promoter()).unwrap();
    let params = driver.start(limited(1), Recorder::new(journal)).unwrap();
    assert_eq!(params.period_frames, 64);
    driver.join().unwrap();
}
