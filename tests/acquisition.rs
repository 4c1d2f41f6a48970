use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use imaqkit::adaptor::{DemoAdaptor, DeviceSetting};
use imaqkit::capture::{FrameSource, StopSignal, SyntheticSource};
use imaqkit::engine::props::SELECTED_SOURCE_NAME;
use imaqkit::engine::{
    AcquisitionPolicy, EnginePropContainer, HostEngine, PropContainer, PropValue,
};
use imaqkit::error::{AdaptorError, Result, ERRID_BAD_FRAME_ALLOC, ERRMSG_BAD_FRAME_ALLOC};
use imaqkit::hardware::{self, MONOCHROME_DEVICE_ID, RGB_DEVICE_ID, SATURATION};
use imaqkit::{CaptureConfig, EngineConfig};

const TIMEOUT: Duration = Duration::from_secs(5);

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

fn capture_config() -> CaptureConfig {
    CaptureConfig {
        pacing_ms: 2,
        worker_name: "acquisition-test".to_string(),
        ..CaptureConfig::default()
    }
}

fn setup(
    device_id: u32,
    format: &str,
    engine: EngineConfig,
    source: Arc<dyn FrameSource>,
) -> (Arc<HostEngine>, Arc<DemoAdaptor>) {
    setup_with(device_id, format, engine, source, capture_config())
}

fn setup_with(
    device_id: u32,
    format: &str,
    engine: EngineConfig,
    source: Arc<dyn FrameSource>,
    config: CaptureConfig,
) -> (Arc<HostEngine>, Arc<DemoAdaptor>) {
    let host = Arc::new(HostEngine::new(&engine));
    let attrs = hardware::device_attributes(device_id).unwrap();
    hardware::register_attributes(host.property_store(), &attrs);

    let device = hardware::find_device(device_id).unwrap();
    let adaptor = DemoAdaptor::with_source(host.clone(), source, &device, format, &config);
    (host, adaptor)
}

fn mono_adaptor(engine: EngineConfig) -> (Arc<HostEngine>, Arc<DemoAdaptor>) {
    setup(MONOCHROME_DEVICE_ID, "RS170", engine, Arc::new(SyntheticSource))
}

/// Succeeds `remaining` times, then fails every allocation.
struct ExhaustingSource {
    remaining: AtomicU32,
}

impl FrameSource for ExhaustingSource {
    fn produce(&self, width: u32, height: u32, bands: u32, offset: u32) -> Result<Vec<u8>> {
        let left = self.remaining.load(Ordering::SeqCst);
        if left == 0 {
            return Err(AdaptorError::OutOfMemory {
                bytes: (width * height * bands) as usize,
            });
        }
        self.remaining.store(left - 1, Ordering::SeqCst);
        SyntheticSource.produce(width, height, bands, offset)
    }
}

/// Remembers every thread that produced a frame.
#[derive(Default)]
struct RecordingSource {
    producers: Mutex<HashSet<ThreadId>>,
}

impl FrameSource for RecordingSource {
    fn produce(&self, width: u32, height: u32, bands: u32, offset: u32) -> Result<Vec<u8>> {
        self.producers.lock().unwrap().insert(thread::current().id());
        SyntheticSource.produce(width, height, bands, offset)
    }
}

/// Takes `delay` to produce each frame.
struct SlowSource {
    delay: Duration,
    entered: AtomicBool,
}

impl FrameSource for SlowSource {
    fn produce(&self, width: u32, height: u32, bands: u32, offset: u32) -> Result<Vec<u8>> {
        self.entered.store(true, Ordering::SeqCst);
        thread::sleep(self.delay);
        SyntheticSource.produce(width, height, bands, offset)
    }
}

#[test]
fn produced_frames_are_deterministic() {
    let source = SyntheticSource;
    let first = source.produce(4, 2, 1, 0).unwrap();
    assert_eq!(first, vec![0, 1, 2, 3, 0, 1, 2, 3]);
    assert_eq!(source.produce(4, 2, 1, 0).unwrap(), first);

    let (host, adaptor) = mono_adaptor(EngineConfig {
        frames_per_trigger: Some(2),
        ..EngineConfig::default()
    });
    adaptor.open();
    assert!(adaptor.start().unwrap());
    assert!(wait_until(|| !adaptor.is_acquiring()));
    adaptor.stop().unwrap();

    let frames = host.take_frames();
    assert_eq!(frames.len(), 2);
    assert_eq!(&frames[0].data[..], &source.produce(640, 480, 1, 0).unwrap()[..]);
    assert_eq!(&frames[1].data[..], &source.produce(640, 480, 1, 2).unwrap()[..]);
}

#[test]
fn frame_count_counts_every_cycle() {
    let (host, adaptor) = mono_adaptor(EngineConfig {
        frame_grab_interval: 3,
        ..EngineConfig::default()
    });
    adaptor.open();
    assert!(adaptor.start().unwrap());
    assert!(wait_until(|| adaptor.frame_count() >= 10));
    adaptor.stop().unwrap();

    let cycles = adaptor.frame_count();
    assert_eq!(host.frames_received(), (cycles + 2) / 3);

    thread::sleep(Duration::from_millis(20));
    assert_eq!(adaptor.frame_count(), cycles);
}

#[test]
fn start_and_stop_are_idempotent() {
    let (_host, adaptor) = mono_adaptor(EngineConfig::default());
    adaptor.open();

    adaptor.stop().unwrap();
    adaptor.stop().unwrap();
    assert!(!adaptor.is_acquiring());

    assert!(adaptor.start().unwrap());
    assert!(adaptor.start().unwrap());
    assert!(adaptor.is_acquiring());
    assert!(adaptor.worker_running());

    // A second worker would keep producing after this stop.
    adaptor.stop().unwrap();
    let frozen = adaptor.frame_count();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(adaptor.frame_count(), frozen);
    assert!(!adaptor.worker_running());

    adaptor.stop().unwrap();
    assert!(!adaptor.is_acquiring());
}

#[test]
fn no_cycle_runs_after_stop_returns() {
    let (host, adaptor) = mono_adaptor(EngineConfig::default());
    adaptor.open();
    assert!(adaptor.start().unwrap());
    assert!(wait_until(|| adaptor.frame_count() >= 3));
    adaptor.stop().unwrap();

    assert!(!adaptor.is_driver_busy());
    assert!(!adaptor.worker_running());

    let before = adaptor.frame_count();
    let received = host.frames_received();
    adaptor
        .capture()
        .capture_cycle(&mut 0, &StopSignal::detached())
        .unwrap();
    assert_eq!(adaptor.frame_count(), before + 1);
    assert_eq!(host.frames_received(), received + 1);
}

#[test]
fn property_change_restarts_acquisition() {
    let (host, adaptor) = setup(
        RGB_DEVICE_ID,
        "S-Video",
        EngineConfig::default(),
        Arc::new(SyntheticSource),
    );
    adaptor.open();
    assert!(adaptor.start().unwrap());
    assert!(wait_until(|| adaptor.frame_count() >= 3));

    assert!(adaptor.is_acquiring());
    host.property_store()
        .set_prop_value(SATURATION, PropValue::Int(75))
        .unwrap();
    assert!(adaptor.is_acquiring());
    assert_eq!(adaptor.applied_setting(SATURATION), Some(DeviceSetting::Int(75)));

    let resumed_at = adaptor.frame_count();
    assert!(wait_until(|| adaptor.frame_count() > resumed_at + 2));
    assert!(adaptor.worker_running());

    adaptor.stop().unwrap();
    assert!(host.errors().is_empty());
    assert!(host.warnings().is_empty());
}

#[test]
fn allocation_failure_ends_acquisition_once() {
    let source = Arc::new(ExhaustingSource {
        remaining: AtomicU32::new(3),
    });
    let (host, adaptor) = setup(
        MONOCHROME_DEVICE_ID,
        "RS170",
        EngineConfig::default(),
        source,
    );
    adaptor.open();
    assert!(adaptor.start().unwrap());

    assert!(wait_until(|| !adaptor.is_acquiring()));
    assert!(wait_until(|| !adaptor.worker_running()));
    assert!(!adaptor.is_driver_busy());
    assert_eq!(adaptor.frame_count(), 3);

    let errors = host.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].id, ERRID_BAD_FRAME_ALLOC);
    assert_eq!(errors[0].message, ERRMSG_BAD_FRAME_ALLOC);

    // The device stays open and stopped; stop is a no-op.
    assert!(adaptor.is_open());
    adaptor.stop().unwrap();
    assert_eq!(host.errors().len(), 1);
}

#[test]
fn completed_acquisition_can_be_started_again() {
    let (host, adaptor) = mono_adaptor(EngineConfig {
        frames_per_trigger: Some(2),
        ..EngineConfig::default()
    });
    adaptor.open();
    assert!(adaptor.start().unwrap());
    assert!(wait_until(|| !adaptor.is_acquiring()));

    host.reset();
    host.set_policy(AcquisitionPolicy {
        frames_per_trigger: Some(3),
        ..host.policy()
    });
    assert!(adaptor.start().unwrap());
    assert!(wait_until(|| !adaptor.is_acquiring()));
    adaptor.close().unwrap();

    assert_eq!(host.frames_received(), 3);
    assert_eq!(adaptor.frame_count(), 5);
}

#[test]
fn source_change_restarts_acquisition() {
    let (host, adaptor) = setup(
        RGB_DEVICE_ID,
        "S-Video",
        EngineConfig::default(),
        Arc::new(SyntheticSource),
    );
    adaptor.open();
    assert!(adaptor.start().unwrap());
    assert!(wait_until(|| adaptor.frame_count() >= 3));

    host.engine_property_store()
        .set_int(SELECTED_SOURCE_NAME, 3)
        .unwrap();
    assert!(adaptor.is_acquiring());
    assert_eq!(adaptor.selected_source(), 3);

    let resumed_at = adaptor.frame_count();
    assert!(wait_until(|| adaptor.frame_count() > resumed_at + 2));
    assert!(adaptor.worker_running());

    adaptor.stop().unwrap();
    assert!(host.warnings().is_empty());
}

#[test]
fn stop_cuts_a_long_pacing_wait_short() {
    let config = CaptureConfig {
        pacing_ms: 1000,
        ..capture_config()
    };
    let source = Arc::new(SlowSource {
        delay: Duration::ZERO,
        entered: AtomicBool::new(false),
    });
    let (_host, adaptor) = setup_with(
        MONOCHROME_DEVICE_ID,
        "RS170",
        EngineConfig::default(),
        source.clone(),
        config,
    );
    adaptor.open();
    assert!(adaptor.start().unwrap());
    assert!(wait_until(|| source.entered.load(Ordering::SeqCst)));
    thread::sleep(Duration::from_millis(50));

    let began = Instant::now();
    adaptor.stop().unwrap();
    assert!(began.elapsed() < Duration::from_millis(500));
    assert!(!adaptor.worker_running());
    assert_eq!(adaptor.frame_count(), 1);
}

#[test]
fn concurrent_starts_spawn_one_worker() {
    let source = Arc::new(RecordingSource::default());
    let (_host, adaptor) = setup(
        MONOCHROME_DEVICE_ID,
        "RS170",
        EngineConfig::default(),
        source.clone(),
    );
    adaptor.open();

    let barrier = Arc::new(Barrier::new(2));
    let starters: Vec<_> = (0..2)
        .map(|_| {
            let adaptor = Arc::clone(&adaptor);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                adaptor.start().unwrap()
            })
        })
        .collect();
    for starter in starters {
        assert!(starter.join().unwrap());
    }

    assert!(wait_until(|| adaptor.frame_count() >= 5));
    adaptor.stop().unwrap();
    let frozen = adaptor.frame_count();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(adaptor.frame_count(), frozen);
    assert_eq!(source.producers.lock().unwrap().len(), 1);
}

#[test]
fn racing_stops_both_wait_for_the_cycle() {
    let source = Arc::new(SlowSource {
        delay: Duration::from_millis(200),
        entered: AtomicBool::new(false),
    });
    let (_host, adaptor) = setup(
        MONOCHROME_DEVICE_ID,
        "RS170",
        EngineConfig::default(),
        source.clone(),
    );
    adaptor.open();
    assert!(adaptor.start().unwrap());
    assert!(wait_until(|| source.entered.load(Ordering::SeqCst)));

    let first = {
        let adaptor = Arc::clone(&adaptor);
        thread::spawn(move || adaptor.stop())
    };
    thread::sleep(Duration::from_millis(20));
    adaptor.stop().unwrap();

    assert!(!adaptor.is_driver_busy());
    assert!(!adaptor.worker_running());
    let frozen = adaptor.frame_count();
    first.join().unwrap().unwrap();
    assert_eq!(adaptor.frame_count(), frozen);
}
