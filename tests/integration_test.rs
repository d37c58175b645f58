use std::f64::consts::PI;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{bounded, unbounded};

use event_conv::ffi;
use event_conv::strategy::build;
use event_conv::{
    ApproximateConvolver, ChannelSource, ConvConfig, DecaySurface, Event, EventConvolver, ExactConvolver,
    Kernel, Measurement, Pipeline, ReplaySource, Strategy, TimeBase,
};

/// 1 ms ticks and a small counter so stamps read as milliseconds.
fn config(width: u32, height: u32, strategy: Strategy) -> ConvConfig {
    ConvConfig::new(width, height)
        .with_alpha(PI)
        .with_kernel(3, 0.8)
        .with_clock(1_000_000, 1e-3)
        .with_strategy(strategy)
        .with_poll_interval(5)
}

fn scattered_events(n: u32, width: u16, height: u16) -> Vec<Event> {
    (0..n)
        .map(|i| {
            let x = ((i * 7 + 3) % width as u32) as u16;
            let y = ((i * 13 + 1) % height as u32) as u16;
            Event::new(x, y, i * 3, i % 3 != 0)
        })
        .collect()
}

fn wait_for(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

// ---------------------------------------------------------------------------
// Decay surface behaviour
// ---------------------------------------------------------------------------

#[test]
fn test_two_on_events_one_second_apart() {
    let surface = DecaySurface::new(4, 4, 0, PI);
    surface.apply_event(1, 1, true, 0.0);
    let v = surface.apply_event(1, 1, true, 1.0);
    assert!((v - ((-PI).exp() + 1.0)).abs() < 1e-12);
    assert!((v - 1.0432).abs() < 1e-4);
}

#[test]
fn test_on_off_pair_cancels() {
    let surface = DecaySurface::new(4, 4, 0, PI);
    surface.apply_event(2, 3, true, 0.5);
    let v = surface.apply_event(2, 3, false, 0.5);
    assert_eq!(v, 0.0);
    assert_eq!(surface.decayed_value(2, 3, 10.0), 0.0);
}

#[test]
fn test_counter_wrap_advances_by_six_ticks() {
    let tb = TimeBase::new(100, 1.0);
    assert_eq!(tb.ticks_between(3, 98), 6);
    assert!((tb.advance(3, 98) - 6.0).abs() < 1e-12);
}

#[test]
fn test_wrapped_stream_decays_across_the_wrap() {
    let cfg = config(4, 4, Strategy::Exact).with_clock(100, 0.1);
    let mut conv = ExactConvolver::new(&cfg).unwrap();
    conv.ingest(&[Event::new(1, 1, 98, true)]);
    conv.ingest(&[Event::new(3, 3, 3, true)]);
    // 9.8 s to the first stamp, then 6 ticks across the wrap
    assert!((conv.global_time() - 10.4).abs() < 1e-9);
    let kernel = Kernel::gaussian(3, 0.8);
    let expected = kernel.center() * (-PI * 0.6).exp();
    assert!((conv.current_frame().get(1, 1) - expected).abs() < 1e-12);
}

// ---------------------------------------------------------------------------
// Strategies behind one interface
// ---------------------------------------------------------------------------

#[test]
fn test_untouched_convolver_yields_zero_frame() {
    for strategy in [Strategy::Approximate, Strategy::Exact] {
        let conv = build(&config(6, 5, strategy)).unwrap();
        let frame = conv.current_frame();
        assert_eq!((frame.width(), frame.height()), (6, 5));
        assert!(frame.data().iter().all(|&v| v == 0.0), "{} not zero", strategy);
    }
}

#[test]
fn test_strategies_agree_on_dense_stream() {
    let events = scattered_events(500, 16, 12);
    let mut approx = build(&config(16, 12, Strategy::Approximate)).unwrap();
    let mut exact = build(&config(16, 12, Strategy::Exact)).unwrap();
    for chunk in events.chunks(37) {
        approx.ingest(chunk);
        exact.ingest(chunk);
    }
    let (a, e) = (approx.current_frame(), exact.current_frame());
    assert_eq!(a.reference_time(), e.reference_time());
    assert!(a.energy() > 0.0);
    assert!(a.max_abs_diff(&e) < 1e-9, "diff {}", a.max_abs_diff(&e));
}

#[test]
fn test_current_frame_is_idempotent() {
    for strategy in [Strategy::Approximate, Strategy::Exact] {
        let mut conv = build(&config(8, 8, strategy)).unwrap();
        conv.ingest(&scattered_events(40, 8, 8));
        assert_eq!(conv.current_frame(), conv.current_frame());
    }
}

#[test]
fn test_single_event_spreads_as_kernel() {
    let mut conv = ExactConvolver::new(&config(5, 5, Strategy::Exact)).unwrap();
    conv.ingest(&[Event::new(2, 2, 0, false)]);
    let frame = conv.current_frame();
    let kernel = Kernel::gaussian(3, 0.8);
    for dy in 0..3 {
        for dx in 0..3 {
            assert!((frame.get(1 + dx, 1 + dy) + kernel.at(dy, dx)).abs() < 1e-12);
        }
    }
    assert_eq!(frame.get(0, 0), 0.0);
    assert!((frame.energy() - 1.0).abs() < 1e-12);
}

#[test]
fn test_out_of_frame_events_are_skipped() {
    let mut conv = ApproximateConvolver::new(&config(4, 4, Strategy::Approximate)).unwrap();
    let report = conv.ingest(&[Event::new(4, 0, 5, true), Event::new(0, 9, 6, true), Event::new(1, 1, 7, true)]);
    assert_eq!(report.applied, 1);
    assert_eq!(report.rejected, 2);
    assert_eq!(conv.stats().rejected(), 2);
    // Rejected events still advance the clock
    assert!((conv.global_time() - 0.007).abs() < 1e-12);
}

// ---------------------------------------------------------------------------
// Threaded pipeline
// ---------------------------------------------------------------------------

#[test]
fn test_pipeline_end_of_stream_yields_final_frame() {
    let events = scattered_events(300, 16, 16);
    let cfg = config(16, 16, Strategy::Approximate).with_fps(200.0);
    let pipeline = Pipeline::start(&cfg, ReplaySource::chunked(&events, 25)).unwrap();
    let summary = pipeline.join().unwrap();

    assert_eq!(summary.stats.events(), 300);
    assert_eq!(summary.stats.batches(), 12);
    assert!(summary.frames_produced >= 1);
    assert_eq!(summary.final_frame.reference_time(), summary.global_time);

    let mut exact = build(&config(16, 16, Strategy::Exact)).unwrap();
    exact.ingest(&events);
    assert!(summary.final_frame.max_abs_diff(&exact.current_frame()) < 1e-9);
}

#[test]
fn test_pipeline_exact_reads_track_ingest() {
    let (tx, rx) = unbounded();
    let pipeline = Pipeline::start(&config(8, 8, Strategy::Exact), ChannelSource::new(rx)).unwrap();
    tx.send(vec![Event::new(4, 4, 1000, true)]).unwrap();
    assert!(wait_for(|| pipeline.current_frame().get(4, 4) > 0.0, Duration::from_secs(5)));
    let frame = pipeline.current_frame();
    assert!((frame.reference_time() - 1.0).abs() < 1e-12);
    assert!(frame.get(4, 4) > 0.0);
    assert_eq!(pipeline.frames_produced(), 0);

    drop(tx);
    let summary = pipeline.join().unwrap();
    assert_eq!(summary.stats.events(), 1);
}

#[test]
fn test_pipeline_stop_is_prompt_and_final() {
    let (tx, rx) = bounded(16);
    let cfg = config(8, 8, Strategy::Approximate).with_fps(100.0);
    let pipeline = Pipeline::start(&cfg, ChannelSource::new(rx)).unwrap();

    tx.send(vec![Event::new(1, 1, 10, true)]).unwrap();
    assert!(wait_for(|| pipeline.frames_produced() >= 1, Duration::from_secs(5)));

    let start = Instant::now();
    pipeline.stop();
    let frames = pipeline.frames_produced();
    assert!(wait_for(|| pipeline.ingest_finished(), Duration::from_secs(2)));

    // The source is still open; nothing sent now may reach a frame.
    let _ = tx.try_send(vec![Event::new(2, 2, 20, true)]);
    thread::sleep(Duration::from_millis(60));
    assert_eq!(pipeline.frames_produced(), frames);

    let summary = pipeline.join().unwrap();
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(summary.stats.events(), 1);
}

#[test]
fn test_pipeline_drop_joins_threads() {
    let (tx, rx) = unbounded::<Vec<Event>>();
    let start = Instant::now();
    {
        let _pipeline = Pipeline::start(&config(4, 4, Strategy::Approximate), ChannelSource::new(rx)).unwrap();
        thread::sleep(Duration::from_millis(10));
    }
    assert!(start.elapsed() < Duration::from_secs(2));
    drop(tx);
}

#[test]
fn test_pipeline_measurements() {
    let (tx, rx) = unbounded();
    let cfg = config(8, 8, Strategy::Exact).with_accuracy_log(true);
    let events = scattered_events(30, 8, 8);
    let pipeline =
        Pipeline::start_with_measurements(&cfg, ReplaySource::chunked(&events, 10), Some(tx)).unwrap();
    pipeline.join().unwrap();

    let measurements: Vec<Measurement> = rx.try_iter().collect();
    let batches = measurements
        .iter()
        .filter(|m| matches!(m, Measurement::BatchLatency { .. }))
        .count();
    let accuracy = measurements
        .iter()
        .filter(|m| matches!(m, Measurement::Accuracy { .. }))
        .count();
    assert_eq!(batches, 3);
    assert_eq!(accuracy, 30);
    assert!(measurements.iter().all(|m| m.as_tuple().0 != 1));
}

// ---------------------------------------------------------------------------
// Event text format
// ---------------------------------------------------------------------------

#[test]
fn test_event_text_roundtrip() {
    let ev: Event = "12 7 4096 -1".parse().unwrap();
    assert_eq!(ev, Event::new(12, 7, 4096, false));
    let back: Event = ev.to_string().parse().unwrap();
    assert_eq!(back, ev);
    assert!("12 7".parse::<Event>().is_err());
}

// ---------------------------------------------------------------------------
// FFI
// ---------------------------------------------------------------------------

#[test]
fn test_ffi_roundtrip() {
    let conv = ffi::econv_create(8, 6, PI, 3, 0.8, 1_000_000, 1e-3, true);
    assert!(!conv.is_null());
    let events = [Event::new(3, 2, 0, true), Event::new(3, 2, 1000, true), Event::new(20, 2, 1000, true)];
    unsafe {
        assert_eq!(ffi::econv_ingest(conv, events.as_ptr(), events.len()), 2);
        assert!((ffi::econv_global_time(conv) - 1.0).abs() < 1e-12);

        let (mut w, mut h) = (0usize, 0usize);
        let data = ffi::econv_get_frame(conv, &mut w, &mut h);
        assert!(!data.is_null());
        assert_eq!((w, h), (8, 6));
        let frame = std::slice::from_raw_parts(data, w * h);
        let center = Kernel::gaussian(3, 0.8).center();
        assert!((frame[2 * w + 3] - center * ((-PI).exp() + 1.0)).abs() < 1e-12);
        ffi::econv_free_frame(data, w * h);
        ffi::econv_destroy(conv);
    }
}

#[test]
fn test_ffi_approximate_handle() {
    let conv = ffi::econv_create(4, 4, 1.0, 1, 1.0, 1000, 1e-3, false);
    assert!(!conv.is_null());
    let ev = Event::new(1, 1, 0, true);
    unsafe {
        assert_eq!(ffi::econv_ingest(conv, &ev, 1), 1);
        let (mut w, mut h) = (0usize, 0usize);
        let data = ffi::econv_get_frame(conv, &mut w, &mut h);
        let frame = std::slice::from_raw_parts(data, w * h);
        assert_eq!(frame[w + 1], 1.0);
        ffi::econv_free_frame(data, w * h);
        ffi::econv_destroy(conv);
    }
}
