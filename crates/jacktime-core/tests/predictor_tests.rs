use jacktime_core::{
    BeatPredictor, BeatWindow, FpbBound, PositionBits, RefinementMode, SyncError,
    TransportSnapshot, MAX_BEAT_GAP,
};

fn snapshot(frame: u64, beat_number: i64, bpm: f64) -> TransportSnapshot {
    TransportSnapshot {
        frame,
        frame_rate: 48_000,
        bar: ((beat_number - 1) / 4 + 1) as i32,
        beat: ((beat_number - 1) % 4 + 1) as i32,
        tick: 0.0,
        beats_per_bar: 4.0,
        beat_type: 4.0,
        ticks_per_beat: 1920.0,
        beats_per_minute: bpm,
        valid: PositionBits::BBT,
    }
}

fn engine_at_120() -> BeatPredictor {
    BeatPredictor::initialize(&snapshot(0, 1, 120.0), 512, RefinementMode::SinglePass).unwrap()
}

#[test]
fn test_reference_scenario() {
    let mut engine = engine_at_120();
    assert_eq!(
        engine.current_segment().bound,
        FpbBound {
            low: 23_488.0,
            high: 24_512.0
        }
    );

    engine.record_beat(&snapshot(24_000, 2, 120.0), 512).unwrap();
    assert_eq!(
        engine.record(2).unwrap().window,
        BeatWindow {
            start_frame: 24_000,
            end_frame: 24_512
        }
    );
    assert_eq!(engine.current_segment().bound.low, 23_488.0);
    assert_eq!(engine.current_segment().bound.high, 24_512.0);

    // Beat 3 far later than the bound allows
    let before = engine.current_segment().bound;
    engine.record_beat(&snapshot(60_000, 3, 120.0), 512).unwrap();
    let after = engine.current_segment().bound;
    assert!(after.low > before.low);
    assert!(after.low <= after.high);
    assert!(after.width() <= before.width());
}

#[test]
fn test_tempo_change_opens_segment_after_current_beat() {
    let mut engine = engine_at_120();
    for beat in 2..=4 {
        engine.record_beat(&snapshot((beat as u64 - 1) * 24_000, beat, 120.0), 512).unwrap();
    }
    let old_bound = engine.current_segment().bound;

    let id = engine
        .record_tempo_change(&snapshot(72_000, 4, 60.0))
        .unwrap();
    assert_eq!(id, 1);
    assert_eq!(engine.current_segment_id(), 1);

    let old = engine.segment(0).unwrap();
    assert_eq!(old.end_beat, Some(5));
    assert_eq!(old.bound, old_bound);

    let new = engine.segment(1).unwrap();
    assert_eq!(new.start_beat, 5);
    assert!(new.is_open());
    assert_eq!(new.bound, FpbBound::around(48_000.0, 512));

    // Beats recorded before the change keep their segment
    for beat in 1..=4 {
        assert_eq!(engine.record(beat).unwrap().segment, 0);
    }

    engine.record_beat(&snapshot(72_000 + 48_000, 5, 60.0), 512).unwrap();
    assert_eq!(engine.record(5).unwrap().segment, 1);
    assert_eq!(engine.segment_for_beat(4), Some(0));
    assert_eq!(engine.segment_for_beat(5), Some(1));
}

#[test]
fn test_prediction_uses_new_tempo_after_change() {
    let mut engine = engine_at_120();
    engine.record_beat(&snapshot(24_000, 2, 120.0), 512).unwrap();
    engine.record_tempo_change(&snapshot(24_000, 2, 60.0)).unwrap();

    // Beat 2 landed within the block before its window, centred on 23744
    assert_eq!(engine.predict_beat_frame(3), Ok(Some(23_744 + 48_000)));
    assert_eq!(engine.predict_beat_frame(4), Ok(Some(23_744 + 96_000)));
    // Earlier beats still use the old segment
    assert_eq!(engine.predict_beat_frame(2), Ok(Some(23_744)));
}

#[test]
fn test_repeated_tempo_change_reseeds_empty_segment() {
    let mut engine = engine_at_120();
    engine.record_tempo_change(&snapshot(100, 1, 90.0)).unwrap();
    engine.record_tempo_change(&snapshot(200, 1, 60.0)).unwrap();

    assert_eq!(engine.segments().len(), 2);
    assert_eq!(engine.current_segment().start_beat, 2);
    assert_eq!(engine.current_segment().bpm, 60.0);
    assert_eq!(
        engine.current_segment().bound,
        FpbBound::around(48_000.0, 512)
    );
}

#[test]
fn test_reposition_never_touches_records() {
    let mut engine = engine_at_120();
    for beat in 2..=8 {
        engine.record_beat(&snapshot((beat as u64 - 1) * 24_000, beat, 120.0), 512).unwrap();
    }
    engine.record_tempo_change(&snapshot(7 * 24_000, 8, 90.0)).unwrap();
    let records: Vec<_> = (1..=20).map(|beat| engine.record(beat).copied()).collect();
    let recorded = engine.recorded_beats();

    assert_eq!(engine.reposition(&snapshot(24_000 * 2, 3, 120.0)), 0);
    assert_eq!(engine.reposition(&snapshot(2_000_000, 40, 90.0)), 1);

    let after: Vec<_> = (1..=20).map(|beat| engine.record(beat).copied()).collect();
    assert_eq!(records, after);
    assert_eq!(engine.recorded_beats(), recorded);
}

#[test]
fn test_tempo_change_after_jump_back_splits_inner_segment() {
    let mut engine = engine_at_120();
    for beat in 2..=8 {
        engine.record_beat(&snapshot((beat as u64 - 1) * 24_000, beat, 120.0), 512).unwrap();
    }
    engine.record_tempo_change(&snapshot(7 * 24_000, 8, 90.0)).unwrap();

    engine.reposition(&snapshot(24_000 * 2, 3, 120.0));
    engine.record_beat(&snapshot(24_000 * 3, 4, 120.0), 512).unwrap();
    let id = engine
        .record_tempo_change(&snapshot(24_000 * 3, 4, 100.0))
        .unwrap();

    let split = engine.segment(id).unwrap();
    assert_eq!(split.start_beat, 5);
    assert_eq!(split.end_beat, Some(9));
    assert_eq!(engine.segment(0).unwrap().end_beat, Some(5));

    for beat in 1..60 {
        let covering = engine
            .segments()
            .iter()
            .filter(|segment| segment.contains(beat))
            .count();
        assert_eq!(covering, 1, "beat {beat} covered {covering} times");
    }
}

#[test]
fn test_block_length_only_affects_new_windows() {
    let mut engine = engine_at_120();
    engine.record_beat(&snapshot(24_000, 2, 120.0), 512).unwrap();
    engine.set_block_length(128).unwrap();
    engine.record_beat(&snapshot(48_000, 3, 120.0), 128).unwrap();

    assert_eq!(engine.record(1).unwrap().window.width(), 512);
    assert_eq!(engine.record(2).unwrap().window.width(), 512);
    assert_eq!(engine.record(3).unwrap().window.width(), 128);
    assert_eq!(
        engine.set_block_length(0),
        Err(SyncError::InvalidBlockLength(0))
    );
}

#[test]
fn test_zero_cycle_length_uses_block_length() {
    let mut engine = engine_at_120();
    engine.record_beat(&snapshot(24_000, 2, 120.0), 0).unwrap();
    assert_eq!(engine.record(2).unwrap().window.width(), 512);
}

#[test]
fn test_multi_pass_matches_single_pass_bound() {
    let mut single = engine_at_120();
    let mut multi =
        BeatPredictor::initialize(&snapshot(0, 1, 120.0), 512, RefinementMode::MultiPass)
            .unwrap();

    let frames = [24_064, 48_128, 72_192, 96_256, 120_320];
    for (i, frame) in frames.iter().enumerate() {
        let beat = i as i64 + 2;
        single.record_beat(&snapshot(*frame, beat, 120.0), 512).unwrap();
        multi.record_beat(&snapshot(*frame, beat, 120.0), 512).unwrap();
    }

    assert_eq!(single.current_segment().bound, multi.current_segment().bound);
    assert!(single.record(3).unwrap().checked);
    assert!(!multi.record(3).unwrap().checked);
}

#[test]
fn test_tempo_change_on_unobserved_beat_uses_tick_offset() {
    let mut engine = engine_at_120();
    // Playhead a quarter into beat 41 at 60 BPM
    let mut jumped = snapshot(1_932_000, 41, 60.0);
    jumped.tick = 480.0;
    engine.reposition(&jumped);
    let id = engine.record_tempo_change(&jumped).unwrap();

    let segment = engine.segment(id).unwrap();
    assert_eq!(segment.start_beat, 42);
    assert_eq!(segment.origin.beat, 41);
    assert_eq!(segment.origin.frame, 1_920_000.0);
    assert_eq!(engine.predict_beat_frame(42), Ok(Some(1_968_000)));
}

#[test]
fn test_far_beat_is_rejected_without_growing_arena() {
    let mut engine = engine_at_120();
    let mut corrupt = snapshot(24_000, 2, 120.0);
    corrupt.bar = 1_000_000_000;

    let result = engine.record_beat(&corrupt, 512);
    assert!(matches!(
        result,
        Err(SyncError::BeatOutOfRange { max_gap: MAX_BEAT_GAP, .. })
    ));
    assert_eq!(engine.recorded_beats(), 1);
    assert!(engine.record(corrupt.beat_number()).is_none());

    // A long but plausible jump forward still records
    let far = MAX_BEAT_GAP - 1;
    engine
        .record_beat(&snapshot(far as u64 * 24_000, far, 120.0), 512)
        .unwrap();
    assert!(engine.record(far).is_some());
}
