//! Element timing measured on the key line

use crate::{key_text, simulation};
use proptest::prelude::*;
use rstest::rstest;
use wk_keyer_core::test_utils::paddle_simulator::PaddlePattern;
use wk_keyer_core::test_utils::simulation::Simulation;
use wk_keyer_core::{Element, KeyerMode, PaddleState, TimingParameters};

/// Marks in "PARIS"
const PARIS_MARKS: usize = 14;

#[rstest]
#[case(5)]
#[case(13)]
#[case(20)]
#[case(35)]
#[case(60)]
#[case(99)]
fn test_paris_is_fifty_units(#[case] wpm: u8) {
    let mut sim = simulation(KeyerMode::IambicB, wpm);
    let unit = TimingParameters::unit_for_wpm(wpm);
    assert_eq!(sim.unit_ms(), unit);

    key_text(&mut sim, b"PARIS PARIS");
    let marks = sim.outputs().marks();
    assert_eq!(marks.len(), 2 * PARIS_MARKS);
    assert_eq!(marks[PARIS_MARKS].start_ms - marks[0].start_ms, 50 * unit);

    let analysis = sim.outputs().analyze_timing(unit);
    assert_eq!(analysis.dit_accuracy(), 0.0);
    assert_eq!(analysis.dah_accuracy(), 0.0);
    assert_eq!(analysis.spacing_accuracy(), 0.0);
}

#[test]
fn test_paddle_timing_matches_buffer_timing() {
    let mut sim = simulation(KeyerMode::IambicB, 20);
    let unit = sim.unit_ms();
    sim.play(&PaddlePattern::squeeze(20 * unit));
    assert!(sim.run_until_idle(10_000));

    let analysis = sim.outputs().analyze_timing(unit);
    assert!(!analysis.dit_durations.is_empty());
    assert!(!analysis.dah_durations.is_empty());
    assert_eq!(analysis.dit_accuracy(), 0.0);
    assert_eq!(analysis.dah_accuracy(), 0.0);
    assert_eq!(analysis.spacing_accuracy(), 0.0);
}

#[rstest]
#[case(2)]
#[case(5)]
#[case(7)]
fn test_coarse_ticks_stay_within_one_tick(#[case] step_ms: u32) {
    let mut sim = Simulation::with_mode(KeyerMode::IambicB);
    let unit = sim.unit_ms();
    sim.host_send(b"TEST");
    for _ in 0..(4_000 / step_ms) {
        sim.step_by(step_ms);
    }
    assert!(sim.is_idle());
    assert_eq!(sim.sent_morse(), "- . ... -");

    for mark in sim.outputs().marks() {
        let nominal = if mark.duration_ms >= 2 * unit { 3 * unit } else { unit };
        assert!(
            mark.duration_ms >= nominal && mark.duration_ms < nominal + step_ms,
            "mark of {} ms at {} ms steps",
            mark.duration_ms,
            step_ms
        );
    }
}

#[test]
fn test_stalled_clock_does_not_advance_timers() {
    let mut sim = Simulation::with_mode(KeyerMode::IambicB);
    sim.host_send(b"T");
    sim.step();
    let before = sim.keyer().engine().timers();
    for _ in 0..10 {
        sim.step_by(0);
    }
    assert_eq!(sim.keyer().engine().timers(), before);
    assert!(sim.outputs().key);
}

/// One scripted stimulus: new paddle contacts or a host message
#[derive(Clone, Debug)]
enum Stimulus {
    Paddles(PaddleState),
    Host(&'static [u8]),
}

/// Text, force keydown on/off, clear, pause on/off, mode changes and a speed change
const HOST_MESSAGES: &[&[u8]] = &[
    b"E",
    b"TM",
    b"5 ",
    b"|",
    &[0x0B, 1],
    &[0x0B, 0],
    &[0x0A],
    &[0x06, 1],
    &[0x06, 0],
    &[0x0E, 0x10],
    &[0x0E, 0x20],
    &[0x0E, 0x02],
    &[0x02, 40],
];

fn stimulus() -> impl Strategy<Value = Stimulus> {
    prop_oneof![
        prop::sample::select(vec![
            PaddleState::Free,
            PaddleState::Dit,
            PaddleState::Dah,
            PaddleState::Squeeze,
        ])
        .prop_map(Stimulus::Paddles),
        prop::sample::select(HOST_MESSAGES.to_vec()).prop_map(Stimulus::Host),
    ]
}

/// Ready exactly when no timer runs and no element is in progress
fn check_ready_invariant(sim: &Simulation) -> Result<(), TestCaseError> {
    let engine = sim.keyer().engine();
    let (on, off) = engine.timers();
    prop_assert!(on == 0 || off == 0, "mark and space overlap at {} ms", sim.now_ms());
    let quiet = on == 0 && off == 0 && engine.current_element() == Element::None;
    prop_assert_eq!(
        engine.state().is_ready(),
        quiet,
        "at {} ms: timers ({}, {}), element {:?}",
        sim.now_ms(),
        on,
        off,
        engine.current_element()
    );
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_ready_iff_no_timer_and_no_element(
        script in prop::collection::vec((stimulus(), 0u32..400), 1..24)
    ) {
        let mut sim = Simulation::with_mode(KeyerMode::IambicB);
        check_ready_invariant(&sim)?;
        for (stimulus, hold_ms) in script {
            match stimulus {
                Stimulus::Paddles(contacts) => sim.hold_after(1, contacts),
                Stimulus::Host(bytes) => sim.host_send(bytes),
            }
            for _ in 0..hold_ms {
                sim.step();
                check_ready_invariant(&sim)?;
            }
        }
        sim.hold_after(1, PaddleState::Free);
        sim.host_send(&[0x0B, 0, 0x06, 0]);
        for _ in 0..3_000 {
            sim.step();
            check_ready_invariant(&sim)?;
        }
    }

    #[test]
    fn prop_marks_follow_speed(wpm in 5u8..=99) {
        let mut sim = simulation(KeyerMode::IambicB, wpm);
        let unit = TimingParameters::unit_for_wpm(wpm);
        key_text(&mut sim, b"A");
        let marks = sim.outputs().marks();
        prop_assert_eq!(marks.len(), 2);
        prop_assert_eq!(marks[0].duration_ms, unit);
        prop_assert_eq!(marks[1].duration_ms, 3 * unit);
        prop_assert_eq!(marks[1].start_ms - marks[0].end_ms(), unit);
    }

    #[test]
    fn prop_weighting_keeps_element_period(weighting in 10u8..=90) {
        let mut sim = simulation(KeyerMode::IambicB, 20);
        sim.host_send(&[0x03, weighting]);
        sim.run_for(2);
        key_text(&mut sim, b"II");
        let marks = sim.outputs().marks();
        prop_assert_eq!(marks.len(), 4);
        // mark plus element space is always two units
        prop_assert_eq!(marks[1].start_ms - marks[0].start_ms, 120);
        prop_assert_eq!(marks[0].duration_ms, 60 * weighting as u32 / 50);
    }
}
