//! Squeeze behavior of the three keyer modes, observed on the key line

use rstest::rstest;
use wk_keyer_core::test_utils::paddle_simulator::PaddlePattern;
use wk_keyer_core::test_utils::simulation::Simulation;
use wk_keyer_core::test_utils::test_scenarios::mode_comparison_scenarios;
use wk_keyer_core::{KeyerMode, PaddleState};

fn squeeze(mode: KeyerMode, units: u32) -> String {
    let mut sim = Simulation::with_mode(mode);
    let unit = sim.unit_ms();
    sim.play(&PaddlePattern::squeeze(units * unit));
    assert!(sim.run_until_idle(10_000), "keyer never went idle");
    sim.sent_morse()
}

#[rstest]
#[case::iambic_a_short(KeyerMode::IambicA, 5, ".-")]
#[case::iambic_b_short(KeyerMode::IambicB, 5, ".-.")]
#[case::ultimatic_short(KeyerMode::Ultimatic, 5, ".-")]
#[case::iambic_a_long(KeyerMode::IambicA, 10, ".-.-")]
#[case::iambic_b_long(KeyerMode::IambicB, 10, ".-.-.")]
#[case::ultimatic_long(KeyerMode::Ultimatic, 10, ".---")]
fn test_squeeze_by_mode(#[case] mode: KeyerMode, #[case] units: u32, #[case] expected: &str) {
    assert_eq!(squeeze(mode, units), expected);
}

#[rstest]
#[case(KeyerMode::IambicA, ".")]
#[case(KeyerMode::IambicB, ".-")]
fn test_dah_tap_during_dit(#[case] mode: KeyerMode, #[case] expected: &str) {
    let mut sim = Simulation::with_mode(mode);
    // Dah closed for 20 ms while the dit mark plays
    sim.play(&PaddlePattern::sequence(
        &[
            (PaddleState::Dit, 20),
            (PaddleState::Squeeze, 20),
            (PaddleState::Dit, 10),
        ],
        "Dah tap",
    ));
    assert!(sim.run_until_idle(5_000));
    assert_eq!(sim.sent_morse(), expected);
}

#[rstest]
#[case(KeyerMode::IambicA)]
#[case(KeyerMode::IambicB)]
#[case(KeyerMode::Ultimatic)]
fn test_single_paddle_repeats(#[case] mode: KeyerMode) {
    let mut sim = Simulation::with_mode(mode);
    let unit = sim.unit_ms();
    sim.play(&PaddlePattern::dit(5 * unit));
    assert!(sim.run_until_idle(5_000));
    assert_eq!(sim.sent_morse(), "...");

    let mut sim = Simulation::with_mode(mode);
    sim.play(&PaddlePattern::dah(5 * unit));
    assert!(sim.run_until_idle(5_000));
    assert_eq!(sim.sent_morse(), "--");
}

#[test]
fn test_simultaneous_closure_starts_with_dah() {
    for mode in [KeyerMode::IambicA, KeyerMode::IambicB, KeyerMode::Ultimatic] {
        let mut sim = Simulation::with_mode(mode);
        let unit = sim.unit_ms();
        sim.play(&PaddlePattern::hold(PaddleState::Squeeze, unit));
        assert!(sim.run_until_idle(5_000));
        assert!(sim.sent_morse().starts_with('-'), "{:?}: {}", mode, sim.sent_morse());
    }
}

#[test]
fn test_mode_comparison_squeeze() {
    let unit = 60;
    let sent: Vec<(KeyerMode, String)> = mode_comparison_scenarios(unit)
        .into_iter()
        .map(|(mode, pattern)| {
            let mut sim = Simulation::with_mode(mode);
            sim.play(&pattern);
            assert!(sim.run_until_idle(10_000));
            (mode, sim.sent_morse())
        })
        .collect();

    // only Iambic B keys the element latched before release
    let iambic_a = &sent[0].1;
    let iambic_b = &sent[1].1;
    assert_eq!(iambic_b.len(), iambic_a.len() + 1);
    assert_eq!(sent[2].1, ".-");
}
