//! Host protocol sessions: commands, buffered text, flow control and status

use crate::{echoed_text, key_text, open_session, status_bytes, HOST_CLOSE};
use wk_keyer_core::protocol::{FORCE_KEYDOWN_TIMEOUT_MS, PROTOCOL_REVISION};
use wk_keyer_core::test_utils::simulation::Simulation;
use wk_keyer_core::{KeyerMode, PaddleState, StatusMode};

fn keyer() -> Simulation {
    Simulation::with_mode(KeyerMode::IambicB)
}

#[test]
fn test_host_open_answers_revision() {
    let mut sim = keyer();
    assert_eq!(open_session(&mut sim), Some(PROTOCOL_REVISION));
    assert!(sim.keyer().protocol().is_host_open());

    sim.host_send(&HOST_CLOSE);
    sim.run_for(2);
    assert!(!sim.keyer().protocol().is_host_open());
    assert!(sim.host_received().is_empty());
}

#[test]
fn test_buffered_text_reports_busy() {
    let mut sim = keyer();
    assert_eq!(key_text(&mut sim, b"E"), ".");
    assert_eq!(sim.host_received(), &[0xC4, 0xC0]);
}

#[test]
fn test_buffered_words() {
    let mut sim = keyer();
    assert_eq!(key_text(&mut sim, b"paris e"), ".--. .- .-. .. ... / .");
}

#[test]
fn test_word_space_is_seven_units() {
    let mut sim = keyer();
    key_text(&mut sim, b"E E");
    let unit = sim.unit_ms();
    assert_eq!(sim.outputs().gaps(), vec![7 * unit]);
}

#[test]
fn test_char_space_marker() {
    let mut sim = keyer();
    // '|' adds two units on top of the three after "E"
    key_text(&mut sim, b"E|E");
    let unit = sim.unit_ms();
    assert_eq!(sim.outputs().gaps(), vec![5 * unit]);
}

#[test]
fn test_utf8_letters() {
    let mut sim = keyer();
    assert_eq!(key_text(&mut sim, "Ä".as_bytes()), ".-.-");

    let mut sim = keyer();
    assert_eq!(key_text(&mut sim, "ш".as_bytes()), "----");
}

#[test]
fn test_unsupported_characters_are_skipped() {
    let mut sim = keyer();
    assert_eq!(key_text(&mut sim, b"E#E"), ". .");
}

#[test]
fn test_speed_command() {
    let mut sim = keyer();
    sim.host_send(&[0x02, 30]);
    sim.run_for(2);
    assert_eq!(sim.keyer().engine().timing().wpm, 30);
    assert!(sim.keyer().protocol().speed_from_host());

    key_text(&mut sim, b"T");
    let marks = sim.outputs().marks();
    assert_eq!(marks.len(), 1);
    assert_eq!(marks[0].duration_ms, 120);

    // zero returns control to the speed input
    sim.host_send(&[0x02, 0]);
    sim.run_for(2);
    assert_eq!(sim.keyer().engine().timing().wpm, 20);
    assert!(!sim.keyer().protocol().speed_from_host());
}

#[test]
fn test_weighting_and_ratio_commands() {
    let mut sim = keyer();
    // weighting 60: 72 ms dit mark, 48 ms element space
    sim.host_send(&[0x03, 60]);
    sim.run_for(2);
    key_text(&mut sim, b"EE");
    let marks = sim.outputs().marks();
    assert_eq!(marks[0].duration_ms, 72);

    let mut sim = keyer();
    // ratio 66 is 3.96:1
    sim.host_send(&[0x17, 66]);
    sim.run_for(2);
    key_text(&mut sim, b"T");
    assert_eq!(sim.outputs().marks()[0].duration_ms, 60 * 396 / 100);
}

#[test]
fn test_key_compensation_adds_to_marks() {
    let mut sim = keyer();
    sim.host_send(&[0x11, 8]);
    sim.run_for(2);
    key_text(&mut sim, b"I");
    let marks = sim.outputs().marks();
    assert_eq!(marks[0].duration_ms, 68);
    assert_eq!(marks[1].duration_ms, 68);
}

#[test]
fn test_sidetone_command() {
    let mut sim = keyer();
    sim.host_send(&[0x01, 0x05]);
    sim.run_for(2);
    key_text(&mut sim, b"E");
    assert_eq!(sim.outputs().keyed_tone_hz, 800);
}

#[test]
fn test_pause_and_backspace() {
    let mut sim = keyer();
    sim.host_send(&[0x06, 0x01]);
    sim.run_for(2);
    assert!(sim.keyer().protocol().is_paused());

    sim.host_send(b"AB");
    sim.host_send(&[0x08]);
    sim.run_for(200);
    assert!(sim.outputs().key_events().is_empty());
    assert_eq!(sim.keyer().protocol().text_buffer().length(), 1);

    sim.host_send(&[0x06, 0x00]);
    assert!(sim.run_until_idle(5_000));
    assert_eq!(sim.sent_morse(), ".-");
}

#[test]
fn test_clear_buffer_stops_after_current_element() {
    let mut sim = keyer();
    sim.host_send(b"HHHH");
    sim.run_for(30);
    sim.host_send(&[0x0A]);
    assert!(sim.run_until_idle(5_000));
    assert_eq!(sim.sent_morse(), ".");
    assert_eq!(status_bytes(sim.host_received()), vec![0xC4, 0xC0]);
}

#[test]
fn test_flow_control() {
    let mut sim = keyer();
    sim.host_send(&[0x06, 0x01]);
    sim.run_for(2);

    sim.host_send(&[b'E'; 253]);
    sim.run_for(2);
    assert!(sim.keyer().protocol().is_xoff());
    assert_eq!(sim.take_host_received(), vec![0xC1]);

    // sending keeps the buffer nearly full, so XOFF stays on
    sim.host_send(&[0x06, 0x00]);
    sim.run_for(50);
    assert!(sim.keyer().protocol().is_xoff());
    assert_eq!(sim.take_host_received(), vec![0xC5]);

    sim.host_send(&[0x0A]);
    assert!(sim.run_until_idle(5_000));
    assert!(!sim.keyer().protocol().is_xoff());
    assert_eq!(sim.host_received(), &[0xC0]);
}

#[test]
fn test_paddle_break_in() {
    let mut sim = keyer();
    sim.host_send(b"PARIS");
    sim.run_for(100);
    assert_eq!(sim.take_host_received(), vec![0xC4]);

    sim.hold_after(1, PaddleState::Dit);
    sim.hold_after(100, PaddleState::Free);
    sim.run_for(2);
    assert!(sim.keyer().engine().state().break_in);
    assert!(!sim.outputs().key);
    assert_eq!(sim.host_received(), &[0xC2, 0xC0]);
    assert!(!sim.keyer().protocol().text_buffer().has_more());

    assert!(sim.run_until_idle(5_000));
    assert!(!sim.keyer().engine().state().break_in);
    // the paddle took over after the settle space
    let last = *sim.outputs().marks().last().unwrap();
    assert_eq!(last.duration_ms, sim.unit_ms());
    assert_eq!(sim.host_received(), &[0xC2, 0xC0]);
}

#[test]
fn test_text_after_break_in_is_keyed() {
    let mut sim = keyer();
    sim.host_send(b"PARIS");
    sim.run_for(100);
    sim.hold_after(1, PaddleState::Dit);
    sim.hold_after(20, PaddleState::Free);
    assert!(sim.run_until_idle(5_000));

    let before = sim.outputs().marks().len();
    sim.host_send(b"T");
    assert!(sim.run_until_idle(5_000));
    let marks = sim.outputs().marks();
    assert_eq!(marks.len(), before + 1);
    assert_eq!(marks[before].duration_ms, 3 * sim.unit_ms());
}

#[test]
fn test_key_immediate_status() {
    let mut sim = keyer();
    sim.host_send(&[0x0B, 0x01]);
    sim.run_for(2);
    assert!(sim.outputs().key);
    assert!(sim.outputs().ptt);
    assert_eq!(sim.take_host_received(), vec![0xC8]);

    sim.host_send(&[0x0B, 0x00]);
    sim.run_for(2);
    assert!(!sim.outputs().key);
    assert_eq!(sim.take_host_received(), vec![0xC0]);
}

#[test]
fn test_key_immediate_in_wk1_mode() {
    let mut sim = keyer();
    sim.host_send(&[0x00, 0x0A]);
    sim.run_for(2);
    assert_eq!(sim.keyer().protocol().status_mode(), StatusMode::Wk1);

    sim.host_send(&[0x0B, 0x01]);
    sim.run_for(2);
    assert!(sim.outputs().key);
    assert!(sim.host_received().is_empty());

    sim.host_send(&[0x00, 0x0B, 0x0B, 0x00]);
    sim.run_for(4);
    assert_eq!(sim.keyer().protocol().status_mode(), StatusMode::Wk2);
    assert!(!sim.outputs().key);
}

#[test]
fn test_key_immediate_times_out() {
    let mut sim = keyer();
    sim.host_send(&[0x0B, 0x01]);
    sim.run_for(2);
    assert!(sim.outputs().key);

    sim.run_for(FORCE_KEYDOWN_TIMEOUT_MS);
    assert!(!sim.outputs().key);
    assert!(!sim.keyer().engine().state().force);
    assert_eq!(sim.host_received(), &[0xC8, 0xC0]);
}

#[test]
fn test_paddle_ends_key_immediate() {
    let mut sim = keyer();
    sim.host_send(&[0x0B, 0x01]);
    sim.run_for(2);
    sim.hold_after(1, PaddleState::Dah);
    sim.hold_after(20, PaddleState::Free);
    sim.run_for(2);
    assert!(!sim.keyer().engine().state().force);
    assert!(!sim.outputs().key);
}

#[test]
fn test_pin_config_disables_key_line() {
    let mut sim = keyer();
    // PTT only
    sim.host_send(&[0x09, 0x01]);
    sim.run_for(2);
    key_text(&mut sim, b"E");
    assert!(sim.outputs().key_events().is_empty());
    assert_eq!(sim.outputs().keyed_tone_hz, 0);
    assert_eq!(sim.outputs().ptt_events().len(), 2);
}

#[test]
fn test_ptt_follows_keying() {
    let mut sim = keyer();
    key_text(&mut sim, b"E");
    let ptt = sim.outputs().ptt_events();
    let key = sim.outputs().key_events();
    assert_eq!(ptt.len(), 2);
    assert_eq!(ptt[0].at_ms, key[0].at_ms);
    // PTT drops when the character space ends
    assert_eq!(ptt[1].at_ms - key[0].at_ms, 4 * sim.unit_ms());
}

#[test]
fn test_queries() {
    let mut sim = keyer();
    sim.host_send(&[0x15]);
    sim.run_for(2);
    assert_eq!(sim.take_host_received(), vec![0xC0]);

    sim.host_send(&[0x07]);
    sim.run_for(2);
    assert_eq!(sim.take_host_received(), vec![0x80 | (20 - 5)]);

    sim.host_send(&[0x00, 0x04, 0x5A]);
    sim.run_for(2);
    assert_eq!(sim.take_host_received(), vec![0x5A]);
}

#[test]
fn test_speed_range_changes_report() {
    let mut sim = keyer();
    sim.host_send(&[0x05, 10, 25, 0]);
    sim.run_for(2);
    sim.host_send(&[0x07]);
    sim.run_for(2);
    assert_eq!(sim.take_host_received(), vec![0x80 | (20 - 10)]);
}

#[test]
fn test_serial_echo() {
    let mut sim = keyer();
    sim.host_send(&[0x0E, 0x04]);
    sim.run_for(2);

    sim.host_send(b"AB");
    sim.run_for(1);
    assert_eq!(sim.host_received(), &[b'A', b'B', 0xC4]);
    assert!(sim.run_until_idle(5_000));
    assert_eq!(echoed_text(sim.host_received()), "AB");
}

#[test]
fn test_load_defaults() {
    let mut sim = keyer();
    let defaults = [
        0x0F, // command
        0x10, // mode register: Iambic A
        25,   // speed
        0x04, // sidetone 1000 Hz
        50,   // weighting
        0, 0, // PTT lead and tail
        5, 30, // speed range 5..=35
        0,  // first extension
        0,  // key compensation
        10, // farnsworth
        50, // paddle switchpoint
        50, // ratio 3:1
        0x0F, // pin config
        0xFF, // don't care
    ];
    sim.host_send(&defaults);
    sim.run_for(2);

    let timing = *sim.keyer().engine().timing();
    assert_eq!(timing.wpm, 25);
    assert_eq!(timing.dit_dah_ratio, 300);
    assert_eq!(sim.keyer().engine().state().mode, KeyerMode::IambicA);
    assert_eq!(sim.keyer().engine().tone_hz(), 1000);

    assert_eq!(key_text(&mut sim, b"E"), ".");
    assert_eq!(sim.outputs().marks()[0].duration_ms, 48);
}

#[test]
fn test_reset_command() {
    let mut sim = keyer();
    open_session(&mut sim);
    sim.host_send(&[0x02, 35, 0x0E, 0x20]);
    sim.run_for(4);
    assert_eq!(sim.keyer().engine().state().mode, KeyerMode::Ultimatic);

    sim.host_send(&[0x00, 0x01]);
    sim.run_for(2);
    assert_eq!(sim.keyer().engine().timing().wpm, 20);
    assert_eq!(sim.keyer().engine().state().mode, KeyerMode::IambicB);
    assert!(!sim.keyer().protocol().is_host_open());
}

#[test]
fn test_unknown_admin_command_is_ignored() {
    let mut sim = keyer();
    sim.host_send(&[0x00, 0x7F, b'E']);
    assert!(sim.run_until_idle(2_000));
    assert_eq!(sim.sent_morse(), ".");
}
