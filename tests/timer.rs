use pc8086_rs::pit::{AccessMode, Channel, Pit, PORT_CONTROL};
use pretty_assertions::assert_eq;

const CH0: u16 = 0x40;

fn program(pit: &mut Pit, mode: u8, count: u16) {
    pit.write(PORT_CONTROL, 0x30 | (mode << 1)); // ch0, lo/hi
    pit.write(CH0, count as u8);
    pit.write(CH0, (count >> 8) as u8);
}

/// Output level after each of `n` ticks.
fn trace(pit: &mut Pit, n: usize) -> Vec<bool> {
    (0..n)
        .map(|_| {
            pit.tick();
            pit.output(0)
        })
        .collect()
}

#[test]
fn mode0_single_rising_edge_at_terminal_count() {
    for n in [1u16, 2, 5, 100] {
        let mut pit = Pit::new();
        program(&mut pit, 0, n);
        assert!(!pit.output(0));
        let outs = trace(&mut pit, n as usize + 1);
        let edges: Vec<usize> = outs
            .windows(2)
            .enumerate()
            .filter(|(_, w)| !w[0] && w[1])
            .map(|(i, _)| i + 2)
            .collect();
        assert_eq!(edges, vec![n as usize + 1], "count {n}");
        assert_eq!(pit.channels[0].count(), 0);
    }
}

#[test]
fn mode3_odd_count_square_wave() {
    let mut pit = Pit::new();
    program(&mut pit, 3, 9);
    pit.tick(); // load
    let outs = trace(&mut pit, 9);
    assert_eq!(
        outs,
        vec![true, true, true, true, false, false, false, false, true]
    );
}

#[test]
fn mode3_even_count_is_symmetric() {
    let mut pit = Pit::new();
    program(&mut pit, 3, 6);
    pit.tick();
    let outs = trace(&mut pit, 12);
    let highs = outs.iter().filter(|o| **o).count();
    assert_eq!(highs, 6);
    assert_eq!(&outs[..3], &[true, true, false]);
}

#[test]
fn modes_6_and_7_alias_2_and_3() {
    let mut pit = Pit::new();
    pit.write(PORT_CONTROL, 0x30 | (6 << 1));
    assert_eq!(pit.channels[0].mode(), 2);
    pit.write(PORT_CONTROL, 0x30 | (7 << 1));
    assert_eq!(pit.channels[0].mode(), 3);
}

#[test]
fn latch_command_through_control_port() {
    let mut pit = Pit::new();
    program(&mut pit, 2, 1000);
    pit.tick();
    pit.tick();
    pit.write(PORT_CONTROL, 0x00); // latch ch0
    pit.tick();
    let lo = pit.read(CH0);
    let hi = pit.read(CH0);
    assert_eq!(u16::from_le_bytes([lo, hi]), 999);
}

#[test]
fn alias_ports_reach_the_same_channel() {
    let mut pit = Pit::new();
    pit.write(0x53, 0x14); // ch0, lsb only, mode 2
    pit.write(0x50, 50);
    pit.tick();
    assert_eq!(pit.read(0x40), 50);
    assert_eq!(pit.channels[0].mode(), 2);
}

fn channel(mode: u8, count: u16, gate: bool) -> Channel {
    let mut ch = Channel::new(gate);
    ch.set_access_mode(AccessMode::LowHigh);
    ch.set_timer_mode(mode);
    ch.write_byte(count as u8);
    ch.write_byte((count >> 8) as u8);
    ch
}

fn outputs(ch: &mut Channel, n: usize) -> Vec<bool> {
    (0..n)
        .map(|_| {
            ch.tick();
            ch.output()
        })
        .collect()
}

#[test]
fn mode1_retriggers_on_rising_gate() {
    let mut ch = channel(1, 3, false);
    ch.set_gate(true);
    assert_eq!(outputs(&mut ch, 3), vec![false, false, false]);
    assert_eq!(ch.count(), 1);
    ch.set_gate(false);
    ch.set_gate(true);
    assert_eq!(outputs(&mut ch, 5), vec![false, false, false, true, true]);
}

#[test]
fn mode2_gate_low_pauses_and_forces_high() {
    let mut ch = channel(2, 4, true);
    ch.tick(); // load
    assert_eq!(outputs(&mut ch, 3), vec![true, true, false]);
    ch.set_gate(false);
    assert!(ch.output());
    assert_eq!(outputs(&mut ch, 3), vec![true, true, true]);
    assert_eq!(ch.count(), 1);
    ch.set_gate(true);
    ch.tick();
    assert_eq!(ch.count(), 4);
    assert_eq!(outputs(&mut ch, 3), vec![true, true, false]);
}

#[test]
fn mode3_gate_rise_reloads() {
    let mut ch = channel(3, 6, true);
    ch.tick(); // load
    ch.tick();
    assert_eq!(ch.count(), 4);
    ch.set_gate(false);
    assert_eq!(outputs(&mut ch, 2), vec![true, true]);
    assert_eq!(ch.count(), 4);
    ch.set_gate(true);
    ch.tick();
    assert_eq!(ch.count(), 6);
    assert_eq!(outputs(&mut ch, 3), vec![true, true, false]);
}

#[test]
fn mode5_waits_for_gate_edge() {
    let mut ch = channel(5, 3, false);
    assert_eq!(outputs(&mut ch, 3), vec![true; 3]);
    ch.set_gate(true);
    assert_eq!(outputs(&mut ch, 6), vec![true, true, true, false, true, true]);

    // a new count does nothing until the next edge
    ch.write_byte(2);
    ch.write_byte(0);
    assert_eq!(outputs(&mut ch, 3), vec![true; 3]);
    assert_eq!(ch.count(), 0xFFFB);
    ch.set_gate(false);
    ch.set_gate(true);
    assert_eq!(outputs(&mut ch, 3), vec![true, true, false]);
}
