use adstack::{
    AdStack, Complex8, Complex16, Kind, Location, TapeCreateInfo, TapeError,
};
use proptest::prelude::*;

fn tape(block_size: usize, buffer_capacity: usize) -> AdStack {
    AdStack::new(TapeCreateInfo {
        block_size: Some(block_size),
        buffer_capacity: Some(buffer_capacity),
    })
    .unwrap()
}

fn all_indices(tape: &AdStack) -> Vec<usize> {
    Kind::ALL.iter().map(|&kind| tape.buffer_index(kind)).collect()
}

/// Raw bytes of the main stack in `start..start + len`.
fn bytes_at(tape: &mut AdStack, start: usize, len: usize) -> Vec<u8> {
    let saved = tape.location();
    tape.set_location(Location(start + len)).unwrap();
    let mut out = vec![0u8; len];
    tape.pop_n_array(&mut out, false).unwrap();
    tape.set_location(saved).unwrap();
    out
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    I4(i32),
    I8(i64),
    R4(f32),
    R8(f64),
    C8(Complex8),
    C16(Complex16),
    Char(u8),
    Bit(bool),
    Ptr(usize),
    Control(u32, u32),
    Bytes(Vec<u8>),
}

impl Value {
    fn push(&self, tape: &mut AdStack) {
        match self {
            Value::I4(v) => tape.push(*v),
            Value::I8(v) => tape.push(*v),
            Value::R4(v) => tape.push(*v),
            Value::R8(v) => tape.push(*v),
            Value::C8(v) => tape.push(*v),
            Value::C16(v) => tape.push(*v),
            Value::Char(v) => tape.push(*v),
            Value::Bit(v) => tape.push_bit(*v),
            Value::Ptr(v) => tape.push(*v),
            Value::Control(v, bits) => tape.push_control(*v, *bits),
            Value::Bytes(v) => tape.push_n_array(v, true),
        }
        .unwrap()
    }

    fn pop_like(&self, tape: &mut AdStack) -> Value {
        match self {
            Value::I4(_) => Value::I4(tape.pop().unwrap()),
            Value::I8(_) => Value::I8(tape.pop().unwrap()),
            Value::R4(_) => Value::R4(tape.pop().unwrap()),
            Value::R8(_) => Value::R8(tape.pop().unwrap()),
            Value::C8(_) => Value::C8(tape.pop().unwrap()),
            Value::C16(_) => Value::C16(tape.pop().unwrap()),
            Value::Char(_) => Value::Char(tape.pop().unwrap()),
            Value::Bit(_) => Value::Bit(tape.pop_bit().unwrap()),
            Value::Ptr(_) => Value::Ptr(tape.pop().unwrap()),
            Value::Control(_, bits) => {
                Value::Control(tape.pop_control(*bits).unwrap(), *bits)
            }
            Value::Bytes(v) => {
                let mut out = vec![0u8; v.len()];
                tape.pop_n_array(&mut out, true).unwrap();
                Value::Bytes(out)
            }
        }
    }
}

fn value() -> impl Strategy<Value = Value> {
    // finite floats only, so equality is bit-for-bit
    prop_oneof![
        any::<i32>().prop_map(Value::I4),
        any::<i64>().prop_map(Value::I8),
        (-1.0e6f32..1.0e6).prop_map(Value::R4),
        (-1.0e12f64..1.0e12).prop_map(Value::R8),
        (-1.0e3f32..1.0e3, -1.0e3f32..1.0e3)
            .prop_map(|(re, im)| Value::C8(Complex8::new(re, im))),
        (-1.0e3f64..1.0e3, -1.0e3f64..1.0e3)
            .prop_map(|(re, im)| Value::C16(Complex16::new(re, im))),
        any::<u8>().prop_map(Value::Char),
        any::<bool>().prop_map(Value::Bit),
        any::<usize>().prop_map(Value::Ptr),
        (1u32..=8)
            .prop_flat_map(|bits| (0..(1u32 << bits), Just(bits)))
            .prop_map(|(v, bits)| Value::Control(v, bits)),
        prop::collection::vec(any::<u8>(), 0..100).prop_map(Value::Bytes),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn any_push_sequence_pops_back_in_reverse(
        values in prop::collection::vec(value(), 0..300),
        block_size in 16usize..256,
        capacity in 1usize..16,
    ) {
        let mut tape = tape(block_size, capacity);
        for v in &values {
            v.push(&mut tape);
        }
        for v in values.iter().rev() {
            prop_assert_eq!(&v.pop_like(&mut tape), v);
        }
        prop_assert_eq!(tape.location(), Location::START);
        prop_assert!(all_indices(&tape).iter().all(|&i| i == 0));
    }

    #[test]
    fn single_push_allocates_one_block_per_started_block(
        block_size in 8usize..128,
        k in 0usize..6,
        r in 1usize..128,
    ) {
        let r = r % block_size;
        prop_assume!(r > 0);
        let mut tape = tape(block_size, 4);
        let len = k * block_size + r;
        tape.push_n_array(&vec![0xa5; len], true).unwrap();
        prop_assert_eq!(tape.peak_blocks(), k + 1);
        prop_assert_eq!(tape.location(), Location(len));
    }
}

#[test]
fn block_growth_for_a_default_sized_tape() {
    let mut tape = AdStack::new(TapeCreateInfo::default()).unwrap();
    let block_size = tape.settings().block_size;
    let len = 2 * block_size + 100;
    tape.push_n_array(&vec![7; len], true).unwrap();
    assert_eq!(tape.peak_blocks(), 3);
    assert_eq!(tape.current_blocks(), 3);
    assert_eq!(tape.location(), Location(len));
    assert_eq!(
        tape.location().display(block_size).to_string(),
        "2.00100"
    );
}

#[test]
fn buffer_flushes_once_per_capacity() {
    let capacity = 8;
    let mut tape = tape(1024, capacity);
    for v in 0..capacity as i64 + 1 {
        tape.push(v).unwrap();
    }
    assert_eq!(tape.location(), Location(capacity * 8), "one bulk flush");
    assert_eq!(tape.buffer_index(Kind::Integer8), 1);

    let popped: Vec<i64> = (0..capacity + 1)
        .map(|_| tape.pop::<i64>().unwrap())
        .collect();
    let expected: Vec<i64> = (0..capacity as i64 + 1).rev().collect();
    assert_eq!(popped, expected);
    assert_eq!(tape.location(), Location::START);
}

#[test]
fn checkpoint_around_a_write_matches_writing_it_directly() {
    let written: Vec<u8> = (0..150).collect();

    let mut direct = tape(64, 4);
    direct.push_n_array(&[1, 2, 3], true).unwrap();
    direct.push_n_array(&written, true).unwrap();

    let mut checkpointed = tape(64, 4);
    checkpointed.push_n_array(&[1, 2, 3], true).unwrap();
    checkpointed.start_repeat().unwrap();
    checkpointed.push_n_array(&written, true).unwrap();
    checkpointed.end_repeat().unwrap();

    assert_eq!(checkpointed.location(), direct.location());
    assert_eq!(
        bytes_at(&mut checkpointed, 3, written.len()),
        bytes_at(&mut direct, 3, written.len())
    );
}

#[test]
fn checkpoint_over_buffered_values_closes_back_at_resume() {
    let mut tape = tape(64, 4);
    tape.push(5i32).unwrap();
    tape.push_n_array(&[1, 2, 3], true).unwrap();
    let resume = tape.location();

    tape.start_repeat().unwrap();
    let free_push = tape.stack().active_repeat().unwrap().free_push;
    assert_eq!(free_push, Location(resume.bytes() + 4), "saved i32 buffer");
    tape.push_n_array(&[9; 10], true).unwrap();
    assert_eq!(tape.location(), Location(free_push.bytes() + 10));
    tape.end_repeat().unwrap();

    assert_eq!(tape.location(), resume, "open redirect rewinds to back pop");
    let mut below = [0u8; 3];
    tape.pop_n_array(&mut below, true).unwrap();
    assert_eq!(below, [1, 2, 3]);
    assert_eq!(tape.pop::<i32>().unwrap(), 5);
}

#[test]
fn reset_discards_the_abandoned_replay() {
    let mut tape = tape(64, 4);
    tape.push_n_array(&[1, 2, 3], true).unwrap();
    let resume = tape.location();
    let indices = all_indices(&tape);

    tape.start_repeat().unwrap();
    tape.push_n_array(&[0xee; 20], true).unwrap();
    tape.push(11i32).unwrap();
    tape.push_bit(true).unwrap();
    tape.reset_repeat().unwrap();
    assert_eq!(all_indices(&tape), indices, "indices back to start_repeat");
    assert_eq!(tape.location(), resume);

    tape.push_n_array(&[0x22; 20], true).unwrap();
    tape.end_repeat().unwrap();

    assert_eq!(bytes_at(&mut tape, 3, 20), vec![0x22; 20]);
    let mut out = [0u8; 20];
    tape.pop_n_array(&mut out, true).unwrap();
    assert_eq!(out, [0x22; 20], "second write survives, first is gone");
    let mut below = [0u8; 3];
    tape.pop_n_array(&mut below, true).unwrap();
    assert_eq!(below, [1, 2, 3]);
}

#[test]
fn pushes_below_free_push_land_after_it_and_pops_come_back() {
    let mut tape = tape(32, 4);
    tape.push_n_array(&[1; 10], true).unwrap();
    tape.push(5i32).unwrap();
    tape.start_repeat().unwrap();
    let cell = *tape.stack().active_repeat().unwrap();
    assert_eq!(cell.free_push, Location(14), "saved i32 buffer is protected");

    // consume below resume, as a replay does
    let mut consumed = [0u8; 10];
    tape.pop_n_array(&mut consumed, true).unwrap();
    assert_eq!(tape.location(), Location::START);

    tape.push_n_array(&[9; 40], true).unwrap();
    let cell = *tape.stack().active_repeat().unwrap();
    assert_eq!(cell.back_pop, Some(Location::START));
    assert_eq!(tape.location(), Location(14 + 40));

    let mut out = [0u8; 40];
    tape.pop_n_array(&mut out, true).unwrap();
    assert_eq!(out, [9; 40]);
    assert_eq!(tape.location(), Location::START, "rewound to back pop");

    // the protected bytes were never overwritten
    tape.reset_repeat().unwrap();
    tape.pop_n_array(&mut consumed, true).unwrap();
    assert_eq!(consumed, [1; 10]);
    tape.end_repeat().unwrap();
}

#[test]
fn nested_levels_restore_cursor_and_buffers_in_lifo_order() {
    let mut tape = tape(48, 3);
    let mut snapshots = Vec::new();
    for depth in 0..5u8 {
        tape.push(depth as i32).unwrap();
        tape.push(depth as f64).unwrap();
        tape.push_bit(depth % 2 == 0).unwrap();
        tape.push_n_array(&[depth; 7], true).unwrap();
        snapshots.push((tape.location(), all_indices(&tape)));
        tape.start_repeat().unwrap();
    }
    assert_eq!(tape.repeat_depth(), 5);

    for depth in (0..5u8).rev() {
        tape.end_repeat().unwrap();
        let (location, indices) = &snapshots[depth as usize];
        assert_eq!(tape.location(), *location, "cursor after closing level {depth}");
        assert_eq!(&all_indices(&tape), indices, "buffers after closing level {depth}");

        let mut bytes = [0u8; 7];
        tape.pop_n_array(&mut bytes, true).unwrap();
        assert_eq!(bytes, [depth; 7]);
        assert_eq!(tape.pop_bit().unwrap(), depth % 2 == 0);
        assert_eq!(tape.pop::<f64>().unwrap(), depth as f64);
        assert_eq!(tape.pop::<i32>().unwrap(), depth as i32);
    }
    assert_eq!(tape.repeat_depth(), 0);
    assert_eq!(tape.location(), Location::START);
    assert!(matches!(
        tape.end_repeat(),
        Err(TapeError::NoActiveRepeat { .. })
    ));
}

#[test]
fn replayed_int32_scenario_pops_latest_write_first() {
    let mut tape = AdStack::new(TapeCreateInfo::default()).unwrap();
    for v in [1, 2, 3] {
        tape.push(v as i32).unwrap();
    }
    tape.start_repeat().unwrap();
    tape.push(99i32).unwrap();
    tape.reset_repeat().unwrap();
    tape.push(7i32).unwrap();
    tape.end_repeat().unwrap();

    let popped: Vec<i32> = (0..4).map(|_| tape.pop::<i32>().unwrap()).collect();
    assert_eq!(popped, vec![7, 3, 2, 1]);
}

#[test]
fn popping_more_than_was_pushed_is_an_error() {
    let mut tape = tape(16, 4);
    tape.push_n_array(&[1, 2], true).unwrap();
    let mut out = [0u8; 8];
    assert_eq!(
        tape.pop_n_array(&mut out, true),
        Err(TapeError::PopUnderflow {
            requested: 8,
            available: 2
        })
    );
    assert!(tape.pop::<f64>().is_err());
}
