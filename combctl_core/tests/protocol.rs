use combctl_core::error::{PacketCheck, ProtocolError};
use combctl_core::orion::{
    Command, Request, checksum, decode, decode_request, encode, encode_response, read_from_stream,
};
use proptest::prelude::*;
use rstest::rstest;

#[test]
fn read_volatile_temp_packet_matches_wire_capture() {
    let bytes = encode(0x1F, None, 0).unwrap();
    assert_eq!(bytes, vec![0xA9, 0x00, 0x07, 0x00, 0xFF, 0x01, 0x1F, 0x31, 0xA5]);
    assert_eq!(checksum(&bytes), 0x31);
}

#[rstest]
#[case(Command::EnableSerial, None)]
#[case(Command::VolatileCurrentWrite, Some(950))]
#[case(Command::VolatileTempWrite, Some(12_345))]
#[case(Command::NonVolatileTempWrite, Some(0))]
fn request_decodes_to_what_was_encoded(#[case] command: Command, #[case] value: Option<u64>) {
    let bytes = command.request(value, 42);
    assert_eq!(
        decode_request(&bytes).unwrap(),
        Request::new(command, value, 42)
    );
}

#[test]
fn every_table_entry_round_trips_by_id_and_name() {
    for command in Command::ALL {
        assert_eq!(Command::from_id(command.id()).unwrap(), command);
        assert_eq!(Command::from_name(command.name()), Some(command));
    }
    assert_eq!(
        Command::from_id(0x02),
        Err(ProtocolError::InvalidCommand(0x02))
    );
}

fn any_command() -> impl Strategy<Value = Command> {
    (0..Command::ALL.len()).prop_map(|i| Command::ALL[i])
}

proptest! {
    #[test]
    fn response_round_trips(
        command in any_command(),
        value in proptest::option::of(any::<u64>()),
        status in any::<u8>(),
        packet_id in any::<u8>(),
    ) {
        let raw = encode_response(command, value, status, packet_id);
        prop_assert_eq!(decode(&raw, Some(packet_id)).unwrap(), (value, status));
    }

    #[test]
    fn any_single_bit_flip_is_detected(
        command in any_command(),
        value in proptest::option::of(1u64..=u64::from(u32::MAX)),
        packet_id in any::<u8>(),
        pick in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let mut raw = encode_response(command, value, 0, packet_id);
        let n = raw.len();
        // Every byte except the checksum itself.
        let positions: Vec<usize> = (0..n).filter(|&i| i != n - 2).collect();
        let at = positions[pick.index(positions.len())];
        raw[at] ^= 1 << bit;
        prop_assert!(decode(&raw, Some(packet_id)).is_err());
    }

    #[test]
    fn stream_reader_recovers_packet_after_noise(
        noise in proptest::collection::vec(any::<u8>().prop_filter("not a header", |b| *b != 0xA9), 0..16),
        value in any::<u32>(),
    ) {
        let packet = Command::VolatileTempWrite.request(Some(u64::from(value)), 3);
        let mut bytes = noise;
        bytes.extend_from_slice(&packet);
        let mut it = bytes.into_iter();
        prop_assert_eq!(read_from_stream(|| it.next()).unwrap(), packet);
    }
}

#[test]
fn wrong_packet_id_is_reported_last() {
    let raw = encode_response(Command::StatusRead, Some(0), 0, 9);
    assert_eq!(
        decode(&raw, Some(8)),
        Err(ProtocolError::MalformedPacket(PacketCheck::PacketId))
    );
}
