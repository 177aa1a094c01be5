use parkdash_core::protocol::{
    Channel, CommandType, DecodeError, Message, MessageType, ProtocolCodec, WireSlot,
};
use parkdash_core::{format_uid, ActionType, ProcessStatus, SlotState, UnknownCode};

#[test]
fn command_round_trips_cmd_and_param() {
    let codec = ProtocolCodec::new();
    for (cmd, param) in [
        (CommandType::Move, Some(5)),
        (CommandType::Homing, None),
        (CommandType::Reset, Some(0)),
    ] {
        let sent = codec.build_command(cmd, param);
        let raw = ProtocolCodec::encode(&sent).unwrap();
        let Message::Command(back) = ProtocolCodec::decode(&raw).unwrap() else {
            panic!("expected a command frame, got {raw}");
        };
        assert_eq!(back.cmd, cmd);
        assert_eq!(back.p, param);
        assert_eq!(back.id, sent.id());
    }
}

#[test]
fn ack_round_trips_rid() {
    let codec = ProtocolCodec::new();
    let raw = ProtocolCodec::encode(&codec.build_ack(4242)).unwrap();
    match ProtocolCodec::decode(&raw).unwrap() {
        Message::Ack(ack) => {
            assert_eq!(ack.rid, 4242);
            assert_eq!(ack.st, ProcessStatus::Success);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn slot_status_frame_decodes_to_typed_slots() {
    let raw = r#"{"id":5,"v":0,"t":16,"slots":[{"sid":1,"st":1,"uid":2870136116}]}"#;
    let msg = ProtocolCodec::decode(raw).unwrap();
    assert_eq!(msg.id(), 5);
    assert_eq!(msg.channel(), Channel::SlotStatus);

    let Message::SlotStatus(status) = msg else {
        panic!("expected slot status");
    };
    assert_eq!(
        status.slots,
        vec![WireSlot {
            sid: 1,
            st: SlotState::Occupied,
            uid: Some(0xAB12CD34),
        }]
    );
    assert_eq!(format_uid(status.slots[0].uid), "AB:12:CD:34");
}

#[test]
fn long_field_names_are_accepted() {
    let raw = r#"{"id":9,"v":0,"t":32,"rec":{"ts":1700000000,"uid":17,"action":1,"sid":3,"state":3}}"#;
    let Message::History(history) = ProtocolCodec::decode(raw).unwrap() else {
        panic!("expected single history record");
    };
    assert_eq!(history.rec.act, ActionType::Out);
    assert_eq!(history.rec.st, ProcessStatus::Processing);
}

#[test]
fn history_with_recs_is_a_batch() {
    let raw = r#"{"id":10,"v":0,"t":32,"recs":[
        {"ts":1,"uid":1,"act":0,"sid":1,"st":1},
        {"ts":2,"uid":2,"act":1,"sid":2,"st":0}
    ]}"#;
    let msg = ProtocolCodec::decode(raw).unwrap();
    assert!(matches!(msg, Message::BatchHistory(_)));
    assert_eq!(msg.message_type(), MessageType::History);
    assert_eq!(msg.channel(), Channel::History);
    assert_eq!(msg.records().len(), 2);
}

#[test]
fn sync_response_carries_updates() {
    let raw = r#"{"id":3,"v":0,"t":3,"rid":1,"cv":7,
        "updates":{"slots":[{"sid":2,"st":0}],"recs":[{"ts":5,"uid":9,"act":0,"sid":2,"st":1}]}}"#;
    let Message::SyncResponse(res) = ProtocolCodec::decode(raw).unwrap() else {
        panic!("expected sync response");
    };
    assert_eq!(res.cv, 7);
    let updates = res.updates.unwrap();
    assert_eq!(updates.slots.len(), 1);
    assert_eq!(updates.recs[0].ts, 5);
}

#[test]
fn unknown_type_is_reported_with_raw_code() {
    let err = ProtocolCodec::decode(r#"{"t":153,"id":1,"v":0}"#).unwrap_err();
    match err {
        DecodeError::UnknownMessageType { t, id } => {
            assert_eq!(t, 0x99);
            assert_eq!(id, 1);
        }
        other => panic!("unexpected {other:?}"),
    }

    let err = ProtocolCodec::decode(r#"{"t":4096,"id":2,"v":0}"#).unwrap_err();
    assert!(matches!(err, DecodeError::UnknownMessageType { t: 4096, .. }));
    assert_eq!(err.frame_id(), Some(2));
}

#[test]
fn malformed_frames_fail_without_panicking() {
    for raw in ["not json", "[1,2,3]", r#"{"t":1}"#, r#"{"id":"x","v":0,"t":1}"#, ""] {
        let err = ProtocolCodec::decode(raw).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)), "{raw}: {err:?}");
        assert_eq!(err.frame_id(), None);
    }
}

#[test]
fn known_type_with_wrong_fields_is_invalid_payload() {
    let err = ProtocolCodec::decode(r#"{"id":8,"v":0,"t":48,"rid":1}"#).unwrap_err();
    assert!(matches!(
        err,
        DecodeError::InvalidPayload {
            kind: MessageType::Progress,
            id: 8,
            ..
        }
    ));

    let err = ProtocolCodec::decode(r#"{"id":8,"v":0,"t":16,"slots":[{"sid":1,"st":9}]}"#)
        .unwrap_err();
    assert!(matches!(err, DecodeError::InvalidPayload { .. }));
}

#[test]
fn wire_codes_convert_for_enums_with_error_variants() {
    assert_eq!(ProcessStatus::try_from(0), Ok(ProcessStatus::Error));
    assert_eq!(SlotState::try_from(3), Ok(SlotState::Error));
    assert_eq!(MessageType::try_from(0xFF), Ok(MessageType::Error));
    for status in ProcessStatus::ALL {
        assert_eq!(ProcessStatus::try_from(status.code()), Ok(*status));
    }

    let err = SlotState::try_from(9).unwrap_err();
    assert_eq!(err, UnknownCode { kind: "SlotState", code: 9 });
    assert!(ProcessStatus::try_from(4).is_err());
}
