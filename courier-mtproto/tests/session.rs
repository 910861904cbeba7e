use courier_mtproto::{Message, MessageId, MtpState, SessionFramer, container, tl};

#[test]
fn session_seq_no_increments() {
    let mut s = MtpState::with_session_id(1, 0, 0);
    let a = s.next_seq_no(true);
    let b = s.next_seq_no(true);
    assert!(a & 1 == 1, "content-related seq_no must be odd");
    assert!(b & 1 == 1);
    assert!(b > a, "seq_no must increase");
}

#[test]
fn session_unrelated_seq_no_is_even() {
    let mut s = MtpState::with_session_id(1, 0, 0);
    s.next_seq_no(true);
    let n = s.next_seq_no(false);
    assert_eq!(n & 1, 0, "unrelated seq_no must be even");
    assert_eq!(n, 2);
    assert_eq!(s.next_seq_no(false), 2, "unrelated messages do not advance");
}

#[test]
fn msg_ids_strictly_increase_with_clear_low_bits() {
    let mut s = MtpState::new();
    let mut prev = s.next_msg_id();
    for _ in 0..1000 {
        let id = s.next_msg_id();
        assert!(id > prev);
        assert_eq!(id.0 & 3, 0);
        prev = id;
    }
}

#[test]
fn framed_message_layout() {
    let mut s = MtpState::with_session_id(7, 0, 0);
    let mut buf = Vec::new();
    let id = s.write_data_as_message(&mut buf, &[0xAA, 0xBB, 0xCC, 0xDD], true, None).unwrap();

    // msg_id (8 bytes) + seq_no (4 bytes) + length (4 bytes) + body (4 bytes)
    assert_eq!(buf.len(), 8 + 8);
    let (msg, used) = Message::parse(&buf).unwrap();
    assert_eq!(used, buf.len());
    assert_eq!(msg.id, id);
    assert_eq!(msg.seq_no, 1);
    assert_eq!(msg.body, vec![0xAA, 0xBB, 0xCC, 0xDD]);
}

#[test]
fn after_wraps_in_invoke_after_msg() {
    let mut s = MtpState::with_session_id(7, 0, 0);
    let mut buf = Vec::new();
    let first = s.write_data_as_message(&mut buf, &[1, 2, 3, 4], true, None).unwrap();
    buf.clear();
    s.write_data_as_message(&mut buf, &[5, 6, 7, 8], true, Some(first)).unwrap();

    let (msg, _) = Message::parse(&buf).unwrap();
    assert_eq!(&msg.body[..4], &tl::ID_INVOKE_AFTER_MSG.to_le_bytes());
    assert_eq!(i64::from_le_bytes(msg.body[4..12].try_into().unwrap()), first.0);
    assert_eq!(&msg.body[12..], &[5, 6, 7, 8]);
}

#[test]
fn large_content_related_body_is_gzipped() {
    let mut s = MtpState::with_session_id(7, 0, 0);
    let data = vec![0x42u8; 8192];

    let mut buf = Vec::new();
    s.write_data_as_message(&mut buf, &data, true, None).unwrap();
    let (msg, _) = Message::parse(&buf).unwrap();
    assert!(msg.body.len() < data.len());
    assert_eq!(tl::gzip_unpack(&msg.body).unwrap(), data);

    buf.clear();
    s.write_data_as_message(&mut buf, &data, false, None).unwrap();
    let (msg, _) = Message::parse(&buf).unwrap();
    assert_eq!(msg.body, data, "content-unrelated bodies are never packed");
}

#[test]
fn reset_starts_new_sequence() {
    let mut s = MtpState::with_session_id(7, 99, 0);
    s.next_seq_no(true);
    s.next_seq_no(true);
    s.reset();
    assert_eq!(s.sequence(), 0);
    assert_eq!(s.salt, 99);
    assert_eq!(s.next_seq_no(true), 1);
}

#[test]
fn time_offset_follows_server_id() {
    let mut s = MtpState::with_session_id(7, 0, 0);
    let local = s.next_msg_id();
    let server = MessageId((local.unix_secs() + 120) << 32);
    let off = s.update_time_offset(server);
    assert!((119..=121).contains(&off), "offset was {off}");
    assert!(s.next_msg_id().unix_secs() >= server.unix_secs());
}

#[test]
fn container_of_framed_messages_reads_back() {
    let mut s = MtpState::with_session_id(7, 0, 0);
    let mut framed = Vec::new();
    let a = s.write_data_as_message(&mut framed, &[1; 8], true, None).unwrap();
    let b = s.write_data_as_message(&mut framed, &[2; 8], true, None).unwrap();

    let body = container::wrap(2, &framed);
    let members = container::parse(&body).unwrap();
    assert_eq!(members.iter().map(|m| m.id).collect::<Vec<_>>(), vec![a, b]);
}
