use super::header::Header;
use super::name::Name;
use super::question::Question;
use super::resource::a::AResource;
use super::resource::nsec::NsecResource;
use super::resource::ptr::PtrResource;
use super::resource::srv::SrvResource;
use super::resource::txt::TxtResource;
use super::resource::{Resource, ResourceBody, ResourceHeader};
use super::*;
use shared::error::Error;

fn a_resource(name: &str, octets: [u8; 4]) -> Resource {
    Resource {
        header: ResourceHeader {
            name: Name::new(name).unwrap(),
            typ: DnsType::A,
            class: DNSCLASS_INET,
            ttl: 120,
            length: 0,
        },
        body: Some(Box::new(AResource { a: octets })),
    }
}

#[test]
fn test_name_new_appends_trailing_dot() {
    let name = Name::new("host.local").unwrap();
    assert_eq!(name.data, "host.local.");

    let name = Name::new("host.local.").unwrap();
    assert_eq!(name.data, "host.local.");

    assert_eq!(name.url(), "host.local");
}

#[test]
fn test_name_too_long_rejected() {
    let label = "a".repeat(63);
    let long = format!("{label}.{label}.{label}.{label}.{label}");
    assert!(Name::new(&long).is_err());
}

#[test]
fn test_name_pack_unpack_round_trip() {
    let name = Name::new("a-small.example.local").unwrap();
    let msg = name.pack(vec![], &mut None, 0).unwrap();

    let mut unpacked = Name::default();
    let off = unpacked.unpack(&msg, 0).unwrap();
    assert_eq!(off, msg.len());
    assert_eq!(unpacked, name);
}

#[test]
fn test_name_pack_root() {
    let name = Name::new(".").unwrap();
    let msg = name.pack(vec![], &mut None, 0).unwrap();
    assert_eq!(msg, vec![0]);
}

#[test]
fn test_name_pack_rejects_long_label() {
    let label = "b".repeat(64);
    let name = Name::new(&format!("{label}.local")).unwrap();
    let result = name.pack(vec![], &mut None, 0);
    assert_eq!(result.unwrap_err(), Error::ErrSegTooLong);
}

#[test]
fn test_name_unpack_pointer_loop_rejected() {
    // A pointer that points at itself must not loop forever.
    let msg = [0xC0u8, 0x00];
    let mut name = Name::default();
    assert_eq!(name.unpack(&msg, 0).unwrap_err(), Error::ErrTooManyPtr);
}

#[test]
fn test_name_unpack_reserved_prefix_rejected() {
    let msg = [0x40u8, 0x00];
    let mut name = Name::default();
    assert_eq!(name.unpack(&msg, 0).unwrap_err(), Error::ErrReserved);
}

#[test]
fn test_name_unpack_truncated_rejected() {
    // Length byte announces 5 bytes but only 2 follow.
    let msg = [5u8, b'a', b'b'];
    let mut name = Name::default();
    assert_eq!(name.unpack(&msg, 0).unwrap_err(), Error::ErrCalcLen);
}

#[test]
fn test_name_compression_pointer() {
    // Pack two names sharing a suffix into one buffer with a shared
    // compression map; the second must come out shorter than the first.
    let first = Name::new("one.example.local").unwrap();
    let second = Name::new("two.example.local").unwrap();

    let mut compression = Some(std::collections::HashMap::new());
    let msg = first.pack(vec![], &mut compression, 0).unwrap();
    let len_first = msg.len();
    let msg = second.pack(msg, &mut compression, 0).unwrap();
    assert!(msg.len() - len_first < len_first);

    let mut unpacked = Name::default();
    unpacked.unpack(&msg, len_first).unwrap();
    assert_eq!(unpacked.data, "two.example.local.");
}

#[test]
fn test_question_round_trip() {
    let mut msg = Message {
        header: Header::default(),
        questions: vec![Question {
            name: Name::new("printer.local").unwrap(),
            typ: DnsType::A,
            class: DNSCLASS_INET,
        }],
        ..Default::default()
    };
    let bytes = msg.pack().unwrap();

    let mut parsed = Message::default();
    parsed.unpack(&bytes).unwrap();
    assert_eq!(parsed.questions.len(), 1);
    assert_eq!(parsed.questions[0].name.data, "printer.local.");
    assert_eq!(parsed.questions[0].typ, DnsType::A);
    assert_eq!(parsed.questions[0].class, DNSCLASS_INET);
}

#[test]
fn test_message_encode_decode_encode_identity() {
    // encode(decode(bytes)) == bytes for a well-formed packet.
    let mut msg = Message {
        header: Header {
            response: true,
            authoritative: true,
            ..Default::default()
        },
        questions: vec![Question {
            name: Name::new("host.local").unwrap(),
            typ: DnsType::A,
            class: DNSCLASS_INET,
        }],
        answers: vec![a_resource("host.local", [192, 168, 1, 7])],
        ..Default::default()
    };
    let bytes = msg.pack().unwrap();

    let mut decoded = Message::default();
    decoded.unpack(&bytes).unwrap();
    let re_encoded = decoded.pack().unwrap();
    assert_eq!(re_encoded, bytes);
}

#[test]
fn test_message_sections_round_trip() {
    let mut msg = Message {
        header: Header::default(),
        questions: vec![Question {
            name: Name::new("svc._http._tcp.local").unwrap(),
            typ: DnsType::All,
            class: DNSCLASS_INET,
        }],
        authorities: vec![a_resource("svc._http._tcp.local", [10, 0, 0, 1])],
        ..Default::default()
    };
    let bytes = msg.pack().unwrap();

    let mut parsed = Message::default();
    parsed.unpack(&bytes).unwrap();
    assert_eq!(parsed.questions.len(), 1);
    assert!(parsed.answers.is_empty());
    assert_eq!(parsed.authorities.len(), 1);
    assert_eq!(parsed.authorities[0].header.typ, DnsType::A);
    assert_eq!(
        parsed.authorities[0].header.name.data,
        "svc._http._tcp.local."
    );
}

#[test]
fn test_srv_body_round_trip() {
    let body = SrvResource {
        priority: 0,
        weight: 5,
        port: 8080,
        target: Name::new("box.local").unwrap(),
    };
    let packed = body.pack(vec![], &mut None, 0).unwrap();

    let mut unpacked = SrvResource::default();
    let off = unpacked.unpack(&packed, 0, packed.len()).unwrap();
    assert_eq!(off, packed.len());
    assert_eq!(unpacked.priority, 0);
    assert_eq!(unpacked.weight, 5);
    assert_eq!(unpacked.port, 8080);
    assert_eq!(unpacked.target.data, "box.local.");
}

#[test]
fn test_ptr_body_round_trip() {
    let body = PtrResource {
        ptr: Name::new("instance._http._tcp.local").unwrap(),
    };
    let packed = body.pack(vec![], &mut None, 0).unwrap();

    let mut unpacked = PtrResource::default();
    unpacked.unpack(&packed, 0, packed.len()).unwrap();
    assert_eq!(unpacked.ptr.data, "instance._http._tcp.local.");
}

#[test]
fn test_txt_body_round_trip() {
    let body = TxtResource {
        txt: vec!["path=/".to_owned(), "version=1".to_owned()],
    };
    let packed = body.pack(vec![], &mut None, 0).unwrap();

    let mut unpacked = TxtResource::default();
    let off = unpacked.unpack(&packed, 0, packed.len()).unwrap();
    assert_eq!(off, packed.len());
    assert_eq!(unpacked.txt, vec!["path=/", "version=1"]);
}

#[test]
fn test_nsec_body_round_trip() {
    let body = NsecResource {
        next_domain: Name::new("host.local").unwrap(),
        types: vec![DnsType::A as u16, DnsType::Txt as u16, DnsType::Srv as u16],
    };
    let packed = body.pack(vec![], &mut None, 0).unwrap();

    let mut unpacked = NsecResource::default();
    let off = unpacked.unpack(&packed, 0, packed.len()).unwrap();
    assert_eq!(off, packed.len());
    assert_eq!(unpacked.next_domain.data, "host.local.");
    assert_eq!(unpacked.types, vec![1, 16, 33]);
}

#[test]
fn test_nsec_rejects_wide_types() {
    let body = NsecResource {
        next_domain: Name::new("host.local").unwrap(),
        types: vec![300],
    };
    assert!(body.pack(vec![], &mut None, 0).is_err());
}

#[test]
fn test_unknown_rtype_preserved_as_opaque() {
    // A record of a type the codec doesn't model must survive parsing.
    let mut msg = vec![];
    msg.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0]); // header, ancount=1
    let name = Name::new("x.local").unwrap();
    msg = name.pack(msg, &mut None, 0).unwrap();
    msg.extend_from_slice(&99u16.to_be_bytes()); // unsupported type
    msg.extend_from_slice(&1u16.to_be_bytes()); // class IN
    msg.extend_from_slice(&60u32.to_be_bytes()); // ttl
    msg.extend_from_slice(&3u16.to_be_bytes()); // rdlength
    msg.extend_from_slice(&[0xDE, 0xAD, 0x42]);

    let mut parsed = Message::default();
    parsed.unpack(&msg).unwrap();
    assert_eq!(parsed.answers.len(), 1);
    assert_eq!(parsed.answers[0].header.typ, DnsType::Unsupported);
}

#[test]
fn test_truncated_record_rejected() {
    let mut msg = Message {
        header: Header::default(),
        answers: vec![a_resource("host.local", [1, 2, 3, 4])],
        ..Default::default()
    };
    let bytes = msg.pack().unwrap();

    // Chop the rdata off.
    let mut parsed = Message::default();
    assert!(parsed.unpack(&bytes[..bytes.len() - 2]).is_err());
}

#[test]
fn test_header_bits_round_trip() {
    let mut msg = Message {
        header: Header {
            response: true,
            authoritative: true,
            truncated: false,
            recursion_desired: false,
            ..Default::default()
        },
        answers: vec![a_resource("host.local", [1, 2, 3, 4])],
        ..Default::default()
    };
    let bytes = msg.pack().unwrap();

    let mut parsed = Message::default();
    parsed.unpack(&bytes).unwrap();
    assert!(parsed.header.response);
    assert!(parsed.header.authoritative);
    assert!(!parsed.header.recursion_desired);
    assert_eq!(parsed.header.id, 0);
    assert_eq!(parsed.header.op_code, 0);
}

#[test]
fn test_class_msb_helpers() {
    let qu = DNSCLASS_INET.with_msb();
    assert!(qu.msb_set());
    assert_eq!(qu.without_msb(), DNSCLASS_INET);
    assert!(!DNSCLASS_INET.msb_set());
}

#[test]
fn test_short_packet_rejected() {
    let mut parsed = Message::default();
    assert!(parsed.unpack(&[0, 1, 2]).is_err());
    assert!(parsed.unpack(&[]).is_err());
}
