use crate::{
    bitpack::{self, pack, packed_len, unpack},
    checksum::{checksum, verify},
    layout::{self, Field, Mutability, Variant, EXTENDED_SIZE, MAGIC},
    num::{u4, u7},
    style::{encode_tempo, StyleHeader, TrackHeader, TrackVoice},
    *,
};
use proptest::{collection::vec, prelude::*};

/// Install a subscriber printing to the test output, once.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Build a phrase block header plus its event data and terminator.
fn phrase_block(name: &[u8; 12], notes: (u8, u8), tempo: u16, data: &[u8]) -> Vec<u8> {
    let mut block = name.to_vec();
    block.extend_from_slice(&[0x03, 0x1C, 0x00, 0x00, notes.0, notes.1]);
    block.extend_from_slice(&[0; 6]);
    block.extend_from_slice(&tempo.to_be_bytes());
    block.extend_from_slice(&[0xF0, 0x00]);
    block.extend_from_slice(data);
    block.push(0xF2);
    block
}

const PHRASE_DATA: [u8; 14] = [
    0xD0, 0x24, 0x7F, 0x3C, 0xA0, 0x30, 0xBE, 0x00, 0xE0, 0x30, 0x60, 0x10, 0xBC, 0x07,
];

/// A 5120-byte file with one phrase, used by section 0 only.
fn extended_file() -> Vec<u8> {
    let mut raw = vec![0u8; EXTENDED_SIZE];
    raw[..16].copy_from_slice(MAGIC);
    for b in &mut raw[0x100..0x120] {
        *b = 0xFE;
    }
    raw[0x100..0x102].copy_from_slice(&[0x00, 0x20]);
    for b in &mut raw[0x120..0x180] {
        *b = 0x40;
    }
    raw[0x120..0x129].copy_from_slice(&[0xF0, 0x00, 0xFB, 0x00, 0x00, 0x00, 0xC0, 0x04, 0xF2]);
    for b in &mut raw[0x200..0xA00] {
        *b = 0x40;
    }
    let block = phrase_block(b"BASS LINE   ", (0x24, 0x30), 1200, &PHRASE_DATA);
    raw[0x200..0x200 + block.len()].copy_from_slice(&block);
    raw[0xA00..0xA08].copy_from_slice(b"EXTENDED");
    raw[0xA08..0xA0A].copy_from_slice(&[0x04, 0xB0]);
    raw
}

mod bitpack_codec {
    use super::*;

    #[test]
    fn empty() {
        assert!(pack(&[]).is_empty());
        assert!(unpack(&[]).is_empty());
    }

    #[test]
    fn top_bits_go_to_header() {
        assert_eq!(pack(&[0x80, 0x01, 0xFF]), [0x50, 0x00, 0x01, 0x7F]);
        assert_eq!(unpack(&[0x50, 0x00, 0x01, 0x7F]), [0x80, 0x01, 0xFF]);
    }

    #[test]
    fn group_sizes() {
        assert_eq!(pack(&[0xFF; 7]), [0x7F, 0x7F, 0x7F, 0x7F, 0x7F, 0x7F, 0x7F, 0x7F]);
        assert_eq!(pack(&[0; 8]).len(), 10);
        assert_eq!(packed_len(128), 147);
        assert_eq!(bitpack::unpacked_len(147), 128);
    }

    #[test]
    fn header_only_group_is_empty() {
        assert!(unpack(&[0x7F]).is_empty());
        assert_eq!(unpack(&[0, 1, 2, 3, 4, 5, 6, 7, 0x40]), [1, 2, 3, 4, 5, 6, 7]);
    }

    proptest! {
        #[test]
        fn round_trip(raw in vec(any::<u8>(), 0..300)) {
            let packed = pack(&raw);
            prop_assert_eq!(packed.len(), packed_len(raw.len()));
            prop_assert!(packed.iter().all(|&b| b < 0x80));
            prop_assert_eq!(unpack(&packed), raw);
        }
    }
}

mod checksum_algo {
    use super::*;

    #[test]
    fn known_values() {
        assert_eq!(checksum(&[]).as_int(), 0);
        assert_eq!(checksum(&[0x01]).as_int(), 0x7F);
        assert_eq!(checksum(&[0x7F, 0x01]).as_int(), 0);
        assert_eq!(checksum(&[0x00, 0x08, 0x02, 0x7E, 0x00]).as_int(), 0x78);
    }

    #[test]
    fn checksum_span_selection() {
        let body = [0x00, 0x08, 0x02, 0x7E, 0x00];
        assert_eq!(ChecksumSpan::CountAddressPayload.select(&body), &body[..]);
        assert_eq!(ChecksumSpan::AddressPayload.select(&body), &body[2..]);
        assert_eq!(ChecksumSpan::default(), ChecksumSpan::CountAddressPayload);
    }

    proptest! {
        #[test]
        fn verifies_own_checksum(raw in vec(any::<u8>(), 0..200)) {
            prop_assert!(verify(&raw, checksum(&raw)));
        }

        #[test]
        fn single_bit_flip(raw in vec(any::<u8>(), 1..200), at in any::<prop::sample::Index>(), bit in 0u32..8) {
            let cs = checksum(&raw);
            let mut flipped = raw.clone();
            flipped[at.index(raw.len())] ^= 1 << bit;
            //Flipping bit 7 changes the sum by 128, which the checksum cannot see
            prop_assert_eq!(verify(&flipped, cs), bit == 7);
        }

        #[test]
        fn flipped_checksum_fails(raw in vec(any::<u8>(), 0..200), bit in 0u32..7) {
            let cs = checksum(&raw);
            let bad = u7::new(cs.as_int() ^ (1 << bit));
            prop_assert!(!verify(&raw, bad));
        }
    }
}

mod framing {
    use super::*;

    #[test]
    fn skips_junk() {
        let stream = [0x01, 0xF0, 0x43, 0xF7, 0x99, 0xF7, 0xF0, 0x7F, 0x7F, 0xF7, 0x00];
        assert_eq!(
            frame(&stream),
            vec![&[0xF0, 0x43, 0xF7][..], &[0xF0, 0x7F, 0x7F, 0xF7][..]]
        );
    }

    #[test]
    fn interrupted_message_is_discarded() {
        let stream = [0xF0, 0x01, 0x02, 0xF0, 0x03, 0xF7];
        assert_eq!(frame(&stream), vec![&[0xF0, 0x03, 0xF7][..]]);
    }

    #[test]
    fn unterminated_tail() {
        let stream = [0xF0, 0x01, 0xF7, 0xF0, 0x43, 0x00];
        let mut framer = Framer::new(&stream);
        assert_eq!(framer.next(), Some(&[0xF0, 0x01, 0xF7][..]));
        assert_eq!(framer.next(), None);
        assert_eq!(framer.unterminated(), Some(&[0xF0, 0x43, 0x00][..]));
    }

    proptest! {
        #[test]
        fn frames_every_message(
            bodies in vec(vec(0u8..0x80, 0..20), 0..8),
            junk in vec(vec(any::<u8>().prop_filter("no start byte", |b| *b != 0xF0), 0..6), 9),
        ) {
            let mut stream = junk[0].clone();
            let mut expected = Vec::new();
            for (body, junk) in bodies.iter().zip(&junk[1..]) {
                let mut msg = vec![0xF0];
                msg.extend_from_slice(body);
                msg.push(0xF7);
                stream.extend_from_slice(&msg);
                stream.extend_from_slice(junk);
                expected.push(msg);
            }
            let framed: Vec<Vec<u8>> = frame(&stream).into_iter().map(|m| m.to_vec()).collect();
            prop_assert_eq!(framed, expected);
        }
    }
}

mod sysex_codec {
    use super::*;

    #[test]
    fn transfer_control() {
        assert_eq!(
            init_message(u4::new(0)),
            [0xF0, 0x43, 0x10, 0x5F, 0x00, 0x00, 0x00, 0x01, 0xF7]
        );
        assert_eq!(
            close_message(u4::new(2)),
            [0xF0, 0x43, 0x12, 0x5F, 0x00, 0x00, 0x00, 0x00, 0xF7]
        );
        let init = WireMessage::parse(&init_message(u4::new(0)), ChecksumSpan::default()).unwrap();
        assert_eq!(
            init,
            WireMessage::ParameterChange {
                device: u4::new(0),
                change: ParameterChange::Init,
            }
        );
        let close = WireMessage::parse(&close_message(u4::new(0)), ChecksumSpan::default()).unwrap();
        assert_eq!(close.kind(), MessageKind::ParameterChange);
    }

    #[test]
    fn track_addresses() {
        assert_eq!(Address::style_track(0, 0).as_bytes(), [0x02, 0x7E, 0x00]);
        assert_eq!(Address::style_track(5, 7).as_bytes(), [0x02, 0x7E, 0x2F]);
        assert_eq!(Address::style_track(5, 7).track_slot(), Some((5, 7)));
        assert_eq!(Address::style_header().track_slot(), None);
        //AL keeps 7 bits
        assert_eq!(Address::style_track(40, 3).low.as_int(), 0x43);
        assert_eq!(Address::style_track(255, 255).low.as_int(), 0x77);
    }

    #[test]
    fn known_bulk_dump() {
        let msg = BulkDump::encode(
            u4::new(0),
            Address::style_track(0, 0),
            &[0; 7],
            ChecksumSpan::default(),
        )
        .unwrap();
        let mut expected = vec![0xF0, 0x43, 0x00, 0x5F, 0x00, 0x08, 0x02, 0x7E, 0x00];
        expected.extend_from_slice(&[0; 8]);
        expected.extend_from_slice(&[0x78, 0xF7]);
        assert_eq!(msg, expected);
    }

    #[test]
    fn bulk_dump_round_trip() {
        let payload: Vec<u8> = (0..=127).map(|i: u8| i.wrapping_mul(37)).collect();
        let address = Address::style_track(2, 5);
        for &span in &[ChecksumSpan::CountAddressPayload, ChecksumSpan::AddressPayload] {
            let raw = BulkDump::encode(u4::new(3), address, &payload, span).unwrap();
            assert_eq!(raw.len(), 147 + 11);
            match WireMessage::parse(&raw, span).unwrap() {
                WireMessage::BulkDump(dump) => {
                    assert_eq!(dump.device, u4::new(3));
                    assert_eq!(dump.address, address);
                    assert_eq!(dump.address.track_slot(), Some((2, 5)));
                    assert_eq!(dump.byte_count.as_int(), 147);
                    assert_eq!(dump.payload, payload);
                    assert!(dump.checksum_ok());
                    assert_eq!(dump.checksum_error(), None);
                    let mut rewritten = Vec::new();
                    WireMessage::BulkDump(dump).write(span, &mut rewritten).unwrap();
                    assert_eq!(rewritten, raw);
                }
                other => panic!("expected a bulk dump, got {:?}", other),
            }
        }
    }

    #[test]
    fn checksum_mismatch_is_recorded() {
        let mut raw = BulkDump::encode(
            u4::new(0),
            Address::style_header(),
            b"payload",
            ChecksumSpan::default(),
        )
        .unwrap();
        let cs_at = raw.len() - 2;
        raw[cs_at] ^= 0x01;
        match WireMessage::parse(&raw, ChecksumSpan::default()).unwrap() {
            WireMessage::BulkDump(dump) => {
                assert!(!dump.checksum_ok());
                assert_eq!(dump.payload, b"payload");
                match dump.checksum_error() {
                    Some(err @ Error::ChecksumMismatch { .. }) => assert!(!err.is_fatal()),
                    other => panic!("expected a checksum mismatch, got {:?}", other),
                }
            }
            other => panic!("expected a bulk dump, got {:?}", other),
        }
    }

    #[test]
    fn span_mismatch_fails_verification() {
        let raw = BulkDump::encode(
            u4::new(0),
            Address::style_track(0, 1),
            b"abc",
            ChecksumSpan::CountAddressPayload,
        )
        .unwrap();
        match WireMessage::parse(&raw, ChecksumSpan::AddressPayload).unwrap() {
            WireMessage::BulkDump(dump) => assert!(!dump.checksum_ok()),
            other => panic!("expected a bulk dump, got {:?}", other),
        }
    }

    #[test]
    fn oversized_payload() {
        let err = BulkDump::encode(
            u4::new(0),
            Address::style_header(),
            &[0; MAX_PAYLOAD + 1],
            ChecksumSpan::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::MalformedMessage(_)));
    }

    #[test]
    fn rejects_foreign_and_broken_messages() {
        let roland = [0xF0, 0x41, 0x10, 0x42, 0x12, 0x40, 0x00, 0x7F, 0x00, 0x41, 0xF7];
        assert_eq!(
            WireMessage::parse(&roland, ChecksumSpan::default()),
            Err(Error::UnsupportedManufacturerOrModel {
                manufacturer: 0x41,
                model: 0x42,
            })
        );
        assert_eq!(MessageKind::classify(&roland), MessageKind::Unknown);

        let unterminated = [0xF0, 0x43, 0x10, 0x5F, 0x00, 0x00, 0x00, 0x01];
        assert!(matches!(
            WireMessage::parse(&unterminated, ChecksumSpan::default()),
            Err(Error::MalformedMessage(_))
        ));

        let short_dump = [0xF0, 0x43, 0x00, 0x5F, 0x00, 0x00, 0x02, 0x7E, 0xF7];
        assert!(matches!(
            WireMessage::parse(&short_dump, ChecksumSpan::default()),
            Err(Error::MalformedMessage(_))
        ));
        assert_eq!(MessageKind::classify(&short_dump), MessageKind::Unknown);
        assert!(matches!(
            WireMessage::parse(&[0xF0, 0xF7], ChecksumSpan::default()),
            Err(Error::MalformedMessage(_))
        ));
    }

    #[test]
    fn classification() {
        let request = dump_request(u4::new(1), Address::style_header());
        assert_eq!(request, [0xF0, 0x43, 0x21, 0x5F, 0x02, 0x7E, 0x7F, 0xF7]);
        assert_eq!(MessageKind::classify(&request), MessageKind::DumpRequest);
        assert_eq!(
            WireMessage::parse(&request, ChecksumSpan::default()).unwrap(),
            WireMessage::DumpRequest {
                device: u4::new(1),
                address: Address::style_header(),
            }
        );

        let change = parameter_change(u4::new(0), Address::new(0x08, 0x00, 0x07), &[u7::new(0x64)]);
        assert_eq!(MessageKind::classify(&change), MessageKind::ParameterChange);
        assert_eq!(
            WireMessage::parse(&change, ChecksumSpan::default()).unwrap(),
            WireMessage::ParameterChange {
                device: u4::new(0),
                change: ParameterChange::Other {
                    address: Address::new(0x08, 0x00, 0x07),
                    data: vec![u7::new(0x64)],
                },
            }
        );

        let odd = [0xF0, 0x43, 0x30, 0x5F, 0x01, 0xF7];
        assert_eq!(MessageKind::classify(&odd), MessageKind::Unknown);
        assert_eq!(
            WireMessage::parse(&odd, ChecksumSpan::default()).unwrap(),
            WireMessage::Unknown {
                device: u4::new(0),
                raw: odd.to_vec(),
            }
        );
    }
}

mod pattern_file {
    use super::*;

    #[test]
    fn layouts_are_consistent() {
        for table in &[&layout::STANDARD, &layout::EXTENDED] {
            for pair in table.regions.windows(2) {
                assert!(
                    pair[0].offset + pair[0].len <= pair[1].offset,
                    "{:?} overlaps {:?}",
                    pair[0].field,
                    pair[1].field
                );
            }
            let last = table.regions[table.regions.len() - 1];
            assert!(last.offset + last.len <= table.size);
        }
        assert_eq!(layout::STANDARD.class_at(0x188), Mutability::Safe);
        assert_eq!(layout::STANDARD.class_at(0x101), Mutability::Preserve);
        assert_eq!(layout::STANDARD.class_at(0x1F0), Mutability::Preserve);
        assert_eq!(layout::STANDARD.class_at(0x1F6), Mutability::Provisional);
    }

    #[test]
    fn reads_template() {
        let file = default_template();
        assert_eq!(file.variant(), Variant::Standard);
        assert_eq!(file.pattern_number(), 1);
        assert_eq!(file.name(), "USER TMPL");
        assert_eq!(file.tempo(), Tempo::from_bpm(120));
        assert_eq!(file.tempo().tenths(), 0x04B0);
        assert_eq!(file.time_signature(), [0x1C, 0x00]);
        assert_eq!(file.channel(0), 1);
        assert_eq!(file.channel(4), 4);
        assert_eq!(file.track_numbers(), Some(&[0, 1, 2, 3, 4, 5, 6, 7][..]));
        assert_eq!(file.track_flags(), Some(0x001F));
        assert_eq!(file.section_pointer(0), 0x0020);
        assert_eq!(
            file.section_config(1),
            Some(&[0xF0, 0x00, 0xFB, 0x01, 0x00, 0x01, 0xC0, 0x04, 0xF2][..])
        );

        let sections = file.sections();
        assert_eq!(sections.len(), 6);
        assert!(sections[..5].iter().all(|s| s.enabled));
        assert!(!sections[5].enabled);
        assert_eq!(sections[5].pointer, 0xFEFE);
        assert_eq!(sections[1].name, "Main A");
        assert_eq!(sections[0].tracks[0].volume, Some(u7::new(0x5B)));
        assert_eq!(sections[0].tracks[4].volume, Some(u7::new(0x64)));
        assert_eq!(sections[1].tracks[7].reverb, Some(u7::new(0x28)));
        assert_eq!(sections[2].tracks[0].volume, Some(u7::new(0x40)));
        assert_eq!(sections[3].tracks[7].reverb, Some(u7::new(0x00)));
        assert_eq!(sections[5].tracks[7].pan, Some(u7::new(0x40)));
        assert_eq!(sections[4].tracks[0].volume, None);
        assert_eq!(sections[2].tracks[0].chorus, None);
        assert!(!sections[5].tracks[3].enabled);
    }

    #[test]
    fn rejects_bad_files() {
        assert_eq!(
            PatternFile::parse(&[0; 100]),
            Err(Error::InvalidFileSize(100))
        );
        let mut raw = DEFAULT_TEMPLATE.to_vec();
        raw[0] = b'X';
        assert_eq!(PatternFile::parse(&raw), Err(Error::InvalidFileHeader));
        assert!(!PatternFile::detect(&raw));
        assert!(PatternFile::detect(DEFAULT_TEMPLATE));
    }

    #[test]
    fn write_checks() {
        let mut file = default_template().clone();
        assert_eq!(
            file.write_safe_field(Field::SectionPointers, 0, &[0, 0]),
            Err(Error::UnsafeFieldWrite(Field::SectionPointers))
        );
        assert_eq!(
            file.write_safe_field(Field::Fill, 0, &[0]),
            Err(Error::UnsafeFieldWrite(Field::Fill))
        );
        assert_eq!(
            file.write_safe_field(Field::Tempo, 1, &[0, 0]),
            Err(Error::FieldOutOfRange {
                field: Field::Tempo,
                index: 1,
            })
        );
        assert!(file.set_channel(0, 17).is_err());
        assert!(file.set_volume(4, 0, u7::new(1)).is_err());
        assert!(file.set_chorus(2, 0, u7::new(1)).is_err());
        assert_eq!(&file, default_template());

        file.set_tempo(Tempo::from_bpm(95)).unwrap();
        file.set_channel(2, 10).unwrap();
        file.set_pan(1, 3, u7::new(0x20)).unwrap();
        file.set_program(5, u7::new(33)).unwrap();
        assert_eq!(file.tempo().bpm(), 95);
        assert_eq!(file.channel(2), 10);
        assert_eq!(file.pan(1, 3), Some(u7::new(0x20)));
        assert_eq!(file.program(5), Some(u7::new(33)));
        assert_eq!(file.as_bytes()[0x276 + 11], 0x20);

        file.set_pan(5, 7, u7::new(0x7F)).unwrap();
        file.set_reverb(3, 0, u7::new(0x10)).unwrap();
        assert_eq!(file.as_bytes()[0x276 + 47], 0x7F);
        assert_eq!(file.as_bytes()[0x256 + 24], 0x10);
    }

    #[test]
    fn names_are_normalized() {
        let mut file = default_template().clone();
        file.set_name("my-song!").unwrap();
        assert_eq!(&file.as_bytes()[0x876..0x880], b"MY-SONG   ");
        assert_eq!(file.name(), "MY-SONG");
        file.set_name("a much longer name").unwrap();
        assert_eq!(file.name(), "A MUCH LON");
    }

    #[test]
    fn extended_layout() {
        let file = PatternFile::from_vec(extended_file()).unwrap();
        assert_eq!(file.variant(), Variant::Extended);
        assert_eq!(file.name(), "EXTENDED");
        assert_eq!(file.tempo().bpm(), 120);
        assert_eq!(file.volume(0, 0), None);
        assert_eq!(file.bank_msb(0), None);
        assert!(file.section_enabled(0));
        assert!(!file.section_enabled(1));

        let mut file = file;
        assert_eq!(
            file.set_volume(0, 0, u7::new(100)),
            Err(Error::MissingField(Field::Volume))
        );
        file.set_name("long name here").unwrap();
        assert_eq!(&file.as_bytes()[0xA00..0xA0A], b"LONG NAM\x04\xB0");
    }

    #[test]
    fn phrases() {
        let file = PatternFile::from_vec(extended_file()).unwrap();
        let phrases = parse_phrases(&file);
        assert_eq!(phrases.len(), 1);
        let phrase = &phrases[0];
        assert_eq!(phrase.name, "BASS LINE");
        assert_eq!(phrase.offset, 0x200);
        assert_eq!(phrase.midi_offset, 0x21C);
        assert_eq!(phrase.note_range, (0x24, 0x30));
        assert_eq!(phrase.tempo.bpm(), 120);
        assert_eq!(phrase.data, PHRASE_DATA);
        assert_eq!(phrase.events.len(), 5);

        assert!(parse_phrases(default_template()).is_empty());
    }

    #[test]
    fn overlay_without_writes_is_template() {
        let template = default_template();
        let out = PatternFile::overlay_from_template(template, &[]).unwrap();
        assert_eq!(&out, template);
    }

    #[test]
    fn overlay_fails_as_a_whole() {
        let writes = [
            FieldWrite::new(Field::Name, 0, &b"FIRST"[..]),
            FieldWrite::byte(Field::Magic, 0, 0),
        ];
        assert_eq!(
            PatternFile::overlay_from_template(default_template(), &writes),
            Err(Error::UnsafeFieldWrite(Field::Magic))
        );
    }

    const WRITABLE: [Field; 15] = [
        Field::PatternNumber,
        Field::PatternFlags,
        Field::Tempo,
        Field::TimeSignature,
        Field::Channels,
        Field::TrackNumbers,
        Field::TrackFlags,
        Field::BankMsb,
        Field::Program,
        Field::BankLsb,
        Field::Volume,
        Field::Chorus,
        Field::Reverb,
        Field::Pan,
        Field::Name,
    ];

    proptest! {
        #[test]
        fn overlay_only_touches_written_bytes(
            raw_writes in vec((0..WRITABLE.len(), 0usize..16, vec(any::<u8>(), 1..16)), 0..12),
        ) {
            let template = default_template();
            let mut covered = vec![false; template.as_bytes().len()];
            let mut writes = Vec::new();
            for (field, index, bytes) in raw_writes {
                let field = WRITABLE[field];
                let region = template.layout().region(field).unwrap();
                let index = index % region.len;
                let bytes: Vec<u8> = bytes.into_iter().take(region.len - index).collect();
                let start = region.offset + index;
                for c in &mut covered[start..start + bytes.len()] {
                    *c = true;
                }
                writes.push(FieldWrite::new(field, index, bytes));
            }
            let out = PatternFile::overlay_from_template(template, &writes).unwrap();
            for (i, (&a, &b)) in out.as_bytes().iter().zip(template.as_bytes()).enumerate() {
                if !covered[i] {
                    prop_assert_eq!(a, b, "byte 0x{:03X} changed", i);
                }
            }
        }
    }
}

mod events {
    use super::*;

    #[test]
    fn empty_stream() {
        assert!(parse(&[]).is_empty());
        assert_eq!(EventIter::new(&[]).next(), None);
    }

    #[test]
    fn end_stops_the_scan() {
        let raw = [0xF2, 0xD0, 0x24, 0x7F, 0x3C];
        let mut iter = EventIter::new(&raw);
        assert_eq!(
            iter.next(),
            Some(Segment::Event {
                bytes: &[0xF2],
                event: MidiEvent::End,
            })
        );
        assert_eq!(iter.next(), None);
        assert_eq!(iter.consumed(), 1);
        assert_eq!(iter.unread(), &raw[1..]);
        assert_eq!(parse(&raw), vec![MidiEvent::End]);
    }

    #[test]
    fn every_event_kind() {
        let raw = [
            0xD0, 0x24, 0x7F, 0x3C, 0xE0, 0x30, 0x60, 0x10, 0xC1, 0x30, 0x05, 0xA3, 0x18, 0xBE,
            0x00, 0xBC, 0x07, 0xF2,
        ];
        let events = parse(&raw);
        assert_eq!(
            events,
            vec![
                MidiEvent::DrumNote {
                    note: 0x24,
                    velocity: 0x7F,
                    gate: 0x3C,
                },
                MidiEvent::MelodyNote {
                    note: 0x30,
                    velocity: 0x60,
                    param: 0x10,
                },
                MidiEvent::AltNote {
                    note: 0x30,
                    param: 0x05,
                },
                MidiEvent::DeltaTime {
                    step: 3,
                    value: 0x18,
                },
                MidiEvent::NoteOff { param: 0x00 },
                MidiEvent::Control { param: 0x07 },
                MidiEvent::End,
            ]
        );
        let mut rewritten = Vec::new();
        for ev in &events {
            ev.write(&mut rewritten);
        }
        assert_eq!(rewritten, raw);
        assert_eq!(events.iter().map(MidiEvent::len).sum::<usize>(), raw.len());
    }

    #[test]
    fn unknown_bytes_are_opaque() {
        let raw = [0x11, 0x12, 0xBE, 0x05];
        assert_eq!(
            parse_segments(&raw),
            vec![
                Segment::Opaque(&[0x11, 0x12]),
                Segment::Event {
                    bytes: &[0xBE, 0x05],
                    event: MidiEvent::NoteOff { param: 0x05 },
                },
            ]
        );
        assert_eq!(parse(&raw), vec![MidiEvent::NoteOff { param: 0x05 }]);
        assert_eq!(
            unknown_opcodes(&raw),
            vec![Error::UnknownOpcode {
                opcode: 0x11,
                offset: 0,
            }]
        );
    }

    #[test]
    fn padding() {
        let raw = [0xBC, 0x01, 0x40, 0x40, 0x40, 0x40, 0xD0, 0x01, 0x02, 0x03];
        let mut iter = EventIter::new(&raw);
        assert_eq!(iter.by_ref().count(), 1);
        assert_eq!(iter.consumed(), 2);

        //A lone padding byte is just an unknown byte
        let raw = [0x40, 0xBE, 0x01];
        assert_eq!(parse(&raw), vec![MidiEvent::NoteOff { param: 0x01 }]);
        assert_eq!(parse_segments(&raw)[0], Segment::Opaque(&[0x40]));
    }

    #[test]
    fn truncated_event() {
        let raw = [0xBE, 0x01, 0xD0, 0x24];
        assert_eq!(
            parse_segments(&raw),
            vec![
                Segment::Event {
                    bytes: &[0xBE, 0x01],
                    event: MidiEvent::NoteOff { param: 0x01 },
                },
                Segment::Opaque(&[0xD0, 0x24]),
            ]
        );
        assert!(unknown_opcodes(&raw).is_empty());
    }

    proptest! {
        #[test]
        fn segments_pass_through(raw in vec(any::<u8>(), 0..200)) {
            let mut iter = EventIter::new(&raw);
            let segments: Vec<Segment> = iter.by_ref().collect();
            let mut out = Vec::new();
            write_segments(&segments, &mut out);
            prop_assert_eq!(&out[..], &raw[..iter.consumed()]);
        }
    }
}

mod style_codec {
    use super::*;

    #[test]
    fn tempo_ranges() {
        assert_eq!(encode_tempo(120), (2, 63));
        assert_eq!(encode_tempo(30), (1, 68));
        assert_eq!(encode_tempo(160), (3, 8));
        assert_eq!(encode_tempo(300), (4, 53));
        for bpm in 30..=300 {
            let header = StyleHeader::new(Tempo::from_bpm(bpm), "");
            assert_eq!(header.tempo_bpm(), Some(bpm as i32), "tempo {}", bpm);
        }
    }

    #[test]
    fn header_layout() {
        let header = StyleHeader::new(Tempo::from_bpm(120), "test");
        let bytes = &header.bytes;
        assert_eq!(bytes.len(), 640);
        assert_eq!(bytes[0], 63);
        assert_eq!(&bytes[4..7], &[0x00, 0x80, 0x00]);
        assert_eq!(&bytes[0x0F..0x16], &[0xBF, 0xDF, 0xEF, 0xF7, 0xFB, 0xFD, 0xFE]);
        assert_eq!(bytes[0x137], 0xBF);
        assert_eq!(bytes[0x1B9], 0xBF);
        assert_eq!(bytes[0x21B], 0xBF);
        assert_eq!(bytes[0x21C], 0x00);
        assert_eq!(&bytes[0x80..0x85], &[0x03, 0x01, 0x40, 0x60, 0x30]);
        assert_eq!(&bytes[0x85..0x8F], b"TEST      ");
        assert_eq!(header.name(), Some("TEST".to_string()));

        let garbled = StyleHeader::from_bytes(vec![0xFF; 640]);
        assert_eq!(garbled.name(), None);
        assert_eq!(StyleHeader::from_bytes(vec![0; 3]).tempo_bpm(), None);
    }

    #[test]
    fn stray_top_bits_move_the_tempo_range() {
        let mut header = StyleHeader::new(Tempo::from_bpm(120), "");
        header.bytes[3] |= 0x80;
        //Range 0b0001010 rather than 0b0000010
        assert_eq!(header.tempo_bpm(), Some(10 * 95 - 133 + 63));
        header.bytes[3] &= 0x7F;
        header.bytes[0] |= 0x80;
        assert_eq!(header.tempo_bpm(), Some(66 * 95 - 133 + 63));
    }

    #[test]
    fn track_headers() {
        let drum = TrackHeader::new(0, u7::new(5), u7::new(6)).to_bytes();
        assert_eq!(
            &drum[..14],
            &[0x08, 0x04, 0x82, 0x01, 0x00, 0x40, 0x20, 0x08, 0x04, 0x82, 0x01, 0x00, 0x06, 0x1C]
        );
        assert_eq!(&drum[14..21], &[0x40, 0x80, 0x87, 0xF8, 0x80, 0x8E, 0x83]);
        assert_eq!(&drum[21..], &[0, 0, 0]);

        let bass = TrackHeader::new(2, u7::new(5), u7::new(6)).to_bytes();
        assert_eq!(&bass[14..21], &[0x00, 0x04, 0x07, 0x78, 0x00, 0x07, 0x12]);

        let melody = TrackHeader::new(5, u7::new(5), u7::new(6)).to_bytes();
        assert_eq!(&melody[14..21], &[0x05, 0x06, 0x07, 0x78, 0x00, 0x0F, 0x10]);
        let unset = TrackHeader::new(5, u7::new(0), u7::new(0)).to_bytes();
        assert_eq!(&unset[14..16], &[0x40, 0x80]);
    }

    #[test]
    fn track_blocks() {
        let header = TrackHeader::new(3, u7::new(0), u7::new(1));
        let empty = header.track_data(&[]);
        assert_eq!(empty.len(), 128);
        assert_eq!(&empty[24..32], &[0x1F, 0xA3, 0x60, 0x00, 0xDF, 0x77, 0xC0, 0x8F]);
        assert!(empty[32..].iter().all(|&b| b == 0));

        let short = header.track_data(&PHRASE_DATA);
        assert_eq!(short.len(), 128);
        assert_eq!(&short[24..38], &PHRASE_DATA);

        let long = header.track_data(&[0x11; 200]);
        assert_eq!(long.len(), 224);

        assert_eq!(TrackVoice::read(&empty), Some(TrackVoice::Voice {
            bank_msb: u7::new(0),
            program: u7::new(1),
        }));
        assert_eq!(TrackVoice::read(&empty[..15]), None);
        let bass = TrackHeader::new(2, u7::new(0), u7::new(0)).track_data(&[]);
        assert_eq!(TrackVoice::read(&bass), Some(TrackVoice::Bass {
            bank_lsb: Some(u7::new(0x60)),
        }));
    }
}

mod convert {
    use super::*;

    fn frames(wire: &[u8]) -> Vec<Vec<u8>> {
        frame(wire).into_iter().map(|m| m.to_vec()).collect()
    }

    #[test]
    fn template_to_wire() {
        init_logging();
        let wire = file_to_wire(DEFAULT_TEMPLATE, 0).unwrap();
        let msgs = frames(&wire);
        //Init, 5 sections of 8 tracks, 5 header blocks, close
        assert_eq!(msgs.len(), 47);
        assert_eq!(msgs[0], init_message(u4::new(0)));
        assert_eq!(msgs[46], close_message(u4::new(0)));

        let addresses: Vec<Address> = msgs[1..46]
            .iter()
            .map(|raw| match WireMessage::parse(raw, ChecksumSpan::default()).unwrap() {
                WireMessage::BulkDump(dump) => {
                    assert!(dump.checksum_ok());
                    assert_eq!(dump.payload.len(), 128);
                    dump.address
                }
                other => panic!("expected a bulk dump, got {:?}", other),
            })
            .collect();
        assert_eq!(addresses[0], Address::style_track(0, 0));
        assert_eq!(addresses[39], Address::style_track(4, 7));
        assert!(addresses[40..].iter().all(|&a| a == Address::style_header()));
    }

    #[test]
    fn device_number() {
        let wire = file_to_wire(DEFAULT_TEMPLATE, 3).unwrap();
        let msgs = frames(&wire);
        assert_eq!(msgs[0], init_message(u4::new(3)));
        assert_eq!(msgs[1][2], 0x03);
        assert!(matches!(
            file_to_wire(DEFAULT_TEMPLATE, 16),
            Err(Error::MalformedMessage(_))
        ));
    }

    #[test]
    fn emitter_yields_messages_in_order() {
        let converter = Converter::default();
        let file = default_template();
        let msgs: Vec<Vec<u8>> = converter.emit(file).collect::<Result<_>>().unwrap();
        assert_eq!(msgs.len(), 47);
        assert_eq!(msgs.concat(), file_to_wire(DEFAULT_TEMPLATE, 0).unwrap());
    }

    #[test]
    fn round_trip_keeps_tempo_name_and_sections() {
        init_logging();
        let mut template = default_template().clone();
        template.set_name("TEST").unwrap();
        assert_eq!(&template.as_bytes()[0x876..0x880], b"TEST      ");
        assert_eq!(&template.as_bytes()[0x188..0x18A], &[0x04, 0xB0]);

        let wire = file_to_wire(template.as_bytes(), 0).unwrap();
        for base in &[Some(template.as_bytes()), None] {
            let out = PatternFile::from_vec(wire_to_file(&wire, *base).unwrap()).unwrap();
            assert_eq!(out.tempo().bpm(), 120);
            assert_eq!(out.name(), "TEST");
            assert_eq!(
                out.field(Field::SectionPointers),
                template.field(Field::SectionPointers)
            );
        }
    }

    #[test]
    fn round_trip_without_provisional_writes_is_exact() {
        let wire = file_to_wire(DEFAULT_TEMPLATE, 0).unwrap();
        let converter = Converter::new(ConvertOptions {
            write_provisional: false,
            ..ConvertOptions::default()
        });
        let conv = converter.wire_to_file(&wire).unwrap();
        assert!(conv.warnings.is_empty());
        assert_eq!(conv.bytes, DEFAULT_TEMPLATE);
    }

    #[test]
    fn provisional_voice_writes() {
        let wire = file_to_wire(DEFAULT_TEMPLATE, 0).unwrap();
        let out = PatternFile::from_vec(wire_to_file(&wire, None).unwrap()).unwrap();
        assert_eq!(out.bank_msb(0), Some(u7::new(0x7F)));
        assert_eq!(out.program(0), Some(u7::new(0)));
        assert_eq!(out.bank_lsb(2), Some(u7::new(0x60)));
        let template = default_template().as_bytes();
        for (i, (&a, &b)) in out.as_bytes().iter().zip(template).enumerate() {
            if a != b {
                assert_eq!(
                    default_template().layout().class_at(i),
                    Mutability::Provisional,
                    "byte 0x{:03X} changed",
                    i
                );
            }
        }
    }

    #[test]
    fn init_and_close_only() {
        let mut wire = init_message(u4::new(0)).to_vec();
        wire.extend_from_slice(&close_message(u4::new(0)));
        assert_eq!(wire_to_file(&wire, None).unwrap(), DEFAULT_TEMPLATE);

        let custom = PatternFile::from_vec(extended_file()).unwrap();
        assert_eq!(
            wire_to_file(&wire, Some(custom.as_bytes())).unwrap(),
            custom.as_bytes()
        );
    }

    #[test]
    fn received_pan() {
        let mut block = vec![0; 128];
        block[21] = 0x41;
        block[22] = 0x30;
        let mut wire = init_message(u4::new(0)).to_vec();
        wire.extend(
            BulkDump::encode(
                u4::new(0),
                Address::style_track(1, 3),
                &block,
                ChecksumSpan::default(),
            )
            .unwrap(),
        );
        wire.extend_from_slice(&close_message(u4::new(0)));
        let out = PatternFile::from_vec(wire_to_file(&wire, None).unwrap()).unwrap();
        assert_eq!(out.pan(1, 3), Some(u7::new(0x30)));
        assert_eq!(out.tempo(), default_template().tempo());
        assert_eq!(out.name(), "USER TMPL");
    }

    #[test]
    fn received_pan_in_later_sections() {
        let mut wire = init_message(u4::new(0)).to_vec();
        for &(section, track, pan) in &[(3, 2, 0x30), (5, 7, 0x11)] {
            let mut block = vec![0; 128];
            block[21] = 0x41;
            block[22] = pan;
            wire.extend(
                BulkDump::encode(
                    u4::new(0),
                    Address::style_track(section, track),
                    &block,
                    ChecksumSpan::default(),
                )
                .unwrap(),
            );
        }
        wire.extend_from_slice(&close_message(u4::new(0)));
        let out = PatternFile::from_vec(wire_to_file(&wire, None).unwrap()).unwrap();
        assert_eq!(out.pan(3, 2), Some(u7::new(0x30)));
        assert_eq!(out.as_bytes()[0x290], 0x30);
        assert_eq!(out.pan(5, 7), Some(u7::new(0x11)));
        assert_eq!(out.pan(3, 3), default_template().pan(3, 3));
    }

    #[test]
    fn out_of_range_header_tempo_is_ignored() {
        let mut template = default_template().clone();
        template.set_tempo(Tempo::from_bpm(99)).unwrap();
        let mut header = StyleHeader::new(Tempo::from_bpm(120), "ODD").bytes;
        header[3] |= 0x80;
        let mut wire = Vec::new();
        for chunk in header.chunks(MAX_PAYLOAD) {
            wire.extend(
                BulkDump::encode(u4::new(0), Address::style_header(), chunk, ChecksumSpan::default())
                    .unwrap(),
            );
        }
        let out = PatternFile::from_vec(wire_to_file(&wire, Some(template.as_bytes())).unwrap())
            .unwrap();
        assert_eq!(out.tempo().bpm(), 99);
        assert_eq!(out.name(), "ODD");
    }

    #[test]
    fn continuation_blocks_are_joined() {
        let mut header = StyleHeader::new(Tempo::from_bpm(140), "JOINED").bytes;
        header.truncate(200);
        let mut wire = Vec::new();
        for chunk in header.chunks(MAX_PAYLOAD) {
            wire.extend(
                BulkDump::encode(u4::new(0), Address::style_header(), chunk, ChecksumSpan::default())
                    .unwrap(),
            );
        }
        let out = PatternFile::from_vec(wire_to_file(&wire, None).unwrap()).unwrap();
        assert_eq!(out.tempo().bpm(), 140);
        assert_eq!(out.name(), "JOINED");
    }

    #[test]
    fn unterminated_stream_fails() {
        let mut wire = file_to_wire(DEFAULT_TEMPLATE, 0).unwrap();
        wire.extend_from_slice(&[0xF0, 0x43, 0x00]);
        assert!(matches!(
            wire_to_file(&wire, None),
            Err(Error::MalformedMessage(_))
        ));
    }

    #[test]
    fn bad_template() {
        let wire = file_to_wire(DEFAULT_TEMPLATE, 0).unwrap();
        assert_eq!(
            wire_to_file(&wire, Some(&[0; 10])),
            Err(Error::InvalidFileSize(10))
        );
        assert_eq!(file_to_wire(&[0; 3072], 0), Err(Error::InvalidFileHeader));
    }

    #[cfg(not(feature = "strict"))]
    #[test]
    fn anomalies_become_warnings() {
        init_logging();
        let mut msgs = frames(&file_to_wire(DEFAULT_TEMPLATE, 0).unwrap());
        let cs_at = msgs[1].len() - 2;
        msgs[1][cs_at] ^= 0x01;
        msgs.insert(2, vec![0xF0, 0x41, 0x10, 0x42, 0x12, 0x00, 0xF7]);
        let conv = Converter::default().wire_to_file(&msgs.concat()).unwrap();
        assert_eq!(conv.warnings.len(), 2);
        assert!(matches!(conv.warnings[0], Error::ChecksumMismatch { .. }));
        assert!(matches!(
            conv.warnings[1],
            Error::UnsupportedManufacturerOrModel { .. }
        ));
        let clean = wire_to_file(&file_to_wire(DEFAULT_TEMPLATE, 0).unwrap(), None).unwrap();
        assert_eq!(conv.bytes, clean);
    }

    #[cfg(feature = "strict")]
    #[test]
    fn anomalies_are_fatal() {
        let mut msgs = frames(&file_to_wire(DEFAULT_TEMPLATE, 0).unwrap());
        let cs_at = msgs[1].len() - 2;
        msgs[1][cs_at] ^= 0x01;
        assert!(matches!(
            Converter::default().wire_to_file(&msgs.concat()),
            Err(Error::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn extended_file_to_wire() {
        let raw = extended_file();
        let wire = file_to_wire(&raw, 0).unwrap();
        let msgs = frames(&wire);
        //Init, 8 tracks of section 0, 5 header blocks, close
        assert_eq!(msgs.len(), 15);
        match WireMessage::parse(&msgs[1], ChecksumSpan::default()).unwrap() {
            WireMessage::BulkDump(dump) => {
                assert_eq!(dump.address, Address::style_track(0, 0));
                assert_eq!(&dump.payload[24..38], &PHRASE_DATA);
            }
            other => panic!("expected a bulk dump, got {:?}", other),
        }

        let out = PatternFile::from_vec(wire_to_file(&wire, Some(&raw)).unwrap()).unwrap();
        assert_eq!(out.name(), "EXTENDED");
        assert_eq!(out.tempo().bpm(), 120);
        assert_eq!(out.as_bytes(), &raw[..]);
    }
}
