//! Integration tests for capture conversion
//!
//! These tests build captures in memory, run whole conversions into a
//! `MidiLog`, and round-trip MIDI files through `midly`.

use midly::{MidiMessage, Smf, TrackEventKind};
use opl2midi::capture::{self, CaptureEvent, CaptureFormat};
use opl2midi::instrument::{Fingerprint, Instrument, InstrumentCatalog, Voice};
use opl2midi::midi::{MidiEvent, MidiLog};
use opl2midi::note::key_fraction;
use opl2midi::{convert_file, ConvertOptions, Converter};
use std::collections::HashMap;
use std::io::Write;
use tempfile::tempdir;

/// IMF type-0 data from (register, value, delay) records, led by the
/// customary zero record
fn imf_type0(records: &[(u8, u8, u16)]) -> Vec<u8> {
    let mut data = vec![0, 0, 0, 0];
    for &(register, value, delay) in records {
        data.extend_from_slice(&[register, value]);
        data.extend_from_slice(&delay.to_le_bytes());
    }
    data
}

/// DRO 0.1 capture with a four-byte hardware type
fn dro_v1(body: &[u8]) -> Vec<u8> {
    let mut data = b"DBRAWOPL".to_vec();
    data.extend_from_slice(&0x0001_0000u32.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&(body.len() as u32).to_le_bytes());
    data.extend_from_slice(&[1, 0, 0, 0]);
    data.extend_from_slice(body);
    data
}

fn raw(divisor: u16, body: &[u8]) -> Vec<u8> {
    let mut data = b"RAWADATA".to_vec();
    data.extend_from_slice(&divisor.to_le_bytes());
    data.extend_from_slice(body);
    data
}

/// Convert in-memory capture data and return the MIDI calls
fn convert(data: &[u8], name: &str, options: ConvertOptions, catalog: InstrumentCatalog) -> (MidiLog, Converter) {
    let mut source = capture::open(data, name).expect("Failed to open capture");
    let mut converter = Converter::new(options, catalog).expect("Invalid options");
    let mut log = MidiLog::new();
    converter
        .run(source.as_mut(), &mut log)
        .expect("Conversion failed");
    (log, converter)
}

/// Channel events following the header
fn body_events(log: &MidiLog) -> Vec<MidiEvent> {
    let header_len = log
        .events
        .iter()
        .rposition(|e| {
            matches!(
                e,
                MidiEvent::ControlChange { controller: 7, .. } | MidiEvent::ControlChange { controller: 100, .. }
            )
        })
        .map(|i| i + 1)
        .unwrap_or(0);
    log.events[header_len..].to_vec()
}

#[test]
fn test_imf_key_on_scenario() {
    let data = imf_type0(&[(0x20, 0x01, 0), (0xB0, 0x31, 10)]);
    let (log, _) = convert(&data, "song.imf", ConvertOptions::default(), InstrumentCatalog::new());

    assert_eq!(log.events[0], MidiEvent::Resolution { ticks_per_quarter: 280 });

    // The record delay follows its write, so the note starts at tick 0 and
    // the final ten ticks are flushed before the end
    let key = key_fraction(0x100, 4).round() as u8;
    let body = body_events(&log);
    assert_eq!(body[0], MidiEvent::Advance { ticks: 0 });
    let note_on = body
        .iter()
        .position(|e| matches!(e, MidiEvent::NoteOn { .. }))
        .expect("no note-on");
    assert!(body[..note_on].iter().any(|e| matches!(
        e,
        MidiEvent::ProgramChange { channel: 0, program: 0 }
    )));
    // One empty advance per record ahead of the key-on
    assert_eq!(
        body[..note_on]
            .iter()
            .filter(|e| **e == MidiEvent::Advance { ticks: 0 })
            .count(),
        3
    );
    assert!(matches!(body[note_on], MidiEvent::NoteOn { channel: 0, key: k, .. } if k == key));
    assert_eq!(body[note_on + 1], MidiEvent::Advance { ticks: 10 });
    // Still sounding at the end, so it is released
    assert_eq!(body[note_on + 2], MidiEvent::NoteOff { channel: 0, key });
    assert_eq!(log.elapsed(), 10);
}

#[test]
fn test_wlf_uses_faster_rate() {
    let data = imf_type0(&[(0x20, 0x01, 0)]);
    let (log, _) = convert(&data, "song.wlf", ConvertOptions::default(), InstrumentCatalog::new());
    assert_eq!(log.events[0], MidiEvent::Resolution { ticks_per_quarter: 350 });
}

#[test]
fn test_imf_needs_known_extension() {
    let data = imf_type0(&[(0x20, 0x01, 0)]);
    assert!(matches!(
        capture::open(&data, "song.bin"),
        Err(opl2midi::Error::UnknownExtension(_))
    ));
}

#[test]
fn test_imf_type1_length_header() {
    let mut data = 8u16.to_le_bytes().to_vec();
    data.extend_from_slice(&[0xA0, 0x59, 5, 0, 0xB0, 0x31, 7, 0]);
    // Trailing bytes past the declared length are ignored
    data.extend_from_slice(&[0xB0, 0x11, 0, 0]);

    let mut source = capture::open(&data, "level.imf").unwrap();
    assert_eq!(source.info().format, CaptureFormat::ImfType1);
    let events = capture::collect_events(source.as_mut());
    let writes = events.iter().filter(|e| matches!(e, CaptureEvent::Write(_))).count();
    let ticks: u32 = events.iter().filter_map(|e| e.delay_ticks()).sum();
    assert_eq!(writes, 2);
    assert_eq!(ticks, 12);
}

#[test]
fn test_delay_accounting_matches_capture() {
    let body = [
        0x00, 0x09, // delay 10
        0xA0, 0x59, //
        0x01, 0xE7, 0x03, // delay 1000
        0xB0, 0x31, //
        0x00, 0x00, // delay 1
        0xB0, 0x11, //
        0x00, 0x04, // trailing delay 5
    ];
    let data = dro_v1(&body);
    let (log, converter) = convert(&data, "capture.dro", ConvertOptions::default(), InstrumentCatalog::new());

    assert_eq!(log.events[0], MidiEvent::Resolution { ticks_per_quarter: 500 });
    assert_eq!(log.elapsed(), 10 + 1000 + 1 + 5);
    assert_eq!(log.note_ons(), vec![(0, 60)]);
    assert_eq!(log.note_offs(), vec![(0, 60)]);
    assert!(!converter.bank().channel(0).key_on);
}

#[test]
fn test_raw_clock_change_rescales_delays() {
    let body = [
        0x00, 0x02, 0xB4, 0x0D, // clock divisor 0x0DB4 (~340 Hz)
        100, 0x00, // 100 native ticks
        0x44, 0xA0,
    ];
    let data = raw(0, &body);
    let mut source = capture::open(&data, "capture.raw").unwrap();
    let events = capture::collect_events(source.as_mut());

    // 100 ticks at 1193180 / 0x0DB4 Hz, expressed in milliseconds
    let expected = (100u64 * 0x0DB4 * 1000 / 1_193_180) as u32;
    assert_eq!(
        events,
        vec![
            CaptureEvent::ClockChange { divisor: 0x0DB4, hz: 340 },
            CaptureEvent::Delay { ticks: expected },
            CaptureEvent::write(0xA0, 0x44),
        ]
    );
}

#[test]
fn test_rhythm_byte_gates_three_voices() {
    let data = imf_type0(&[
        (0xA6, 0x59, 0),
        (0xB6, 0x11, 0), // bass drum pitch, block 4
        (0xA8, 0x59, 0),
        (0xB8, 0x0D, 0), // tom-tom pitch, block 3
        (0xBD, 0b0011_0101, 4),
    ]);
    let (log, _) = convert(&data, "beat.imf", ConvertOptions::default(), InstrumentCatalog::new());

    let note_ons = log.note_ons();
    assert_eq!(note_ons, vec![(6, 60), (8, 48), (9, 42)]);
    let body = body_events(&log);
    assert!(body.contains(&MidiEvent::ProgramChange { channel: 6, program: 116 }));
    assert!(body.contains(&MidiEvent::ProgramChange { channel: 8, program: 118 }));
    assert!(!note_ons.contains(&(9, 38)));
    assert!(!note_ons.contains(&(9, 57)));
}

#[test]
fn test_note_on_off_balance() {
    let mut records = Vec::new();
    for (i, channel) in (0..9u8).cycle().take(40).enumerate() {
        let block = 2 + (i % 5) as u8;
        records.push((0xA0 + channel, 0x59 + (i as u8 % 7) * 3, 1));
        records.push((0xB0 + channel, 0x21 | (block << 2), 3));
        if i % 3 != 0 {
            records.push((0xB0 + channel, 0x01 | (block << 2), 2));
        }
    }
    records.push((0xBD, 0x3F, 1));
    records.push((0xBD, 0x00, 1));

    let data = imf_type0(&records);
    for options in [
        ConvertOptions::default(),
        ConvertOptions {
            pitch_bends: false,
            approximate_bends: true,
            ..Default::default()
        },
    ] {
        let (log, _) = convert(&data, "many.imf", options, InstrumentCatalog::new());

        let mut balance: HashMap<u8, i64> = HashMap::new();
        for (channel, _) in log.note_ons() {
            *balance.entry(channel).or_default() += 1;
        }
        for (channel, _) in log.note_offs() {
            *balance.entry(channel).or_default() -= 1;
        }
        // Everything still sounding is released at the end
        assert!(balance.values().all(|&b| b == 0), "unbalanced: {:?}", balance);
    }
}

#[test]
fn test_catalog_learns_unknown_instruments_once() {
    let mapping = "\
00-00/00-00/00-00/00-00/00/00-00: patch=1
21-21/10-00/F0-F0/F0-F0/0E/00-00: patch=30
";
    let catalog = opl2midi::instrument::mapping::parse_mapping(
        mapping,
        &opl2midi::instrument::NameTables::new(),
    )
    .unwrap();

    // Close to the second instrument but not equal
    let timbre = [
        (0x21, 0x21, 0),
        (0x24, 0x21, 0),
        (0x41, 0x12, 0),
        (0x61, 0xF0, 0),
        (0x64, 0xF0, 0),
        (0x81, 0xF0, 0),
        (0x84, 0xF0, 0),
        (0xC1, 0x0E, 0),
    ];
    let mut records = timbre.to_vec();
    records.extend_from_slice(&[(0xA1, 0x59, 0), (0xB1, 0x31, 5), (0xB1, 0x11, 5), (0xB1, 0x31, 5)]);
    let data = imf_type0(&records);

    let (log, converter) = convert(&data, "learn.imf", ConvertOptions::default(), catalog);
    let catalog = converter.catalog();
    assert_eq!(catalog.len(), 3);
    let learned = catalog.get(2).unwrap();
    assert_eq!(learned.redirect, Some(1));
    assert_eq!(learned.fingerprint.reg40, [0x12, 0x00]);

    // One program change: the second key-on matches the learned entry exactly
    let programs: Vec<_> = body_events(&log)
        .into_iter()
        .filter(|e| matches!(e, MidiEvent::ProgramChange { .. }))
        .collect();
    assert_eq!(programs, vec![MidiEvent::ProgramChange { channel: 1, program: 29 }]);
    assert_eq!(log.note_ons().len(), 2);
}

#[test]
fn test_exact_match_is_idempotent() {
    let mut catalog = InstrumentCatalog::new();
    let fp: Fingerprint = "01-11/4F-00/F1-D2/53-74/06/00-00".parse().unwrap();
    let first = catalog.find(&fp, false).unwrap();
    let size = catalog.len();
    for _ in 0..5 {
        let again = catalog.find(&fp, false).unwrap();
        assert_eq!(again.index, first.index);
        assert_eq!(again.distance, 0);
    }
    assert_eq!(catalog.len(), size);
}

#[test]
fn test_perfect_only_uses_first_instrument() {
    let catalog = InstrumentCatalog::from_instruments(vec![
        Instrument {
            fingerprint: "00-00/00-00/00-00/00-00/00/00-00".parse().unwrap(),
            voice: Voice::Melodic { program: 5 },
            name: "First".into(),
            redirect: None,
        },
        Instrument {
            fingerprint: "21-00/00-00/00-00/00-00/00/00-00".parse().unwrap(),
            voice: Voice::Melodic { program: 40 },
            name: "Second".into(),
            redirect: None,
        },
    ])
    .unwrap();
    let data = imf_type0(&[(0x20, 0x20, 0), (0xA0, 0x59, 0), (0xB0, 0x31, 0)]);
    let options = ConvertOptions {
        perfect_matches_only: true,
        ..Default::default()
    };
    let (log, _) = convert(&data, "strict.imf", options, catalog);
    assert!(body_events(&log).contains(&MidiEvent::ProgramChange { channel: 0, program: 5 }));
}

#[test]
fn test_pitch_bends_disabled_skip_rpn_setup() {
    let data = imf_type0(&[(0xA0, 0x59, 0), (0xB0, 0x31, 0), (0xA0, 0x6B, 0)]);
    let options = ConvertOptions {
        pitch_bends: false,
        ..Default::default()
    };
    let (log, _) = convert(&data, "flat.imf", options, InstrumentCatalog::new());
    assert!(!log.events.iter().any(|e| matches!(
        e,
        MidiEvent::PitchBend { .. } | MidiEvent::ControlChange { controller: 101, .. }
    )));
    assert_eq!(log.note_ons(), vec![(0, 60)]);
}

#[test]
fn test_chip_select_is_not_fatal() {
    let body = [0xA0, 0x59, 0x03, 0xB0, 0x31, 0x02, 0x00, 0x09];
    let data = dro_v1(&body);
    let (log, _) = convert(&data, "dual.dro", ConvertOptions::default(), InstrumentCatalog::new());
    assert_eq!(log.note_ons(), vec![(0, 60)]);
    assert_eq!(log.elapsed(), 10);
}

#[test]
fn test_convert_file_round_trip() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("tune.imf");
    let output = dir.path().join("tune.mid");
    std::fs::write(
        &input,
        imf_type0(&[(0xA0, 0x59, 0), (0xB0, 0x31, 280), (0xB0, 0x11, 0)]),
    )
    .unwrap();

    let stats = convert_file(&input, &output, &ConvertOptions::default(), InstrumentCatalog::new()).unwrap();
    assert_eq!(stats.notes, 1);
    assert_eq!(stats.ticks, 280);

    let bytes = std::fs::read(&output).unwrap();
    let smf = Smf::parse(&bytes).unwrap();
    assert_eq!(smf.header.format, midly::Format::SingleTrack);
    assert_eq!(smf.header.timing, midly::Timing::Metrical(midly::num::u15::new(280)));

    let mut now = 0u32;
    let mut notes = Vec::new();
    for event in &smf.tracks[0] {
        now += event.delta.as_int();
        if let TrackEventKind::Midi { channel, message } = event.kind {
            match message {
                MidiMessage::NoteOn { key, .. } => notes.push((now, channel.as_int(), key.as_int(), true)),
                MidiMessage::NoteOff { key, .. } => notes.push((now, channel.as_int(), key.as_int(), false)),
                _ => {}
            }
        }
    }
    assert_eq!(notes, vec![(0, 0, 60, true), (280, 0, 60, false)]);
}

#[test]
fn test_gzipped_input() {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let dir = tempdir().unwrap();
    let input = dir.path().join("tune.wlf.gz");
    let output = dir.path().join("tune.mid");

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&imf_type0(&[(0xA0, 0x59, 0), (0xB0, 0x31, 7)]))
        .unwrap();
    std::fs::write(&input, encoder.finish().unwrap()).unwrap();

    let stats = convert_file(&input, &output, &ConvertOptions::default(), InstrumentCatalog::new()).unwrap();
    assert_eq!(stats.notes, 1);
    assert_eq!(stats.ticks, 7);

    let smf_bytes = std::fs::read(&output).unwrap();
    let smf = Smf::parse(&smf_bytes).unwrap();
    assert_eq!(smf.header.timing, midly::Timing::Metrical(midly::num::u15::new(350)));
}

#[test]
fn test_mapping_file_from_disk() {
    let dir = tempdir().unwrap();
    let mapping = dir.path().join("inst.txt");
    std::fs::write(
        &mapping,
        "# test bank\n00-00/00-00/00-00/00-00/00/00-00: drum=38\n",
    )
    .unwrap();
    let catalog = InstrumentCatalog::load(
        &mapping,
        &dir.path().join("patch.txt"),
        &dir.path().join("drum.txt"),
    )
    .unwrap();

    let data = imf_type0(&[(0xA2, 0x59, 0), (0xB2, 0x31, 0)]);
    let (log, _) = convert(&data, "drums.imf", ConvertOptions::default(), catalog);
    assert_eq!(log.note_ons(), vec![(9, 38)]);
    assert_eq!(log.note_offs(), vec![(9, 38)]);
}
