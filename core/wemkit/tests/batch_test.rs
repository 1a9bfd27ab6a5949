mod common;

use common::{OpusWem, VorbisWem, init_logging, library_bytes, ogg_packets, ramp_adpcm_wem};
use std::collections::HashMap;
use std::fs;
use std::io::Cursor;
use std::ops::Range;
use wemkit::process::load_codebooks;
use wemkit::{ConversionOptions, ForcePacketFormat, convert_all};

/// Concatenate entries the way a sound bank stores them.
fn bundle(entries: &[(u64, Vec<u8>)]) -> (Vec<u8>, Vec<(u64, Range<u64>)>) {
    let mut data = vec![0u8; 16];
    let mut index = Vec::new();
    for (id, bytes) in entries {
        let start = data.len() as u64;
        data.extend_from_slice(bytes);
        index.push((*id, start..data.len() as u64));
        // alignment padding between entries
        data.extend_from_slice(&[0u8; 3]);
    }
    (data, index)
}

#[test]
fn test_convert_all_mixed_bundle() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let books = dir.path().join("books.bin");
    fs::write(&books, library_bytes(1)).unwrap();

    let json = format!(
        r#"{{ "codebooks_path": {:?}, "normalize_granules": false, "vendor": "batch",
            "force_packet_format": "ForceNoModPackets" }}"#,
        books.to_string_lossy()
    );
    let options: ConversionOptions = serde_json::from_str(&json).unwrap();
    assert_eq!(options.force_packet_format, ForcePacketFormat::ForceNoModPackets);

    let library = load_codebooks(&options).unwrap();
    assert!(library.is_some());

    let (data, index) = bundle(&[
        (100, VorbisWem::default().build()),
        (200, OpusWem::default().build()),
        (300, ramp_adpcm_wem()),
        (400, b"not a wem file".to_vec()),
    ]);

    let names: HashMap<u64, String> = [(100, "music/theme".to_string()), (300, "sfx/step.wem".to_string())].into();
    let resolver = |id: u64| names.get(&id).cloned();

    let out_dir = dir.path().join("out");
    let report = convert_all(
        &mut Cursor::new(data),
        &index,
        &resolver,
        &options,
        library.as_ref(),
        &out_dir,
    )
    .unwrap();

    assert_eq!(report.converted.len(), 3);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, 400);
    assert!(!report.is_clean());

    let vorbis = fs::read(out_dir.join("music/theme.ogg")).unwrap();
    let packets = ogg_packets(&vorbis);
    assert!(String::from_utf8_lossy(&packets[1].0).contains("batch"));

    let opus = fs::read(out_dir.join("200.ogg")).unwrap();
    assert_eq!(&ogg_packets(&opus)[0].0[..8], b"OpusHead");

    let wav = fs::read(out_dir.join("sfx/step.wav")).unwrap();
    assert_eq!(&wav[..4], b"RIFF");
    assert!(!out_dir.join("400.wem").exists());
}

#[test]
fn test_vorbis_entry_without_library_fails_alone() {
    let (data, index) = bundle(&[(1, VorbisWem::default().build()), (2, ramp_adpcm_wem())]);
    let dir = tempfile::tempdir().unwrap();
    let no_names = |_: u64| -> Option<String> { None };

    let report = convert_all(
        &mut Cursor::new(data),
        &index,
        &no_names,
        &ConversionOptions::default(),
        None,
        dir.path(),
    )
    .unwrap();

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, 1);
    assert!(report.failed[0].1.contains("codebook"));
    assert!(dir.path().join("2.wav").exists());
}

#[test]
fn test_options_json_defaults() {
    let options: ConversionOptions = serde_json::from_str("{}").unwrap();
    assert_eq!(options, ConversionOptions::default());

    let options: ConversionOptions =
        serde_json::from_str(r#"{ "inline_codebooks": true, "force_packet_format": "ForceModPackets" }"#).unwrap();
    assert!(options.inline_codebooks);
    assert!(!options.needs_codebook_library());
    assert_eq!(options.force_packet_format, ForcePacketFormat::ForceModPackets);
    assert!(load_codebooks(&options).unwrap().is_none());
}
