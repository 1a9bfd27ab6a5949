mod common;

use common::init_logging;
use std::fs;
use std::io::{BufReader, Cursor};
use std::path::{Path, PathBuf};
use wemkit::{CodebookLibrary, Codec, ConversionOptions, OutputFormat, WemDecoder};

fn collect_files(dir: &Path, ext: &str, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, ext, out);
        } else if path.extension().is_some_and(|e| e.eq_ignore_ascii_case(ext)) {
            out.push(path);
        }
    }
}

/// Converts every `.wem` under `test_assets/wem` and checks that the
/// output parses. The codebook library is looked up in the same directory.
#[test]
fn test_convert_real_assets() {
    init_logging();
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let asset_dir = manifest_dir.join("../../test_assets/wem");
    if !asset_dir.exists() {
        println!("Skipping asset round-trip: directory not found at {:?}", asset_dir);
        return;
    }

    let mut wem_files = Vec::new();
    collect_files(&asset_dir, "wem", &mut wem_files);
    if wem_files.is_empty() {
        println!("Skipping asset round-trip: no WEM files found");
        return;
    }

    let options = ConversionOptions::default().with_codebooks_path(asset_dir.join(wemkit::options::DEFAULT_CODEBOOKS_FILE));
    let library = CodebookLibrary::from_file(options.resolved_codebooks_path()).ok();
    if library.is_none() {
        println!("No codebook library in {:?}, Vorbis files will be skipped", asset_dir);
    }

    let mut converted = 0;
    for path in &wem_files {
        let file = BufReader::new(fs::File::open(path).unwrap());
        let mut decoder = match WemDecoder::open(file, &options, library.as_ref()) {
            Ok(decoder) => decoder,
            Err(e) if library.is_none() => {
                println!("  Skipped {:?}: {}", path, e);
                continue;
            }
            Err(e) => panic!("failed to open {:?}: {}", path, e),
        };

        let mut out = Vec::new();
        decoder
            .decode(&mut out)
            .unwrap_or_else(|e| panic!("failed to convert {:?}: {}", path, e));

        match decoder.output_format() {
            OutputFormat::Ogg => {
                let mut reader = ogg::PacketReader::new(Cursor::new(&out));
                let mut packets = 0;
                while let Some(packet) = reader.read_packet().unwrap() {
                    packets += 1;
                    if packet.last_in_stream() {
                        break;
                    }
                }
                let expected = if decoder.codec() == Codec::Vorbis { 3 } else { 2 };
                assert!(packets > expected, "{:?} has no audio packets", path);
            }
            OutputFormat::Wav => {
                let reader = hound::WavReader::new(Cursor::new(&out)).unwrap();
                assert_eq!(reader.spec().bits_per_sample, 16);
            }
            OutputFormat::Wem => assert_eq!(&out[..4], b"RIFF"),
        }
        converted += 1;
    }

    println!("Converted {} of {} WEM files", converted, wem_files.len());
}
