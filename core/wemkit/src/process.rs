//! Batch conversion of entries stored inside a larger bundle.
//!
//! The bundle index and the id-to-name table are supplied by the caller
//! through [`EntrySource`] and [`NameResolver`]; this module only windows
//! the bundle, converts each entry and writes the results.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

use crate::codebook::CodebookLibrary;
use crate::decoder::{OutputFormat, WemDecoder};
use crate::options::ConversionOptions;

/// Supplies `(id, byte range)` pairs, one per embedded stream.
pub trait EntrySource {
    fn entries(&self) -> Result<Vec<(u64, Range<u64>)>>;
}

impl EntrySource for [(u64, Range<u64>)] {
    fn entries(&self) -> Result<Vec<(u64, Range<u64>)>> {
        Ok(self.to_vec())
    }
}

impl EntrySource for Vec<(u64, Range<u64>)> {
    fn entries(&self) -> Result<Vec<(u64, Range<u64>)>> {
        Ok(self.clone())
    }
}

/// Maps an entry id to a relative output path.
pub trait NameResolver {
    fn resolve(&self, id: u64) -> Option<String>;
}

impl<F: Fn(u64) -> Option<String>> NameResolver for F {
    fn resolve(&self, id: u64) -> Option<String> {
        self(id)
    }
}

/// A `Read + Seek` view of `range` inside `inner`.
///
/// Positions are relative to the start of the window and reads stop at
/// its end.
pub struct EntryReader<R: Read + Seek> {
    inner: R,
    start: u64,
    len: u64,
    pos: u64,
}

impl<R: Read + Seek> EntryReader<R> {
    pub fn new(mut inner: R, range: Range<u64>) -> io::Result<Self> {
        if range.end < range.start {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("inverted entry range {}..{}", range.start, range.end),
            ));
        }
        inner.seek(SeekFrom::Start(range.start))?;
        Ok(Self {
            inner,
            start: range.start,
            len: range.end - range.start,
            pos: 0,
        })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> Read for EntryReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.len.saturating_sub(self.pos);
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = (buf.len() as u64).min(remaining) as usize;
        let n = self.inner.read(&mut buf[..max])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for EntryReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before the start of the entry")
        })?;

        self.inner.seek(SeekFrom::Start(self.start + target))?;
        self.pos = target;
        Ok(target)
    }
}

/// Result of converting one entry, before it is written anywhere.
#[derive(Debug)]
pub struct ConvertedEntry {
    pub id: u64,
    pub format: OutputFormat,
    /// Display name recovered from the entry's own `LIST` labels.
    pub label: Option<String>,
    pub bytes: Vec<u8>,
}

/// Outcome of [`convert_all`].
#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub converted: Vec<(u64, PathBuf)>,
    pub failed: Vec<(u64, String)>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Load the codebook library named by `options` when Vorbis conversion needs one.
pub fn load_codebooks(options: &ConversionOptions) -> Result<Option<CodebookLibrary>> {
    if !options.needs_codebook_library() {
        return Ok(None);
    }
    let path = options.resolved_codebooks_path();
    let library = CodebookLibrary::from_file(&path)
        .with_context(|| format!("Failed to load codebooks from {:?}", path))?;
    Ok(Some(library))
}

/// Convert the entry at `range` of `input`.
pub fn convert_entry<R: Read + Seek>(
    input: R,
    id: u64,
    range: Range<u64>,
    options: &ConversionOptions,
    codebooks: Option<&CodebookLibrary>,
) -> Result<ConvertedEntry> {
    let reader = EntryReader::new(input, range).with_context(|| format!("Failed to window entry {id}"))?;
    let mut decoder = WemDecoder::open(reader, options, codebooks)
        .with_context(|| format!("Failed to open entry {id}"))?;

    let format = decoder.output_format();
    let label = decoder.riff().label();

    let mut bytes = Vec::new();
    decoder
        .decode(&mut bytes)
        .with_context(|| format!("Failed to convert entry {id}"))?;

    Ok(ConvertedEntry {
        id,
        format,
        label,
        bytes,
    })
}

/// Convert every entry of `source` into `out_dir`.
///
/// A failing entry is logged and recorded in the report; the batch goes on.
/// Only errors that concern the whole batch are returned.
pub fn convert_all<R, S, N>(
    input: &mut R,
    source: &S,
    names: &N,
    options: &ConversionOptions,
    codebooks: Option<&CodebookLibrary>,
    out_dir: &Path,
) -> Result<BatchReport>
where
    R: Read + Seek,
    S: EntrySource + ?Sized,
    N: NameResolver + ?Sized,
{
    let entries = source.entries().context("Failed to list bundle entries")?;
    fs::create_dir_all(out_dir).with_context(|| format!("Failed to create {:?}", out_dir))?;

    let mut report = BatchReport::default();
    for (id, range) in entries {
        match convert_one(&mut *input, id, range, names, options, codebooks, out_dir) {
            Ok(path) => {
                debug!(id, path = ?path, "converted entry");
                report.converted.push((id, path));
            }
            Err(e) => {
                let message = format!("{e:#}");
                warn!(id, error = %message, "skipping entry");
                report.failed.push((id, message));
            }
        }
    }

    info!(
        converted = report.converted.len(),
        failed = report.failed.len(),
        "batch finished"
    );
    Ok(report)
}

fn convert_one<R: Read + Seek, N: NameResolver + ?Sized>(
    input: &mut R,
    id: u64,
    range: Range<u64>,
    names: &N,
    options: &ConversionOptions,
    codebooks: Option<&CodebookLibrary>,
    out_dir: &Path,
) -> Result<PathBuf> {
    let entry = convert_entry(input, id, range, options, codebooks)?;

    let name = names
        .resolve(id)
        .or_else(|| entry.label.clone())
        .unwrap_or_else(|| id.to_string());
    let path = out_dir.join(output_name(&name, id, entry.format));

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {:?}", parent))?;
    }
    fs::write(&path, &entry.bytes).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(path)
}

/// Relative output path for `name`, confined to the output directory.
fn output_name(name: &str, id: u64, format: OutputFormat) -> PathBuf {
    let mut path: PathBuf = Path::new(name)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect();

    if path.as_os_str().is_empty() {
        path = PathBuf::from(id.to_string());
    }
    path.set_extension(format.extension());
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{LittleEndian, WriteBytesExt};
    use std::io::Cursor;

    fn pcm_wem(payload: &[u8]) -> Vec<u8> {
        let mut body = b"WAVE".to_vec();
        body.extend_from_slice(b"fmt ");
        body.write_u32::<LittleEndian>(16).unwrap();
        body.write_u16::<LittleEndian>(1).unwrap();
        body.write_u16::<LittleEndian>(1).unwrap();
        body.write_u32::<LittleEndian>(8000).unwrap();
        body.write_u32::<LittleEndian>(16000).unwrap();
        body.write_u16::<LittleEndian>(2).unwrap();
        body.write_u16::<LittleEndian>(16).unwrap();
        body.extend_from_slice(b"data");
        body.write_u32::<LittleEndian>(payload.len() as u32).unwrap();
        body.extend_from_slice(payload);

        let mut out = b"RIFF".to_vec();
        out.write_u32::<LittleEndian>(body.len() as u32).unwrap();
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn test_entry_reader_window() {
        let data: Vec<u8> = (0u8..32).collect();
        let mut reader = EntryReader::new(Cursor::new(data), 8..16).unwrap();
        assert_eq!(reader.len(), 8);

        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, (8u8..16).collect::<Vec<_>>());

        assert_eq!(reader.seek(SeekFrom::End(-2)).unwrap(), 6);
        let mut two = [0u8; 4];
        let n = reader.read(&mut two).unwrap();
        assert_eq!(&two[..n], &[14, 15]);

        assert_eq!(reader.seek(SeekFrom::Current(-8)).unwrap(), 0);
        assert!(reader.seek(SeekFrom::Current(-1)).is_err());
        assert_eq!(reader.stream_position().unwrap(), 0);
    }

    #[test]
    fn test_entry_reader_rejects_inverted_range() {
        let result = EntryReader::new(Cursor::new(vec![0u8; 4]), 3..1);
        assert!(result.is_err());
    }

    #[test]
    fn test_output_name_stays_inside() {
        assert_eq!(output_name("../../etc/passwd", 1, OutputFormat::Ogg), PathBuf::from("etc/passwd.ogg"));
        assert_eq!(output_name("Music/theme.wem", 2, OutputFormat::Wav), PathBuf::from("Music/theme.wav"));
        assert_eq!(output_name("/", 3, OutputFormat::Wem), PathBuf::from("3.wem"));
    }

    #[test]
    fn test_convert_entry_inside_bundle() {
        let wem = pcm_wem(&[9, 9]);
        let mut bundle = vec![0xAAu8; 5];
        bundle.extend_from_slice(&wem);
        bundle.extend_from_slice(&[0xBB; 3]);

        let range = 5..5 + wem.len() as u64;
        let entry = convert_entry(Cursor::new(bundle), 42, range, &ConversionOptions::default(), None).unwrap();
        assert_eq!(entry.id, 42);
        assert_eq!(entry.format, OutputFormat::Wem);
        assert_eq!(entry.bytes, wem);
    }

    #[test]
    fn test_convert_all_continues_after_failure() {
        let first = pcm_wem(&[1, 2]);
        let second = pcm_wem(&[3, 4, 5, 6]);
        let mut bundle = first.clone();
        bundle.extend_from_slice(b"garbage!");
        bundle.extend_from_slice(&second);

        let a = first.len() as u64;
        let b = a + 8;
        let entries = vec![(1u64, 0..a), (2, a..b), (3, b..b + second.len() as u64)];
        let names = |id: u64| (id == 3).then(|| "sfx/third".to_string());

        let dir = tempfile::tempdir().unwrap();
        let mut input = Cursor::new(bundle);
        let report = convert_all(
            &mut input,
            &entries,
            &names,
            &ConversionOptions::default(),
            None,
            dir.path(),
        )
        .unwrap();

        assert!(!report.is_clean());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, 2);
        assert_eq!(report.converted.len(), 2);

        assert_eq!(fs::read(dir.path().join("1.wem")).unwrap(), first);
        assert_eq!(fs::read(dir.path().join("sfx/third.wem")).unwrap(), second);
    }

    #[test]
    fn test_load_codebooks_skipped_for_inline() {
        let options = ConversionOptions::default().with_inline_codebooks(true);
        assert!(load_codebooks(&options).unwrap().is_none());

        let options = ConversionOptions::default().with_codebooks_path("/nonexistent/packed_codebooks.bin");
        assert!(load_codebooks(&options).is_err());
    }
}
