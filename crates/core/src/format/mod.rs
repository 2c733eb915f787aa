//! Persisted representations of a [`Record`].
//!
//! [`BinaryFormat`] is the interchange contract: any two builds agree on the
//! byte layout of files carrying the same version tag. [`JsonFormat`] is a
//! human-readable export that follows the same versioning rule.

use std::{
    fs,
    io::{self, Cursor, Read},
    path::Path,
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::{Event, EventKind, InputAction, MouseButton, Record, RecorderError, Result};

/// Newest layout version this build reads and the one it writes.
pub const FORMAT_VERSION: u16 = 1;

const MAGIC: &[u8; 4] = b"MREC";
const HEADER_LEN: usize = 4 + 2 + 8 + 4;
// Smallest encoded event: tag + offset + wheel delta.
const MIN_EVENT_LEN: usize = 1 + 8 + 4;
// Largest encoded event: tag + offset + x + y + button code + raw id.
const MAX_EVENT_LEN: usize = 1 + 8 + 4 + 4 + 1 + 1;

const TAG_MOVE: u8 = 1;
const TAG_PRESS: u8 = 2;
const TAG_RELEASE: u8 = 3;
const TAG_WHEEL: u8 = 4;

/// Stateless codec between a [`Record`] and bytes.
pub trait RecordFormat: Send + Sync {
    fn name(&self) -> &'static str;

    /// File extension (without the dot) conventionally used by the format.
    fn extension(&self) -> &'static str;

    fn save(&self, record: &Record) -> Result<Vec<u8>>;

    fn load(&self, bytes: &[u8]) -> Result<Record>;
}

/// Little-endian binary layout:
///
/// ```text
/// "MREC" | version: u16 | created_at: u64 | count: u32 | event*
/// event  = tag: u8 | offset: u64 | payload
///   move         : x: i32 | y: i32
///   press/release: x: i32 | y: i32 | button code: u8 | raw id: u8
///   wheel        : delta: i32
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct BinaryFormat;

impl RecordFormat for BinaryFormat {
    fn name(&self) -> &'static str {
        "binary"
    }

    fn extension(&self) -> &'static str {
        "mrec"
    }

    fn save(&self, record: &Record) -> Result<Vec<u8>> {
        let count = u32::try_from(record.len())
            .map_err(|_| RecorderError::msg("record holds too many events to encode"))?;

        let mut out = Vec::with_capacity(HEADER_LEN + record.len() * MAX_EVENT_LEN);
        out.extend_from_slice(MAGIC);
        out.write_u16::<LittleEndian>(FORMAT_VERSION)?;
        out.write_u64::<LittleEndian>(record.created_at_millis())?;
        out.write_u32::<LittleEndian>(count)?;

        for event in record.events() {
            write_event(&mut out, event)?;
        }
        Ok(out)
    }

    fn load(&self, bytes: &[u8]) -> Result<Record> {
        let mut r = Cursor::new(bytes);

        let mut magic = [0u8; 4];
        r.read_exact(&mut magic).map_err(truncated("magic"))?;
        if &magic != MAGIC {
            return Err(RecorderError::corrupt("missing MREC magic"));
        }

        let version = r.read_u16::<LittleEndian>().map_err(truncated("version"))?;
        check_version(version)?;

        let created_at_millis = r.read_u64::<LittleEndian>().map_err(truncated("created-at"))?;
        let count = r.read_u32::<LittleEndian>().map_err(truncated("event count"))? as usize;
        if remaining(&r) < count.saturating_mul(MIN_EVENT_LEN) {
            return Err(RecorderError::corrupt(format!(
                "declared {count} events but only {} bytes follow",
                remaining(&r)
            )));
        }

        let mut events = Vec::with_capacity(count);
        for index in 0..count {
            events.push(read_event(&mut r, index)?);
        }

        if remaining(&r) != 0 {
            return Err(RecorderError::corrupt(format!(
                "{} trailing bytes after {count} events",
                remaining(&r)
            )));
        }

        Record::from_events(created_at_millis, events)
    }
}

fn write_event(w: &mut Vec<u8>, event: &Event) -> io::Result<()> {
    let tag = match event.kind() {
        EventKind::PointerMove => TAG_MOVE,
        EventKind::ButtonPress => TAG_PRESS,
        EventKind::ButtonRelease => TAG_RELEASE,
        EventKind::Wheel => TAG_WHEEL,
    };
    w.write_u8(tag)?;
    w.write_u64::<LittleEndian>(event.offset_millis())?;

    match *event.action() {
        InputAction::PointerMove { x, y } => {
            w.write_i32::<LittleEndian>(x)?;
            w.write_i32::<LittleEndian>(y)?;
        }
        InputAction::ButtonPress { x, y, button } | InputAction::ButtonRelease { x, y, button } => {
            w.write_i32::<LittleEndian>(x)?;
            w.write_i32::<LittleEndian>(y)?;
            w.write_u8(button.code())?;
            w.write_u8(button.raw_id())?;
        }
        InputAction::Wheel { delta } => w.write_i32::<LittleEndian>(delta)?,
    }
    Ok(())
}

fn read_event(r: &mut Cursor<&[u8]>, index: usize) -> Result<Event> {
    let tag = r.read_u8().map_err(truncated("event tag"))?;
    let offset = r.read_u64::<LittleEndian>().map_err(truncated("event offset"))?;

    let action = match tag {
        TAG_MOVE => {
            let (x, y) = read_position(r)?;
            InputAction::PointerMove { x, y }
        }
        TAG_PRESS | TAG_RELEASE => {
            let (x, y) = read_position(r)?;
            let code = r.read_u8().map_err(truncated("button code"))?;
            let raw_id = r.read_u8().map_err(truncated("button id"))?;
            let button = MouseButton::from_code(code, raw_id).ok_or_else(|| {
                RecorderError::corrupt(format!("event {index}: unknown button code {code}"))
            })?;
            if tag == TAG_PRESS {
                InputAction::ButtonPress { x, y, button }
            } else {
                InputAction::ButtonRelease { x, y, button }
            }
        }
        TAG_WHEEL => InputAction::Wheel {
            delta: r.read_i32::<LittleEndian>().map_err(truncated("wheel delta"))?,
        },
        other => {
            return Err(RecorderError::corrupt(format!(
                "event {index}: unknown kind tag {other}"
            )))
        }
    };

    Ok(Event::new(offset, action))
}

fn read_position(r: &mut Cursor<&[u8]>) -> Result<(i32, i32)> {
    let x = r.read_i32::<LittleEndian>().map_err(truncated("x"))?;
    let y = r.read_i32::<LittleEndian>().map_err(truncated("y"))?;
    Ok((x, y))
}

fn remaining(r: &Cursor<&[u8]>) -> usize {
    r.get_ref().len().saturating_sub(r.position() as usize)
}

/// Maps a short read to [`RecorderError::CorruptData`]; other IO errors pass
/// through unchanged.
fn truncated(field: &'static str) -> impl Fn(io::Error) -> RecorderError {
    move |err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            RecorderError::corrupt(format!("truncated input while reading {field}"))
        } else {
            RecorderError::Io(err)
        }
    }
}

fn check_version(version: u16) -> Result<()> {
    if version == 0 {
        return Err(RecorderError::corrupt("format version 0 is not valid"));
    }
    if version > FORMAT_VERSION {
        return Err(RecorderError::UnsupportedVersion {
            found: version,
            supported: FORMAT_VERSION,
        });
    }
    Ok(())
}

/// Pretty-printed JSON export wrapped in a versioned envelope.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFormat;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u16,
    record: &'a Record,
}

#[derive(Deserialize)]
struct Envelope {
    version: u16,
    record: serde_json::Value,
}

#[derive(Deserialize)]
struct RawRecord {
    created_at_millis: u64,
    events: Vec<Event>,
}

impl RecordFormat for JsonFormat {
    fn name(&self) -> &'static str {
        "json"
    }

    fn extension(&self) -> &'static str {
        "json"
    }

    fn save(&self, record: &Record) -> Result<Vec<u8>> {
        let envelope = EnvelopeRef {
            version: FORMAT_VERSION,
            record,
        };
        Ok(serde_json::to_vec_pretty(&envelope)?)
    }

    fn load(&self, bytes: &[u8]) -> Result<Record> {
        let envelope: Envelope = serde_json::from_slice(bytes)
            .map_err(|err| RecorderError::corrupt(format!("invalid JSON record: {err}")))?;
        check_version(envelope.version)?;

        let raw: RawRecord = serde_json::from_value(envelope.record)
            .map_err(|err| RecorderError::corrupt(format!("invalid JSON record: {err}")))?;
        Record::from_events(raw.created_at_millis, raw.events)
    }
}

/// Picks a codec from the file extension; anything other than `.json` is
/// treated as the binary format.
pub fn format_for_path(path: &Path) -> &'static dyn RecordFormat {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => &JsonFormat,
        _ => &BinaryFormat,
    }
}

pub fn save_to_path(record: &Record, path: &Path) -> Result<()> {
    let format = format_for_path(path);
    let bytes = format.save(record)?;
    fs::write(path, bytes)?;
    tracing::info!(?path, format = format.name(), events = record.len(), "saved record");
    Ok(())
}

pub fn load_from_path(path: &Path) -> Result<Record> {
    let format = format_for_path(path);
    let bytes = fs::read(path)?;
    let record = format.load(&bytes)?;
    tracing::info!(?path, format = format.name(), events = record.len(), "loaded record");
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> Record {
        Record::from_events(
            1_700_000_000_000,
            vec![
                Event::pointer_move(0, 10, 10),
                Event::button_press(50, 10, 10, MouseButton::Left),
                Event::button_release(120, 10, 10, MouseButton::Left),
                Event::button_press(120, -5, 2048, MouseButton::Other(8)),
                Event::wheel(300, -3),
            ],
        )
        .unwrap()
    }

    #[test]
    fn binary_round_trips_every_kind() {
        let record = sample_record();
        let bytes = BinaryFormat.save(&record).unwrap();
        assert_eq!(BinaryFormat.load(&bytes).unwrap(), record);
    }

    #[test]
    fn binary_round_trips_empty_record() {
        let record = Record::with_created_at(42);
        let bytes = BinaryFormat.save(&record).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(BinaryFormat.load(&bytes).unwrap(), record);
    }

    #[test]
    fn binary_encoding_is_deterministic() {
        let record = sample_record();
        assert_eq!(
            BinaryFormat.save(&record).unwrap(),
            BinaryFormat.save(&record.clone()).unwrap()
        );
    }

    #[test]
    fn header_layout_is_stable() {
        let bytes = BinaryFormat.save(&Record::with_created_at(1)).unwrap();
        assert_eq!(&bytes[..4], b"MREC");
        assert_eq!(&bytes[4..6], &[1, 0]);
        assert_eq!(&bytes[6..14], &[1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&bytes[14..18], &[0, 0, 0, 0]);
    }

    #[test]
    fn truncated_input_is_corrupt() {
        let bytes = BinaryFormat.save(&sample_record()).unwrap();
        for len in [0, 3, 10, HEADER_LEN, bytes.len() - 1] {
            let err = BinaryFormat.load(&bytes[..len]).unwrap_err();
            assert!(
                matches!(err, RecorderError::CorruptData(_)),
                "length {len} produced {err:?}"
            );
        }
    }

    #[test]
    fn trailing_bytes_are_corrupt() {
        let mut bytes = BinaryFormat.save(&sample_record()).unwrap();
        bytes.push(0);
        assert!(matches!(
            BinaryFormat.load(&bytes),
            Err(RecorderError::CorruptData(_))
        ));
    }

    #[test]
    fn inflated_event_count_is_corrupt() {
        let mut bytes = BinaryFormat.save(&Record::with_created_at(0)).unwrap();
        bytes[14..18].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            BinaryFormat.load(&bytes),
            Err(RecorderError::CorruptData(_))
        ));
    }

    #[test]
    fn newer_version_is_unsupported() {
        let mut bytes = BinaryFormat.save(&sample_record()).unwrap();
        bytes[4..6].copy_from_slice(&(FORMAT_VERSION + 1).to_le_bytes());
        match BinaryFormat.load(&bytes) {
            Err(RecorderError::UnsupportedVersion { found, supported }) => {
                assert_eq!(found, FORMAT_VERSION + 1);
                assert_eq!(supported, FORMAT_VERSION);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn version_zero_is_corrupt() {
        let mut bytes = BinaryFormat.save(&sample_record()).unwrap();
        bytes[4..6].copy_from_slice(&[0, 0]);
        match BinaryFormat.load(&bytes) {
            Err(RecorderError::CorruptData(reason)) => assert!(reason.contains("version 0")),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn unknown_button_code_is_corrupt() {
        let mut bytes = BinaryFormat.save(&sample_record()).unwrap();
        // Second event is the press; its button code follows tag, offset, x and y.
        let code_at = HEADER_LEN + 17 + 1 + 8 + 4 + 4;
        assert_eq!(bytes[code_at], MouseButton::Left.code());
        bytes[code_at] = 7;
        match BinaryFormat.load(&bytes) {
            Err(RecorderError::CorruptData(reason)) => {
                assert!(reason.contains("unknown button code 7"), "{reason}")
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn encoded_size_stays_within_event_bounds() {
        let record = sample_record();
        let bytes = BinaryFormat.save(&record).unwrap();
        assert!(bytes.len() >= HEADER_LEN + record.len() * MIN_EVENT_LEN);
        assert!(bytes.len() <= HEADER_LEN + record.len() * MAX_EVENT_LEN);
    }

    #[test]
    fn unknown_tag_and_bad_magic_are_corrupt() {
        let mut bytes = BinaryFormat.save(&sample_record()).unwrap();
        bytes[HEADER_LEN] = 9;
        assert!(matches!(
            BinaryFormat.load(&bytes),
            Err(RecorderError::CorruptData(_))
        ));

        let mut bytes = BinaryFormat.save(&sample_record()).unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            BinaryFormat.load(&bytes),
            Err(RecorderError::CorruptData(_))
        ));
    }

    #[test]
    fn decreasing_offsets_are_corrupt() {
        let mut bytes = BinaryFormat.save(&sample_record()).unwrap();
        // First event moved past the second one.
        let first_offset = HEADER_LEN + 1;
        bytes[first_offset..first_offset + 8].copy_from_slice(&500u64.to_le_bytes());
        assert!(matches!(
            BinaryFormat.load(&bytes),
            Err(RecorderError::CorruptData(_))
        ));
    }

    #[test]
    fn json_round_trips_and_checks_version() {
        let record = sample_record();
        let bytes = JsonFormat.save(&record).unwrap();
        assert_eq!(JsonFormat.load(&bytes).unwrap(), record);

        let text = String::from_utf8(bytes).unwrap();
        let newer = text.replacen("\"version\": 1", "\"version\": 2", 1);
        assert!(matches!(
            JsonFormat.load(newer.as_bytes()),
            Err(RecorderError::UnsupportedVersion { found: 2, .. })
        ));
        assert!(matches!(
            JsonFormat.load(b"{\"version\": 1"),
            Err(RecorderError::CorruptData(_))
        ));
    }

    #[test]
    fn files_use_codec_matching_extension() {
        let dir = tempfile::tempdir().unwrap();
        let record = sample_record();

        let binary = dir.path().join("session.mrec");
        save_to_path(&record, &binary).unwrap();
        assert_eq!(&fs::read(&binary).unwrap()[..4], b"MREC");
        assert_eq!(load_from_path(&binary).unwrap(), record);

        let json = dir.path().join("session.JSON");
        save_to_path(&record, &json).unwrap();
        assert_eq!(fs::read(&json).unwrap()[0], b'{');
        assert_eq!(load_from_path(&json).unwrap(), record);
    }
}
