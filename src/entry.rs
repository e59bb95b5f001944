use crate::error::{LinaError, Result};
use std::fmt;
use std::io::Read;

pub const MAGIC: &[u8; 4] = b"AA01";
pub const LEGACY_MAGIC: &[u8; 4] = b"YAA1";
pub const PREFIX_SIZE: usize = 6;
pub const MAX_HEADER_SIZE: usize = u16::MAX as usize;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldKey([u8; 3]);

impl FieldKey {
    pub const TYP: FieldKey = FieldKey(*b"TYP");
    pub const PAT: FieldKey = FieldKey(*b"PAT");
    pub const LNK: FieldKey = FieldKey(*b"LNK");
    pub const UID: FieldKey = FieldKey(*b"UID");
    pub const GID: FieldKey = FieldKey(*b"GID");
    pub const MOD: FieldKey = FieldKey(*b"MOD");
    pub const MTM: FieldKey = FieldKey(*b"MTM");
    pub const DAT: FieldKey = FieldKey(*b"DAT");

    pub fn parse(raw: [u8; 3]) -> Result<Self> {
        if raw
            .iter()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        {
            Ok(FieldKey(raw))
        } else {
            Err(LinaError::InvalidArchive(format!(
                "invalid field key {:?}",
                String::from_utf8_lossy(&raw)
            )))
        }
    }

    pub fn as_bytes(&self) -> &[u8; 3] {
        &self.0
    }
}

impl fmt::Debug for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Uint(u64),
    String(String),
    Blob(u64),
    Timespec { secs: u64, nanos: Option<u32> },
    Digest(Vec<u8>),
    Flag,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Field {
    key: FieldKey,
    value: FieldValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Directory,
    File,
    Symlink,
}

impl EntryType {
    pub fn code(self) -> u8 {
        match self {
            EntryType::Directory => b'D',
            EntryType::File => b'F',
            EntryType::Symlink => b'L',
        }
    }

    fn from_code(code: u64) -> Result<Self> {
        match u8::try_from(code).ok() {
            Some(b'D') => Ok(EntryType::Directory),
            Some(b'F') => Ok(EntryType::File),
            Some(b'L') => Ok(EntryType::Symlink),
            _ => Err(LinaError::InvalidArchive(format!(
                "unsupported entry type: {code}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryHeader {
    fields: Vec<Field>,
}

impl EntryHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: FieldKey, value: FieldValue) -> &mut Self {
        self.fields.push(Field { key, value });
        self
    }

    pub fn get(&self, key: FieldKey) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.key == key).map(|f| &f.value)
    }

    pub fn entry_type(&self) -> Result<EntryType> {
        match self.get(FieldKey::TYP) {
            Some(FieldValue::Uint(code)) => EntryType::from_code(*code),
            _ => Err(LinaError::InvalidArchive("entry without TYP field".into())),
        }
    }

    pub fn path(&self) -> Result<&str> {
        match self.get(FieldKey::PAT) {
            Some(FieldValue::String(path)) => Ok(path),
            _ => Err(LinaError::InvalidArchive("entry without PAT field".into())),
        }
    }

    pub fn link_target(&self) -> Option<&str> {
        match self.get(FieldKey::LNK) {
            Some(FieldValue::String(target)) => Some(target),
            _ => None,
        }
    }

    pub fn uint(&self, key: FieldKey) -> Option<u64> {
        match self.get(key) {
            Some(FieldValue::Uint(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn mode(&self) -> Option<u32> {
        self.uint(FieldKey::MOD)
            .and_then(|m| u32::try_from(m).ok())
    }

    pub fn modified(&self) -> Option<(u64, u32)> {
        match self.get(FieldKey::MTM) {
            Some(FieldValue::Timespec { secs, nanos }) => Some((*secs, nanos.unwrap_or(0))),
            _ => None,
        }
    }

    pub fn data_size(&self) -> u64 {
        match self.get(FieldKey::DAT) {
            Some(FieldValue::Blob(size)) => *size,
            _ => 0,
        }
    }

    pub fn blobs(&self) -> impl Iterator<Item = (FieldKey, u64)> + '_ {
        self.fields.iter().filter_map(|f| match f.value {
            FieldValue::Blob(size) => Some((f.key, size)),
            _ => None,
        })
    }

    pub fn blob_total(&self) -> Result<u64> {
        self.blobs().try_fold(0u64, |acc, (_, size)| {
            acc.checked_add(size)
                .ok_or_else(|| LinaError::InvalidArchive("blob sizes overflow".into()))
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&[0, 0]);
        for field in &self.fields {
            encode_field(&mut buf, field)?;
        }
        if buf.len() > MAX_HEADER_SIZE {
            return Err(LinaError::InvalidFormat(format!(
                "entry header too large: {} bytes",
                buf.len()
            )));
        }
        let size = buf.len() as u16;
        buf[4..6].copy_from_slice(&size.to_le_bytes());
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PREFIX_SIZE {
            return Err(LinaError::InvalidArchive("truncated entry header".into()));
        }
        check_magic(&bytes[0..4])?;
        let size = u16::from_le_bytes([bytes[4], bytes[5]]) as usize;
        if size != bytes.len() {
            return Err(LinaError::InvalidArchive(format!(
                "header size mismatch: declared {size}, got {}",
                bytes.len()
            )));
        }

        let mut cursor = FieldCursor {
            bytes: &bytes[PREFIX_SIZE..],
        };
        let mut header = EntryHeader::new();
        while !cursor.bytes.is_empty() {
            let raw_key = cursor.take(3)?;
            let key = FieldKey::parse([raw_key[0], raw_key[1], raw_key[2]])?;
            let subtype = cursor.take(1)?[0];
            let value = decode_value(subtype, key, &mut cursor)?;
            header.push(key, value);
        }
        Ok(header)
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Option<Self>> {
        let mut prefix = [0u8; PREFIX_SIZE];
        let first = read_some(reader, &mut prefix)?;
        if first == 0 {
            return Ok(None);
        }
        if first < PREFIX_SIZE {
            reader
                .read_exact(&mut prefix[first..])
                .map_err(|_| LinaError::InvalidArchive("truncated entry header".into()))?;
        }
        check_magic(&prefix[0..4])?;
        let size = u16::from_le_bytes([prefix[4], prefix[5]]) as usize;
        if size < PREFIX_SIZE {
            return Err(LinaError::InvalidArchive(format!(
                "invalid header size: {size}"
            )));
        }
        let mut bytes = vec![0u8; size];
        bytes[..PREFIX_SIZE].copy_from_slice(&prefix);
        reader
            .read_exact(&mut bytes[PREFIX_SIZE..])
            .map_err(|_| LinaError::InvalidArchive("truncated entry header".into()))?;
        Self::decode(&bytes).map(Some)
    }
}

pub fn looks_like_archive(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && (&bytes[0..4] == MAGIC || &bytes[0..4] == LEGACY_MAGIC)
}

fn check_magic(magic: &[u8]) -> Result<()> {
    if magic == MAGIC || magic == LEGACY_MAGIC {
        Ok(())
    } else {
        Err(LinaError::InvalidArchive("invalid entry magic".into()))
    }
}

fn read_some<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    loop {
        match reader.read(buf) {
            Ok(n) => return Ok(n),
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(LinaError::Io(err)),
        }
    }
}

fn encode_field(buf: &mut Vec<u8>, field: &Field) -> Result<()> {
    buf.extend_from_slice(field.key.as_bytes());
    match &field.value {
        FieldValue::Uint(v) => {
            let width = uint_width(*v);
            buf.push(b'0' + width as u8);
            buf.extend_from_slice(&v.to_le_bytes()[..width]);
        }
        FieldValue::String(s) => {
            let len = u16::try_from(s.len()).map_err(|_| {
                LinaError::InvalidFormat(format!("{} value too long", field.key))
            })?;
            buf.push(b'P');
            buf.extend_from_slice(&len.to_le_bytes());
            buf.extend_from_slice(s.as_bytes());
        }
        FieldValue::Blob(size) => {
            if let Ok(small) = u16::try_from(*size) {
                buf.push(b'A');
                buf.extend_from_slice(&small.to_le_bytes());
            } else if let Ok(medium) = u32::try_from(*size) {
                buf.push(b'B');
                buf.extend_from_slice(&medium.to_le_bytes());
            } else {
                buf.push(b'C');
                buf.extend_from_slice(&size.to_le_bytes());
            }
        }
        FieldValue::Timespec { secs, nanos } => match nanos {
            Some(nanos) => {
                buf.push(b'T');
                buf.extend_from_slice(&secs.to_le_bytes());
                buf.extend_from_slice(&nanos.to_le_bytes());
            }
            None => {
                buf.push(b'S');
                buf.extend_from_slice(&secs.to_le_bytes());
            }
        },
        FieldValue::Digest(digest) => {
            let subtype = match digest.len() {
                4 => b'F',
                20 => b'G',
                32 => b'H',
                48 => b'I',
                64 => b'J',
                other => {
                    return Err(LinaError::InvalidFormat(format!(
                        "unsupported digest length: {other}"
                    )))
                }
            };
            buf.push(subtype);
            buf.extend_from_slice(digest);
        }
        FieldValue::Flag => buf.push(b'*'),
    }
    Ok(())
}

fn uint_width(v: u64) -> usize {
    if v <= u8::MAX as u64 {
        1
    } else if v <= u16::MAX as u64 {
        2
    } else if v <= u32::MAX as u64 {
        4
    } else {
        8
    }
}

struct FieldCursor<'a> {
    bytes: &'a [u8],
}

impl<'a> FieldCursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.bytes.len() < n {
            return Err(LinaError::InvalidArchive("truncated field".into()));
        }
        let (head, rest) = self.bytes.split_at(n);
        self.bytes = rest;
        Ok(head)
    }

    fn uint(&mut self, width: usize) -> Result<u64> {
        let raw = self.take(width)?;
        let mut le = [0u8; 8];
        le[..width].copy_from_slice(raw);
        Ok(u64::from_le_bytes(le))
    }
}

fn decode_value(subtype: u8, key: FieldKey, cursor: &mut FieldCursor<'_>) -> Result<FieldValue> {
    let value = match subtype {
        b'1' | b'2' | b'4' | b'8' => FieldValue::Uint(cursor.uint((subtype - b'0') as usize)?),
        b'P' => {
            let len = cursor.uint(2)? as usize;
            let raw = cursor.take(len)?;
            let s = std::str::from_utf8(raw).map_err(|_| {
                LinaError::InvalidArchive(format!("{key} value is not valid UTF-8"))
            })?;
            FieldValue::String(s.to_string())
        }
        b'A' => FieldValue::Blob(cursor.uint(2)?),
        b'B' => FieldValue::Blob(cursor.uint(4)?),
        b'C' => FieldValue::Blob(cursor.uint(8)?),
        b'S' => FieldValue::Timespec {
            secs: cursor.uint(8)?,
            nanos: None,
        },
        b'T' => {
            let secs = cursor.uint(8)?;
            let nanos = cursor.uint(4)? as u32;
            if nanos >= 1_000_000_000 {
                return Err(LinaError::InvalidArchive(format!(
                    "{key} nanoseconds out of range"
                )));
            }
            FieldValue::Timespec {
                secs,
                nanos: Some(nanos),
            }
        }
        b'F' => FieldValue::Digest(cursor.take(4)?.to_vec()),
        b'G' => FieldValue::Digest(cursor.take(20)?.to_vec()),
        b'H' => FieldValue::Digest(cursor.take(32)?.to_vec()),
        b'I' => FieldValue::Digest(cursor.take(48)?.to_vec()),
        b'J' => FieldValue::Digest(cursor.take(64)?.to_vec()),
        b'*' => FieldValue::Flag,
        other => {
            return Err(LinaError::InvalidArchive(format!(
                "unknown subtype {:?} for {key}",
                other as char
            )))
        }
    };
    Ok(value)
}
