use std::borrow::Cow;
use std::io::{self, Write};

/// Header line plus continuation lines, byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Record {
    timestamp: i64,
    text: Vec<u8>,
}

impl Record {
    pub fn new(timestamp: i64, text: impl Into<Vec<u8>>) -> Self {
        Self {
            timestamp,
            text: text.into(),
        }
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn text(&self) -> &[u8] {
        &self.text
    }

    pub fn text_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.text)
    }

    pub(crate) fn push_line(&mut self, line: &[u8]) {
        self.text.extend_from_slice(line);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSequence {
    records: Vec<Record>,
}

impl RecordSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn byte_len(&self) -> usize {
        self.records.iter().map(|r| r.text.len()).sum()
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for record in &self.records {
            w.write_all(&record.text)?;
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        for record in &self.records {
            out.extend_from_slice(&record.text);
        }
        out
    }
}

impl From<Vec<Record>> for RecordSequence {
    fn from(records: Vec<Record>) -> Self {
        Self { records }
    }
}

impl FromIterator<Record> for RecordSequence {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a RecordSequence {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
