use crate::chatlog::record::{Record, RecordSequence};
use std::borrow::Cow;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket<'a> {
    pub timestamp: i64,
    pub texts: Vec<Cow<'a, [u8]>>,
}

// A record cut off at end of file matches its terminated copy.
fn dedup_key(text: &[u8]) -> &[u8] {
    text.strip_suffix(b"\n").unwrap_or(text)
}

fn terminated(text: &[u8]) -> Cow<'_, [u8]> {
    if text.ends_with(b"\n") {
        Cow::Borrowed(text)
    } else {
        let mut owned = Vec::with_capacity(text.len() + 1);
        owned.extend_from_slice(text);
        owned.push(b'\n');
        Cow::Owned(owned)
    }
}

// Sources are expected non-decreasing by timestamp.
#[derive(Debug, Clone)]
pub struct TimedStream<'a> {
    sources: Vec<&'a [Record]>,
}

impl<'a> TimedStream<'a> {
    pub fn new<I>(sources: I) -> Self
    where
        I: IntoIterator<Item = &'a RecordSequence>,
    {
        Self {
            sources: sources.into_iter().map(RecordSequence::records).collect(),
        }
    }

    fn min_head_timestamp(&self) -> Option<i64> {
        self.sources
            .iter()
            .filter_map(|source| source.first())
            .map(Record::timestamp)
            .min()
    }

    pub fn next_bucket(&mut self) -> Option<Bucket<'a>> {
        let timestamp = self.min_head_timestamp()?;

        let mut texts: Vec<Cow<'a, [u8]>> = Vec::new();
        let mut seen: HashSet<&'a [u8]> = HashSet::new();
        for source in &mut self.sources {
            let remaining: &'a [Record] = *source;
            let run = remaining
                .iter()
                .take_while(|record| record.timestamp() == timestamp)
                .count();
            let (head, rest) = remaining.split_at(run);
            for record in head {
                let text: &'a [u8] = record.text();
                if seen.insert(dedup_key(text)) {
                    texts.push(terminated(text));
                }
            }
            *source = rest;
        }

        Some(Bucket { timestamp, texts })
    }
}

impl<'a> Iterator for TimedStream<'a> {
    type Item = Bucket<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_bucket()
    }
}

pub fn merge<'a, I>(sources: I) -> RecordSequence
where
    I: IntoIterator<Item = &'a RecordSequence>,
{
    TimedStream::new(sources)
        .flat_map(|bucket| {
            let timestamp = bucket.timestamp;
            bucket
                .texts
                .into_iter()
                .map(move |text| Record::new(timestamp, text))
        })
        .collect()
}
