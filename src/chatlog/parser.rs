use crate::chatlog::record::{Record, RecordSequence};
use chrono::{Local, NaiveDate, NaiveDateTime, Offset, TimeZone};
use std::io::{self, BufRead};

/// Offset of the closing bracket of a `[YYYY/MM/DD HH:MM]` header.
const HEADER_CLOSE: usize = 17;

fn two_digits(bytes: &[u8]) -> Option<u32> {
    match bytes {
        [a, b] if a.is_ascii_digit() && b.is_ascii_digit() => {
            Some(u32::from(a - b'0') * 10 + u32::from(b - b'0'))
        }
        _ => None,
    }
}

fn parse_stamp(stamp: &[u8]) -> Option<NaiveDateTime> {
    if stamp.len() != 16
        || stamp[4] != b'/'
        || stamp[7] != b'/'
        || stamp[10] != b' '
        || stamp[13] != b':'
    {
        return None;
    }
    let year = u32::from(two_digits(&stamp[0..2])?) * 100 + two_digits(&stamp[2..4])?;
    let month = two_digits(&stamp[5..7])?;
    let day = two_digits(&stamp[8..10])?;
    let hour = two_digits(&stamp[11..13])?;
    let minute = two_digits(&stamp[14..16])?;

    NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day)?.and_hms_opt(hour, minute, 0)
}

fn to_epoch<Tz: TimeZone>(tz: &Tz, naive: &NaiveDateTime) -> i64 {
    match tz.from_local_datetime(naive).earliest() {
        Some(dt) => dt.timestamp(),
        // Wall-clock time skipped by a DST jump: shift by the offset in force
        // at that instant so the value stays deterministic.
        None => {
            let offset = tz.offset_from_utc_datetime(naive).fix();
            naive.and_utc().timestamp() - i64::from(offset.local_minus_utc())
        }
    }
}

pub fn header_timestamp<Tz: TimeZone>(line: &[u8], tz: &Tz) -> Option<i64> {
    if line.len() <= HEADER_CLOSE || line[0] != b'[' || line[HEADER_CLOSE] != b']' {
        return None;
    }
    let naive = parse_stamp(&line[1..HEADER_CLOSE])?;
    Some(to_epoch(tz, &naive))
}

pub fn read_records<R: BufRead>(reader: R) -> io::Result<RecordSequence> {
    read_records_in(reader, &Local)
}

pub fn read_records_in<R: BufRead, Tz: TimeZone>(
    mut reader: R,
    tz: &Tz,
) -> io::Result<RecordSequence> {
    let mut out = RecordSequence::new();
    let mut current: Option<Record> = None;
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }

        if let Some(timestamp) = header_timestamp(&line, tz) {
            if let Some(done) = current.take() {
                out.push(done);
            }
            current = Some(Record::new(timestamp, line.as_slice()));
            continue;
        }

        // Continuation lines before the first header have no owner; dropped.
        if let Some(record) = current.as_mut() {
            record.push_line(&line);
        }
    }

    if let Some(done) = current {
        out.push(done);
    }
    Ok(out)
}
