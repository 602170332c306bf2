use anyhow::Result;
use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

/// Return the current Unix epoch in seconds.
pub fn now_epoch_secs() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

pub fn union_sorted<I>(sets: I) -> Vec<String>
where
    I: IntoIterator<Item = BTreeSet<String>>,
{
    let mut out = BTreeSet::new();
    for set in sets {
        out.extend(set);
    }
    out.into_iter().collect()
}
