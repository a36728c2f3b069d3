// Copyright 2026 the Veneer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reports of handles that were never released.
//!
//! A handle that outlives the code that should have released it keeps its
//! compositor surface alive. [`write_report`] lists a client's live
//! handles grouped by callsite tag, largest group first, with the source
//! location that created each one.

use std::collections::BTreeMap;
use std::io::{self, Write};

use veneer_core::{Client, HandleInfo};

/// Label used for handles built without a callsite tag.
pub const UNTAGGED: &str = "<untagged>";

/// Groups handles by callsite tag. Each group keeps serial order.
#[must_use]
pub fn group_by_callsite(handles: &[HandleInfo]) -> BTreeMap<&str, Vec<&HandleInfo>> {
    let mut groups: BTreeMap<&str, Vec<&HandleInfo>> = BTreeMap::new();
    for h in handles {
        groups
            .entry(h.callsite.as_deref().unwrap_or(UNTAGGED))
            .or_default()
            .push(h);
    }
    groups
}

/// Writes the client's live handles and returns how many there were.
///
/// Writes nothing when every handle has been released.
pub fn write_report(client: &Client, writer: &mut dyn Write) -> io::Result<usize> {
    let handles = client.live_handles();
    if handles.is_empty() {
        return Ok(0);
    }

    let mut groups: Vec<_> = group_by_callsite(&handles).into_iter().collect();
    groups.sort_by(|(a_tag, a), (b_tag, b)| b.len().cmp(&a.len()).then(a_tag.cmp(b_tag)));

    writeln!(
        writer,
        "{} live surface handle(s) on client `{}`:",
        handles.len(),
        client.name()
    )?;
    for (callsite, group) in groups {
        writeln!(writer, "  {callsite} ({})", group.len())?;
        for h in group {
            writeln!(
                writer,
                "    #{} `{}` {:?} layer={} {} created at {}",
                h.serial,
                h.name,
                h.surface,
                h.layer_id,
                h.kind.as_str(),
                h.created_at,
            )?;
        }
    }
    Ok(handles.len())
}
