//! History correlator
//!
//! Interval-containment join between the visit timeline and the session set.
//! A visit is attached to the first session (by ascending id) whose
//! `[start, stop]` interval contains its timestamp, bounds inclusive. Every
//! visit appears exactly once in the output; unmatched visits carry no proxy.
//!
//! The join is a sorted sweep: visits are walked in time order while sessions
//! enter an active set as their start is reached and leave it once their stop
//! has passed.

use crate::types::{CorrelatedRecord, Session, Visit};
use std::collections::BTreeMap;

/// Join visits against sessions. Output is ordered by ascending visit time.
pub fn correlate(visits: &[Visit], sessions: &[Session]) -> Vec<CorrelatedRecord> {
    let mut ordered_visits: Vec<&Visit> = visits.iter().collect();
    ordered_visits.sort_by_key(|v| (v.timestamp, v.id));

    let mut by_start: Vec<&Session> = sessions.iter().collect();
    by_start.sort_by_key(|s| (s.start, s.id));

    // session id -> session, for sessions whose start has been reached
    let mut active: BTreeMap<i64, &Session> = BTreeMap::new();
    let mut next_session = 0;
    let mut records = Vec::with_capacity(visits.len());

    for visit in ordered_visits {
        let ts = visit.timestamp;

        while next_session < by_start.len() && by_start[next_session].start <= ts {
            let session = by_start[next_session];
            active.insert(session.id, session);
            next_session += 1;
        }
        // Visit times only grow, so a passed stop never matches again.
        active.retain(|_, session| session.stop >= ts);

        let proxy_attributes = active
            .values()
            .next()
            .map(|session| session.proxy().unwrap_or_default().to_string());

        records.push(CorrelatedRecord {
            visit_time: ts,
            url: visit.url.clone(),
            title: visit.title.clone(),
            proxy_attributes,
        });
    }

    tracing::info!(
        visits = records.len(),
        matched = records.iter().filter(|r| r.is_matched()).count(),
        "History correlated"
    );
    records
}
