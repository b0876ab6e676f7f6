//! Access point ranking against the credential store

use std::collections::VecDeque;

use crate::core::types::{Candidate, ScanResult};
use crate::store::KnownNetwork;

/// Join scan results with the known networks, strongest signal first.
///
/// Access points with no matching stored ssid are dropped. The sort is
/// stable, so equal-strength access points keep their scan order. An
/// empty queue means "nothing joinable this cycle" and signals the
/// caller to rescan after backoff; it is not an error.
pub fn rank(results: &[ScanResult], known: &[KnownNetwork]) -> VecDeque<Candidate> {
    let mut matched: Vec<(&ScanResult, &KnownNetwork)> = results
        .iter()
        .filter_map(|result| {
            known
                .iter()
                .find(|entry| entry.ssid == result.ssid)
                .map(|entry| (result, entry))
        })
        .collect();

    matched.sort_by(|(a, _), (b, _)| b.rssi.cmp(&a.rssi));

    matched
        .into_iter()
        .map(|(result, entry)| Candidate {
            ssid: entry.ssid.clone(),
            password: entry.password.clone(),
            username: entry.username.clone(),
            bssid: result.bssid,
            channel: result.channel,
            rssi: result.rssi,
            auth_mode: result.auth_mode,
        })
        .collect()
}
