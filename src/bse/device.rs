// Step 6: device consistency — penalize a user-agent or device hash that
// doesn't match the dominant one seen in the recent-activity window.

use std::collections::HashMap;

use crate::model::FingerprintRecord;

const DEVICE_CHURN_THRESHOLD: usize = 3;

pub fn score(current_user_agent: &str, recent: &[FingerprintRecord]) -> (f64, Vec<&'static str>) {
    if recent.is_empty() {
        return (0.0, vec![]);
    }

    let mut delta = 0.0;
    let mut flags = Vec::new();

    let dominant_ua = most_common(recent.iter().map(|r| r.user_agent.as_str()));
    if let Some(dominant) = dominant_ua {
        if dominant != current_user_agent {
            delta -= 10.0;
            flags.push("device_inconsistency");
        }
    }

    let distinct_devices: std::collections::HashSet<&str> =
        recent.iter().map(|r| r.device_hash.as_str()).collect();
    if distinct_devices.len() >= DEVICE_CHURN_THRESHOLD {
        delta -= 15.0;
        flags.push("device_churn");
    }

    (delta, flags)
}

fn most_common<'a, I: Iterator<Item = &'a str>>(items: I) -> Option<&'a str> {
    let mut counts: HashMap<&str, u32> = HashMap::new();
    for item in items {
        *counts.entry(item).or_insert(0) += 1;
    }
    counts.into_iter().max_by_key(|(_, n)| *n).map(|(k, _)| k)
}
