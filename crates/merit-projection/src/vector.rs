use chrono::{DateTime, Utc};
use merit_types::{Role, Specialty};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-actor derived XP record. Owned exclusively by the projection engine;
/// rebuilt by replay, never hand-edited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct XpVector {
    /// Confirmed XP, subject to inactivity decay.
    pub total_xp: u64,
    /// XP awaiting verification.
    pub pending_xp: u64,
    pub execution: u64,
    pub collaboration: u64,
    pub judgment: u64,
    /// Role -> domain -> action count.
    #[serde(default)]
    pub role_history: HashMap<Role, HashMap<Specialty, u32>>,
    /// Domain -> running average score in [0, 1].
    #[serde(default)]
    pub success_rate: HashMap<Specialty, f64>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub last_activity: Option<DateTime<Utc>>,
}

impl XpVector {
    pub(crate) fn touch(&mut self, at: DateTime<Utc>) {
        match self.last_activity {
            Some(prev) if prev >= at => {}
            _ => self.last_activity = Some(at),
        }
    }

    pub(crate) fn record_role_action(&mut self, role: Role, specialty: Specialty) {
        *self
            .role_history
            .entry(role)
            .or_default()
            .entry(specialty)
            .or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_touch_keeps_latest() {
        let earlier = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();

        let mut vector = XpVector::default();
        vector.touch(later);
        vector.touch(earlier);
        assert_eq!(vector.last_activity, Some(later));
    }

    #[test]
    fn test_role_history_counts() {
        let mut vector = XpVector::default();
        vector.record_role_action(Role::Builder, Specialty::Backend);
        vector.record_role_action(Role::Builder, Specialty::Backend);
        vector.record_role_action(Role::Guardian, Specialty::Security);

        assert_eq!(vector.role_history[&Role::Builder][&Specialty::Backend], 2);
        assert_eq!(
            vector.role_history[&Role::Guardian][&Specialty::Security],
            1
        );
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut vector = XpVector {
            total_xp: 42,
            pending_xp: 10,
            ..Default::default()
        };
        vector.record_role_action(Role::Builder, Specialty::Research);

        let raw = serde_json::to_value(&vector).unwrap();
        let back: XpVector = serde_json::from_value(raw).unwrap();
        assert_eq!(back, vector);
    }
}
