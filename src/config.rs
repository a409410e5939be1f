use std::{fmt, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

/// Pause between switching one zone off and the next one on.
pub const DEFAULT_SETTLING_DELAY: Duration = Duration::from_secs(3);

/// Timing shared by parsing, scaling and execution.
///
/// The settling delay is also the shortest duration an event may have, and the
/// floor that scaling never goes below.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    #[serde(with = "human_duration")]
    pub settling_delay: Duration,
}

impl Timing {
    pub const fn new(settling_delay: Duration) -> Self {
        Self { settling_delay }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self::new(DEFAULT_SETTLING_DELAY)
    }
}

/// A duration written the way programs spell it: `1m30s`, `2h5m`.
#[derive(Copy, Clone, Debug)]
pub struct Compact(pub Duration);

impl fmt::Display for Compact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = humantime::format_duration(self.0).to_string();
        text.split(' ').try_for_each(|unit| f.write_str(unit))
    }
}

/// Where the relay board lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusConfig {
    pub bus: u32,
    pub board: u8,
    /// Overrides the `/dev/i2c-<bus>` device node.
    pub device: Option<PathBuf>,
}

impl BusConfig {
    pub fn device_path(&self) -> PathBuf {
        self.device
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("/dev/i2c-{}", self.bus)))
    }
}

mod human_duration {
    use std::time::Duration;

    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    use super::Compact;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&Compact(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(d)?;
        humantime::parse_duration(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_path_defaults_to_bus_node() {
        let mut cfg = BusConfig {
            bus: 3,
            board: 1,
            device: None,
        };
        assert_eq!(cfg.device_path(), PathBuf::from("/dev/i2c-3"));

        cfg.device = Some(PathBuf::from("/tmp/fake-bus"));
        assert_eq!(cfg.device_path(), PathBuf::from("/tmp/fake-bus"));
    }

    #[test]
    fn compact_durations_have_no_spaces() {
        assert_eq!(Compact(Duration::from_secs(90)).to_string(), "1m30s");
        assert_eq!(Compact(Duration::from_secs(17 * 60 + 36)).to_string(), "17m36s");
        assert_eq!(Compact(Duration::from_secs(3)).to_string(), "3s");
        assert_eq!(Compact(Duration::ZERO).to_string(), "0s");

        let long = Duration::from_secs(26 * 3600 + 5);
        assert_eq!(humantime::parse_duration(&Compact(long).to_string()).unwrap(), long);
    }

    #[test]
    fn timing_serializes_as_human_duration() {
        let json = serde_json::to_string(&Timing::default()).unwrap();
        assert_eq!(json, r#"{"settling_delay":"3s"}"#);

        let timing: Timing = serde_json::from_str(r#"{"settling_delay":"250ms"}"#).unwrap();
        assert_eq!(timing.settling_delay, Duration::from_millis(250));
    }
}
