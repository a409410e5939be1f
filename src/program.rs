//! Watering programs: ordered lists of zones and how long to run each.
//!
//! A program is written as `zone:duration` tokens separated by commas, e.g.
//! `1:10m,2:7m30s,0:1m`. Zone 0 is an idle phase with every relay off.

use std::{fmt, str::FromStr, sync::Mutex, time::Duration};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use tracing::info;

use crate::{
    boards::RelayChannel,
    config::{Compact, Timing},
    error::{Error, Result},
    i2c::I2cBus,
    pacer::Pacer,
    wire::{self, RELAYS},
};

/// Scale `duration` by `percent`, never going below the settling delay.
pub fn scale(duration: Duration, percent: u32, timing: &Timing) -> Duration {
    let nanos = duration.as_nanos() * u128::from(percent) / 100;
    let scaled = Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX));
    scaled.max(timing.settling_delay)
}

/// One zone activation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Event {
    zone: u8,
    duration: Duration,
}

impl Event {
    pub fn new(zone: u8, duration: Duration, timing: &Timing) -> Result<Self> {
        let spec = format!("{}:{}", zone, Compact(duration));
        Self::checked(zone, duration, &spec, timing)
    }

    /// Parse a `zone:duration` token.
    pub fn parse(spec: &str, timing: &Timing) -> Result<Self> {
        let parts: Vec<&str> = spec.split(':').collect();
        let (zone, duration) = match parts.as_slice() {
            [zone, duration] => (zone.trim(), duration.trim()),
            _ => return Err(Error::event("event", spec, "expecting zone:duration")),
        };

        let duration =
            humantime::parse_duration(duration).map_err(|e| Error::event("duration", spec, e))?;
        let zone = zone.parse().map_err(|e| Error::event("zone", spec, e))?;

        Self::checked(zone, duration, spec, timing)
    }

    fn checked(zone: u8, duration: Duration, spec: &str, timing: &Timing) -> Result<Self> {
        if duration < timing.settling_delay {
            return Err(Error::event(
                "duration",
                spec,
                format!("must be at least {}", Compact(timing.settling_delay)),
            ));
        }
        if zone > RELAYS {
            return Err(Error::event("zone", spec, "zones are numbered 1-8, 0 for none"));
        }
        Ok(Self { zone, duration })
    }

    /// Zone number, 0 for an idle phase.
    pub fn zone(&self) -> u8 {
        self.zone
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Logical relay mask asserted while this event runs.
    pub fn mask(&self) -> u8 {
        wire::zone_mask(self.zone)
    }

    /// Energize, wait, switch off, settle.
    fn run<B: I2cBus>(
        &self,
        relay: &Mutex<RelayChannel<B>>,
        percent: u32,
        timing: &Timing,
        pacer: &Pacer,
    ) -> Result<()> {
        pacer.check()?;
        lock(relay).set(self.mask())?;

        let duration = scale(self.duration, percent, timing);
        info!(zone = self.zone, "set {} for {}", self.zone, Compact(duration));
        pacer.pause(duration)?;

        info!(zone = self.zone, "set {} off", self.zone);
        lock(relay).set(0)?;
        pacer.pause(timing.settling_delay)
    }
}

impl FromStr for Event {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s, &Timing::default())
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.zone, Compact(self.duration))
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// An event together with the duration it will actually run for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Step {
    pub event: Event,
    #[serde(serialize_with = "human")]
    pub scaled: Duration,
}

fn human<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.collect_str(&Compact(*d))
}

/// A non-empty sequence of events, run strictly in order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Event>", into = "Vec<Event>")]
pub struct Program {
    events: Vec<Event>,
}

impl Program {
    pub fn new(events: Vec<Event>) -> Result<Self> {
        if events.is_empty() {
            return Err(Error::EmptyProgram);
        }
        Ok(Self { events })
    }

    /// Parse a comma separated list of `zone:duration` tokens.
    pub fn parse(spec: &str, timing: &Timing) -> Result<Self> {
        if spec.trim().is_empty() {
            return Err(Error::EmptyProgram);
        }
        let events = spec
            .split(',')
            .map(|token| Event::parse(token, timing))
            .collect::<Result<Vec<_>>>()?;
        Self::new(events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Every event with its scaled run time.
    pub fn steps(&self, percent: u32, timing: &Timing) -> Vec<Step> {
        self.events
            .iter()
            .map(|&event| Step {
                event,
                scaled: scale(event.duration, percent, timing),
            })
            .collect()
    }

    /// Wall-clock time a run takes, settling delays included.
    pub fn total_duration(&self, percent: u32, timing: &Timing) -> Duration {
        self.events
            .iter()
            .map(|e| scale(e.duration, percent, timing) + timing.settling_delay)
            .sum()
    }

    /// Run every event in order against `relay`.
    ///
    /// Stops at the first failed write: the relay state is unknown from then
    /// on. Returns `Interrupted` if the pacer is triggered; whoever fired it is
    /// responsible for switching the relays off.
    pub fn run<B: I2cBus>(
        &self,
        relay: &Mutex<RelayChannel<B>>,
        percent: u32,
        timing: &Timing,
        pacer: &Pacer,
    ) -> Result<()> {
        for event in &self.events {
            event.run(relay, percent, timing, pacer)?;
        }
        Ok(())
    }
}

impl TryFrom<Vec<Event>> for Program {
    type Error = Error;

    fn try_from(events: Vec<Event>) -> Result<Self> {
        Self::new(events)
    }
}

impl From<Program> for Vec<Event> {
    fn from(program: Program) -> Self {
        program.events
    }
}

impl FromStr for Program {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s, &Timing::default())
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, event) in self.events.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", event)?;
        }
        Ok(())
    }
}

/// Lock the shared channel. A poisoned lock is still usable: the relays must be
/// reachable after a panic elsewhere.
pub(crate) fn lock<B: I2cBus>(
    relay: &Mutex<RelayChannel<B>>,
) -> std::sync::MutexGuard<'_, RelayChannel<B>> {
    relay.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fakes::LoopbackBus, pacer};
    use proptest::prelude::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn fast() -> Timing {
        Timing::new(Duration::from_millis(2))
    }

    #[test]
    fn parses_events() {
        let e: Event = "3:5m30s".parse().unwrap();
        assert_eq!(e.zone(), 3);
        assert_eq!(e.duration(), secs(330));
        assert_eq!(e.mask(), 0b100);

        let idle: Event = "0:1m".parse().unwrap();
        assert_eq!(idle.mask(), 0);
    }

    #[test]
    fn rejects_bad_events() {
        let field = |s: &str| match s.parse::<Event>() {
            Err(Error::InvalidEventSpec { field, .. }) => field,
            other => panic!("{:?} parsed as {:?}", s, other),
        };
        assert_eq!(field("1:1s"), "duration");
        assert_eq!(field("1:soon"), "duration");
        assert_eq!(field("x:10s"), "zone");
        assert_eq!(field("-1:10s"), "zone");
        assert_eq!(field("9:10s"), "zone");
        assert_eq!(field("1"), "event");
        assert_eq!(field("1:10s:2"), "event");
    }

    #[test]
    fn construction_enforces_floor() {
        assert!(Event::new(1, secs(2), &Timing::default()).is_err());
        assert!(Event::new(1, secs(3), &Timing::default()).is_ok());
        assert!(Event::new(1, Duration::from_millis(2), &fast()).is_ok());
        assert!(Event::new(9, secs(3), &Timing::default()).is_err());
    }

    #[test]
    fn parses_programs_in_order() {
        let p: Program = "2:10s, 1:20s,0:3s".parse().unwrap();
        let zones: Vec<u8> = p.events().iter().map(Event::zone).collect();
        assert_eq!(zones, [2, 1, 0]);
        assert_eq!(p.to_string(), "2:10s,1:20s,0:3s");
    }

    #[test]
    fn displays_compact_durations() {
        let e: Event = "1:90s".parse().unwrap();
        assert_eq!(e.to_string(), "1:1m30s");

        let p: Program = "3:1h2m,4:1m30s".parse().unwrap();
        assert_eq!(p.to_string(), "3:1h2m,4:1m30s");
    }

    #[test]
    fn first_bad_token_aborts_program() {
        let err = "1:10s,2:1s,3:oops".parse::<Program>().unwrap_err();
        assert!(matches!(err, Error::InvalidEventSpec { ref spec, .. } if spec == "2:1s"));
        assert!(matches!("".parse::<Program>(), Err(Error::EmptyProgram)));
        assert!(matches!(Program::new(Vec::new()), Err(Error::EmptyProgram)));
    }

    #[test]
    fn scale_floors_at_settling_delay() {
        let t = Timing::default();
        assert_eq!(scale(secs(100), 50, &t), secs(50));
        assert_eq!(scale(secs(100), 0, &t), secs(3));
        assert_eq!(scale(secs(4), 50, &t), secs(3));
        assert_eq!(scale(secs(10), 250, &t), secs(25));
    }

    #[test]
    fn total_duration_two_zones() {
        let p: Program = "1:10s,2:10s".parse().unwrap();
        assert_eq!(p.total_duration(100, &Timing::default()), secs(26));
        assert_eq!(p.total_duration(0, &Timing::default()), secs(12));
    }

    #[test]
    fn steps_report_scaled_durations() {
        let p: Program = "1:10s,0:1m".parse().unwrap();
        let steps = p.steps(50, &Timing::default());
        assert_eq!(steps[0].scaled, secs(5));
        assert_eq!(steps[1].scaled, secs(30));
        assert_eq!(
            serde_json::to_string(&steps[0]).unwrap(),
            r#"{"event":"1:10s","scaled":"5s"}"#
        );
    }

    #[test]
    fn serde_uses_textual_form() {
        let p: Program = "1:10s,2:1m".parse().unwrap();
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#"["1:10s","2:1m"]"#);
        assert_eq!(serde_json::from_str::<Program>(&json).unwrap(), p);
        assert!(serde_json::from_str::<Program>("[]").is_err());
    }

    #[test]
    fn run_energizes_one_zone_at_a_time() {
        let t = fast();
        let p = Program::parse("1:2ms,0:2ms,3:2ms", &t).unwrap();
        let bus = LoopbackBus::new();
        let relay = Mutex::new(RelayChannel::with_bus(bus.clone(), 1).unwrap());
        let (_trigger, pacer) = pacer::channel();

        p.run(&relay, 100, &t, &pacer).unwrap();

        assert_eq!(bus.relay_writes(), [0b001, 0, 0, 0, 0b100, 0]);
        assert_eq!(bus.wire(), 0);
    }

    #[test]
    fn run_stops_at_first_failed_write() {
        let t = fast();
        let p = Program::parse("1:2ms,2:2ms", &t).unwrap();
        let bus = LoopbackBus::new();
        bus.fail_writes(true);
        let relay = Mutex::new(RelayChannel::with_bus(bus.clone(), 1).unwrap());

        let err = p.run(&relay, 100, &t, &Pacer::unattended()).unwrap_err();
        assert!(err.is_transport());
        assert_eq!(bus.transactions().len(), 2, "select and one failed write");
    }

    #[test]
    fn triggered_pacer_stops_before_next_event() {
        let t = fast();
        let p = Program::parse("1:2ms,2:2ms", &t).unwrap();
        let bus = LoopbackBus::new();
        let relay = Mutex::new(RelayChannel::with_bus(bus.clone(), 1).unwrap());
        let (trigger, pacer) = pacer::channel();
        trigger.fire();

        assert!(matches!(p.run(&relay, 100, &t, &pacer), Err(Error::Interrupted)));
        assert!(bus.relay_writes().is_empty());
    }

    proptest! {
        #[test]
        fn scaled_duration_never_below_floor(ms in 0u64..10_000_000, percent in 0u32..1000) {
            let t = Timing::default();
            prop_assert!(scale(Duration::from_millis(ms), percent, &t) >= t.settling_delay);
        }

        #[test]
        fn event_text_round_trips(zone in 0u8..=8, ms in 3_000u64..100_000_000) {
            let e = Event::new(zone, Duration::from_millis(ms), &Timing::default()).unwrap();
            prop_assert_eq!(e.to_string().parse::<Event>().unwrap(), e);
        }

        #[test]
        fn total_is_scaled_sum_plus_settling(
            durations in proptest::collection::vec(3_000u64..1_000_000, 1..10),
            percent in 0u32..300,
        ) {
            let t = Timing::default();
            let events: Vec<Event> = durations
                .iter()
                .enumerate()
                .map(|(i, &ms)| Event::new((i % 9) as u8, Duration::from_millis(ms), &t).unwrap())
                .collect();
            let p = Program::new(events).unwrap();
            let scaled: Duration = p.steps(percent, &t).iter().map(|s| s.scaled).sum();
            prop_assert_eq!(
                p.total_duration(percent, &t),
                scaled + t.settling_delay * p.len() as u32
            );
        }
    }
}
