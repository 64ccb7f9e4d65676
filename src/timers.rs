use chrono::{DateTime, Duration, Local};
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, EnumIter};

#[derive(AsRefStr, EnumIter, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissionEvent {
    #[strum(serialize = "Time Since Launch")]
    Launch,
    #[strum(serialize = "Time Since Recovery 1")]
    Recovery1,
    #[strum(serialize = "Time Since Recovery 2")]
    Recovery2,
}

impl MissionEvent {
    pub fn all() -> Vec<MissionEvent> {
        MissionEvent::iter().collect()
    }

    fn index(self) -> usize {
        match self {
            MissionEvent::Launch => 0,
            MissionEvent::Recovery1 => 1,
            MissionEvent::Recovery2 => 2,
        }
    }
}

/// Wall-clock start times of mission events, unset until triggered.
#[derive(Clone, Debug, Default)]
pub struct MissionClock {
    started: [Option<DateTime<Local>>; 3],
}

impl MissionClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restarting an event overwrites its previous start time.
    pub fn start(&mut self, event: MissionEvent, at: DateTime<Local>) {
        self.started[event.index()] = Some(at);
    }

    pub fn reset(&mut self, event: MissionEvent) {
        self.started[event.index()] = None;
    }

    pub fn started_at(&self, event: MissionEvent) -> Option<DateTime<Local>> {
        self.started[event.index()]
    }

    pub fn elapsed(&self, event: MissionEvent, now: DateTime<Local>) -> Option<Duration> {
        self.started_at(event).map(|start| now - start)
    }

    pub fn label(&self, event: MissionEvent, now: DateTime<Local>) -> String {
        match self.elapsed(event, now) {
            Some(elapsed) => format!("{}: {}", event.as_ref(), format_elapsed(elapsed)),
            None => format!("{}: N/A", event.as_ref()),
        }
    }
}

/// `HH:MM:SS`, hours unbounded, negative spans shown as zero.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.num_seconds().max(0);
    let (hours, rem) = (total / 3600, total % 3600);
    let (minutes, seconds) = (rem / 60, rem % 60);
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_elapsed_time() {
        assert_eq!(format_elapsed(Duration::seconds(0)), "00:00:00");
        assert_eq!(format_elapsed(Duration::seconds(65)), "00:01:05");
        assert_eq!(format_elapsed(Duration::milliseconds(3_723_900)), "01:02:03");
        assert_eq!(format_elapsed(Duration::hours(101)), "101:00:00");
        assert_eq!(format_elapsed(Duration::seconds(-5)), "00:00:00");
    }

    #[test]
    fn labels_follow_event_state() {
        let mut clock = MissionClock::new();
        let t0 = Local::now();

        assert_eq!(clock.label(MissionEvent::Launch, t0), "Time Since Launch: N/A");

        clock.start(MissionEvent::Launch, t0);
        clock.start(MissionEvent::Recovery2, t0 + Duration::seconds(30));
        let now = t0 + Duration::seconds(95);

        assert_eq!(clock.label(MissionEvent::Launch, now), "Time Since Launch: 00:01:35");
        assert_eq!(
            clock.label(MissionEvent::Recovery1, now),
            "Time Since Recovery 1: N/A"
        );
        assert_eq!(
            clock.label(MissionEvent::Recovery2, now),
            "Time Since Recovery 2: 00:01:05"
        );

        clock.reset(MissionEvent::Launch);
        assert!(clock.elapsed(MissionEvent::Launch, now).is_none());
    }
}
