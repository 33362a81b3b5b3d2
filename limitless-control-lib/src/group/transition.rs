//! Step planning for timed transitions.
//!
//! A transition moves one or more properties from their current value to a
//! target over a wall-clock duration. Each property advances in whole
//! hardware steps; all properties share one step index and each fires only
//! on the indices that belong to it.

use std::time::Duration;

use crate::util;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    Brightness,
    Hue,
    Saturation,
    Temperature,
}

/// One property's path through a transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Track {
    pub property: Property,
    pub start: f64,
    pub end: f64,
    pub steps: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    tracks: Vec<Track>,
    total: u32,
    wait: Duration,
}

impl Plan {
    /**
     * Plan `tracks` to complete within `duration`, given that every command
     * costs at least `overhead` on the bridge.
     *
     * When the ideal step counts don't fit, each track is scaled down in
     * proportion (keeping at least one step) so the transition still ends on
     * time, only coarser.
     */
    pub fn new(duration: Duration, tracks: Vec<Track>, overhead: Duration) -> Plan {
        let mut tracks: Vec<Track> = tracks.into_iter().filter(|t| t.steps > 0).collect();
        let budget = duration.as_secs_f64();
        let cost = overhead.as_secs_f64();

        let commands = command_count(&tracks);
        let mut idle = budget - cost * f64::from(commands);
        if idle <= 0.0 && cost > 0.0 && commands > 0 {
            let factor = budget / (cost * f64::from(commands));
            for track in tracks.iter_mut() {
                track.steps = ((f64::from(track.steps) * factor).floor() as u32).max(1);
            }
            idle = budget - cost * f64::from(command_count(&tracks));
        }

        let total = tracks.iter().map(|t| t.steps).max().unwrap_or(0).max(1);
        let wait = Duration::from_secs_f64((idle / f64::from(total)).max(0.0));
        Plan {
            tracks,
            total,
            wait,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Length of the shared step index.
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Pause after each step index.
    pub fn wait(&self) -> Duration {
        self.wait
    }

    pub fn commands(&self) -> u32 {
        command_count(&self.tracks)
    }

    /// Values to send at step `i` (1-based) of [`total`](Self::total).
    pub fn firings(&self, i: u32) -> impl Iterator<Item = (Property, f64)> + '_ {
        let total = u64::from(self.total);
        let i = u64::from(i);
        self.tracks.iter().filter_map(move |track| {
            let steps = u64::from(track.steps);
            let reached = i * steps / total;
            let before = i.saturating_sub(1) * steps / total;
            (i > 0 && reached > before).then(|| {
                let value = util::transition(reached as u32, track.steps, track.start, track.end);
                (track.property, value)
            })
        })
    }
}

fn command_count(tracks: &[Track]) -> u32 {
    tracks.iter().map(|t| t.steps).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(property: Property, start: f64, end: f64, steps: u32) -> Track {
        Track {
            property,
            start,
            end,
            steps,
        }
    }

    fn fired(plan: &Plan, property: Property) -> Vec<f64> {
        (1..=plan.total())
            .flat_map(|i| plan.firings(i).collect::<Vec<_>>())
            .filter(|(p, _)| *p == property)
            .map(|(_, v)| v)
            .collect()
    }

    #[test]
    fn test_single_track() {
        let plan = Plan::new(
            Duration::from_secs(1),
            vec![track(Property::Brightness, 0.0, 1.0, 10)],
            Duration::ZERO,
        );
        assert_eq!(plan.total(), 10);
        assert!((plan.wait().as_secs_f64() - 0.1).abs() < 1e-9);
        let values = fired(&plan, Property::Brightness);
        assert_eq!(values.len(), 10);
        assert_eq!(values[0], 0.1);
        assert_eq!(values[9], 1.0);
    }

    #[test]
    fn test_interleaved_tracks() {
        let plan = Plan::new(
            Duration::from_secs(2),
            vec![
                track(Property::Hue, 0.0, 0.5, 100),
                track(Property::Brightness, 1.0, 0.5, 25),
            ],
            Duration::ZERO,
        );
        assert_eq!(plan.total(), 100);
        assert_eq!(plan.commands(), 125);
        let brightness = fired(&plan, Property::Brightness);
        assert_eq!(brightness.len(), 25);
        assert_eq!(*brightness.last().unwrap(), 0.5);
        // every fourth index
        assert_eq!(plan.firings(3).count(), 1);
        assert_eq!(plan.firings(4).count(), 2);
        assert_eq!(fired(&plan, Property::Hue).len(), 100);
    }

    #[test]
    fn test_overhead_reduces_wait() {
        let plan = Plan::new(
            Duration::from_secs(2),
            vec![track(Property::Brightness, 0.0, 1.0, 10)],
            Duration::from_millis(100),
        );
        assert_eq!(plan.total(), 10);
        assert!((plan.wait().as_secs_f64() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_scaled_down_when_too_short() {
        let plan = Plan::new(
            Duration::from_secs(1),
            vec![
                track(Property::Brightness, 0.0, 1.0, 100),
                track(Property::Temperature, 0.5, 0.51, 1),
            ],
            Duration::from_millis(25),
        );
        // 101 commands at 25ms need 2.525s
        let brightness = plan.tracks()[0];
        assert_eq!(brightness.steps, 39);
        assert_eq!(plan.tracks()[1].steps, 1);
        assert!(f64::from(plan.commands()) * 0.025 <= 1.0 + 1e-9);
        assert_eq!(fired(&plan, Property::Brightness).last(), Some(&1.0));
        assert_eq!(fired(&plan, Property::Temperature), vec![0.51]);
    }

    #[test]
    fn test_empty_tracks() {
        let plan = Plan::new(
            Duration::from_secs(1),
            vec![track(Property::Hue, 0.2, 0.2, 0)],
            Duration::from_millis(25),
        );
        assert!(plan.is_empty());
        assert_eq!(plan.total(), 1);
        assert_eq!(plan.firings(1).count(), 0);
    }
}
