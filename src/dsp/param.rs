//! Parameter automation timeline with linear ramps.
//!
//! Models the WebAudio `AudioParam` event list closely enough for the
//! offline backend: immediate sets, linear ramps that start at the previous
//! event, and cancel-and-hold.

#[derive(Debug, Clone, Copy, PartialEq)]
enum Event {
    Set { value: f64, time: f64 },
    LinearRamp { value: f64, end_time: f64 },
}

impl Event {
    fn time(&self) -> f64 {
        match *self {
            Event::Set { time, .. } => time,
            Event::LinearRamp { end_time, .. } => end_time,
        }
    }

    fn value(&self) -> f64 {
        match *self {
            Event::Set { value, .. } | Event::LinearRamp { value, .. } => value,
        }
    }
}

/// An automatable parameter value over time.
#[derive(Debug, Clone)]
pub struct AutomationParam {
    /// Value before any event takes effect.
    initial: f64,
    /// Sorted by event time.
    events: Vec<Event>,
}

impl AutomationParam {
    pub fn new(initial: f64) -> Self {
        AutomationParam {
            initial,
            events: Vec::new(),
        }
    }

    pub fn set_value_at_time(&mut self, value: f64, time: f64) {
        self.insert(Event::Set { value, time });
    }

    pub fn linear_ramp_to_value_at_time(&mut self, value: f64, end_time: f64) {
        self.insert(Event::LinearRamp { value, end_time });
    }

    /// Pin the current value at `time` and discard everything scheduled after.
    pub fn hold_at_time(&mut self, time: f64) {
        let value = self.value_at(time);
        self.events.retain(|e| e.time() <= time);
        self.insert(Event::Set { value, time });
    }

    /// Value of the parameter at `t`.
    pub fn value_at(&self, t: f64) -> f64 {
        let mut prev_value = self.initial;
        let mut prev_time = 0.0;
        for event in &self.events {
            match *event {
                Event::Set { value, time } => {
                    if time > t {
                        break;
                    }
                    prev_value = value;
                    prev_time = time;
                }
                Event::LinearRamp { value, end_time } => {
                    if end_time <= t {
                        prev_value = value;
                        prev_time = end_time;
                        continue;
                    }
                    let span = end_time - prev_time;
                    if span <= 0.0 {
                        return value;
                    }
                    let frac = ((t - prev_time) / span).clamp(0.0, 1.0);
                    return prev_value + (value - prev_value) * frac;
                }
            }
        }
        prev_value
    }

    /// Forget events that can no longer affect values at or after `t`.
    /// The last event at or before `t` stays as the ramp anchor.
    pub fn prune_before(&mut self, t: f64) {
        let settled = self.events.partition_point(|e| e.time() <= t);
        if settled > 1 {
            self.initial = self.events[settled - 2].value();
            self.events.drain(..settled - 1);
        }
    }

    /// Number of pending automation events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn insert(&mut self, event: Event) {
        let at = self.events.partition_point(|e| e.time() <= event.time());
        self.events.insert(at, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn holds_initial_without_events() {
        let p = AutomationParam::new(0.3);
        assert_eq!(p.value_at(0.0), 0.3);
        assert_eq!(p.value_at(100.0), 0.3);
        assert!(p.is_empty());
    }

    #[test]
    fn fade_in_ramp_is_linear() {
        let mut p = AutomationParam::new(1.0);
        p.set_value_at_time(0.0, 0.0);
        p.linear_ramp_to_value_at_time(1.0, 3.0);
        assert!(close(p.value_at(0.0), 0.0));
        assert!(close(p.value_at(1.5), 0.5));
        assert!(close(p.value_at(3.0), 1.0));
        assert!(close(p.value_at(10.0), 1.0));
    }

    #[test]
    fn set_in_future_does_not_apply_early() {
        let mut p = AutomationParam::new(0.0);
        p.set_value_at_time(0.8, 2.0);
        assert_eq!(p.value_at(1.999), 0.0);
        assert_eq!(p.value_at(2.0), 0.8);
    }

    #[test]
    fn hold_then_ramp_starts_from_current_value() {
        let mut p = AutomationParam::new(1.0);
        p.set_value_at_time(0.0, 0.0);
        p.linear_ramp_to_value_at_time(1.0, 3.0);

        // Stop one second into the fade-in
        p.hold_at_time(1.0);
        p.linear_ramp_to_value_at_time(0.0, 3.0);

        assert!(close(p.value_at(1.0), 1.0 / 3.0));
        assert!(close(p.value_at(2.0), 1.0 / 6.0));
        assert!(close(p.value_at(3.0), 0.0));
        assert!(p.value_at(2.5) < p.value_at(1.5), "Should keep falling, never rise");
    }

    #[test]
    fn prune_keeps_values_identical() {
        let mut p = AutomationParam::new(432.0);
        for i in 0..100 {
            let t = i as f64 * 0.01;
            p.set_value_at_time(432.0 + t, t);
        }
        p.linear_ramp_to_value_at_time(500.0, 2.0);
        let before: Vec<f64> = (0..30).map(|i| p.value_at(0.95 + i as f64 * 0.05)).collect();

        p.prune_before(0.95);
        assert!(p.len() < 10, "Should drop settled events, kept {}", p.len());
        let after: Vec<f64> = (0..30).map(|i| p.value_at(0.95 + i as f64 * 0.05)).collect();
        for (a, b) in before.iter().zip(&after) {
            assert!(close(*a, *b), "{a} != {b}");
        }
    }
}
