//! Navigation-light pulse trains.
//!
//! Emits `count` pulses of `width_secs` each on a digital pin, with a duty
//! cycle in percent. A duty above 100 inverts polarity (the pin rests high
//! and pulses low). While suppression is latched the generator sleeps for
//! the same total duration without toggling the pin, so cycle timing is
//! unchanged.

use log::warn;

use crate::app::ports::{GpioPort, SystemPort};

/// Emit one pulse train. Returns the milliseconds consumed (0 when the
/// request was rejected).
///
/// Rejected when `count` or `width_secs` is non-positive, when the train
/// would outlast the monitor period, or when the duty cycle falls outside
/// 0..=200. A duty of 0 passes the range check and is then remapped to 50;
/// field-deployed configurations rely on this.
pub fn pulse_pin(
    plat: &mut (impl GpioPort + SystemPort),
    pin: u8,
    count: i32,
    width_secs: i32,
    duty_percent: i32,
    mon_period: u16,
    suppress: bool,
) -> u32 {
    if count <= 0 || width_secs <= 0 {
        return 0;
    }
    if count.saturating_mul(width_secs) > i32::from(mon_period) {
        warn!("pulse: {count}x{width_secs}s exceeds monitor period");
        return 0;
    }
    if !(0..=200).contains(&duty_percent) {
        warn!("pulse: duty {duty_percent}% out of range");
        return 0;
    }

    let mut duty = duty_percent;
    let mut active_level = 1;
    if duty > 100 {
        duty -= 100;
        active_level = 0;
    }
    if duty == 0 {
        duty = 50;
    }

    let width_ms = width_secs as u32 * 1000;
    let active_ms = width_ms * duty as u32 / 100;
    let inactive_ms = width_ms - active_ms;

    for _ in 0..count {
        if suppress {
            plat.delay_ms(width_ms);
            continue;
        }
        plat.digital_write(pin, active_level);
        plat.delay_ms(active_ms);
        plat.digital_write(pin, 1 - active_level);
        plat.delay_ms(inactive_ms);
    }
    count as u32 * width_ms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakePin {
        now: u32,
        toggles: Vec<(u32, i32)>,
    }

    impl GpioPort for FakePin {
        fn analog_read(&mut self, _pin: u8) -> i32 {
            0
        }
        fn analog_write(&mut self, _pin: u8, _value: i32) {}
        fn digital_read(&mut self, _pin: u8) -> i32 {
            0
        }
        fn digital_write(&mut self, _pin: u8, level: i32) {
            self.toggles.push((self.now, level));
        }
    }

    impl SystemPort for FakePin {
        fn millis(&self) -> u32 {
            self.now
        }
        fn delay_ms(&mut self, ms: u32) {
            self.now += ms;
        }
        fn deep_sleep_ms(&mut self, _ms: u64) {}
        fn restart(&mut self) {}
    }

    #[test]
    fn default_duty_is_half() {
        let mut rig = FakePin::default();
        let spent = pulse_pin(&mut rig, 26, 2, 1, 0, 60, false);
        assert_eq!(spent, 2000);
        assert_eq!(
            rig.toggles,
            vec![(0, 1), (500, 0), (1000, 1), (1500, 0)]
        );
    }

    #[test]
    fn duty_over_100_inverts_polarity() {
        let mut rig = FakePin::default();
        pulse_pin(&mut rig, 26, 1, 1, 125, 60, false);
        assert_eq!(rig.toggles, vec![(0, 0), (250, 1)]);
    }

    #[test]
    fn rejects_bad_requests() {
        let mut rig = FakePin::default();
        assert_eq!(pulse_pin(&mut rig, 26, 0, 1, 50, 60, false), 0);
        assert_eq!(pulse_pin(&mut rig, 26, 1, 0, 50, 60, false), 0);
        assert_eq!(pulse_pin(&mut rig, 26, 7, 10, 50, 60, false), 0);
        assert_eq!(pulse_pin(&mut rig, 26, 1, 1, 201, 60, false), 0);
        assert!(rig.toggles.is_empty());
    }

    #[test]
    fn suppression_sleeps_without_toggling() {
        let mut rig = FakePin::default();
        let spent = pulse_pin(&mut rig, 26, 3, 1, 50, 60, true);
        assert_eq!(spent, 3000);
        assert_eq!(rig.now, 3000);
        assert!(rig.toggles.is_empty());
    }
}
