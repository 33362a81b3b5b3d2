// Numeric helpers for quantizing property changes into hardware steps.

use crate::error::{check_unit, Result};

/**
 * Number of hardware steps between two decimal percentages, for a property
 * with `max` steps over its whole range. Rounds toward zero.
 */
pub fn steps(current: f64, target: f64, max: u32) -> Result<u32> {
    let current = check_unit("current", current)?;
    let target = check_unit("target", target)?;
    let max = f64::from(max);
    Ok((current * max - target * max).abs().trunc() as u32)
}

/**
 * Value at step `i` of `total` on the straight line from `start` to `end`,
 * rounded to two decimal places.
 */
pub fn transition(i: u32, total: u32, start: f64, end: f64) -> f64 {
    if total == 0 {
        return end;
    }
    let value = start + (end - start) * f64::from(i) / f64::from(total);
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps() {
        assert_eq!(steps(0.5, 1.0, 100).unwrap(), 50);
        assert_eq!(steps(1.0, 0.5, 100).unwrap(), 50);
        assert_eq!(steps(0.0, 1.0, 25).unwrap(), 25);
        assert_eq!(steps(0.3, 0.3, 101).unwrap(), 0);
        assert_eq!(steps(0.0, 0.01, 10).unwrap(), 0);
    }

    #[test]
    fn test_steps_rejects_out_of_range() {
        assert!(steps(-0.1, 0.5, 10).is_err());
        assert!(steps(0.1, 1.5, 10).is_err());
        assert!(steps(f64::NAN, 0.5, 10).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_transition() {
        assert_eq!(transition(1, 100, 0.0, 10.0), 0.1);
        assert_eq!(transition(0, 10, 0.2, 0.8), 0.2);
        assert_eq!(transition(10, 10, 0.2, 0.8), 0.8);
        assert_eq!(transition(1, 3, 0.0, 1.0), 0.33);
        assert_eq!(transition(2, 4, 1.0, 0.0), 0.5);
        assert_eq!(transition(3, 0, 0.0, 0.7), 0.7);
    }

    #[test]
    fn test_transition_monotonic() {
        let mut last = 0.9;
        for i in 1..=20 {
            let value = transition(i, 20, 0.9, 0.1);
            assert!(value <= last);
            last = value;
        }
        assert_eq!(last, 0.1);
    }
}
