//! Volatility-adjusted lookback
//!
//! The lookback is rescaled by the relative change between today's and
//! yesterday's close volatility: rising volatility looks further back,
//! falling volatility shortens the window. The result is always clamped to
//! `[floor, ceiling]`.

use super::config::AdaptiveBreakoutConfig;
use crate::indicators::std_dev;

/// Why a cycle left the lookback untouched
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LookbackSkip {
    InsufficientHistory { required: usize, available: usize },
    /// Today's volatility is zero, the relative delta is undefined
    ZeroVolatility,
    NonFinite,
}

impl std::fmt::Display for LookbackSkip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LookbackSkip::InsufficientHistory {
                required,
                available,
            } => write!(f, "need {} closes, have {}", required, available),
            LookbackSkip::ZeroVolatility => write!(f, "today's volatility is zero"),
            LookbackSkip::NonFinite => write!(f, "volatility delta is not finite"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LookbackUpdate {
    Adjusted {
        previous: usize,
        lookback: usize,
        delta: f64,
    },
    Unchanged {
        lookback: usize,
        reason: LookbackSkip,
    },
}

impl LookbackUpdate {
    pub fn lookback(&self) -> usize {
        match *self {
            LookbackUpdate::Adjusted { lookback, .. } => lookback,
            LookbackUpdate::Unchanged { lookback, .. } => lookback,
        }
    }
}

/// Today's and yesterday's volatility over adjacent windows of the last
/// `window + 1` closes
pub fn volatility_pair(closes: &[f64], window: usize) -> Option<(f64, f64)> {
    if window == 0 || closes.len() < window + 1 {
        return None;
    }
    let tail = &closes[closes.len() - (window + 1)..];
    let yesterday = std_dev(&tail[..window])?;
    let today = std_dev(&tail[1..])?;
    Some((today, yesterday))
}

/// Relative volatility change `(today - yesterday) / today`
pub fn volatility_delta(today: f64, yesterday: f64) -> Result<f64, LookbackSkip> {
    if today == 0.0 {
        return Err(LookbackSkip::ZeroVolatility);
    }
    let delta = (today - yesterday) / today;
    if delta.is_finite() {
        Ok(delta)
    } else {
        Err(LookbackSkip::NonFinite)
    }
}

/// Rescale `lookback` by `1 + delta`, rounding half to even, then clamp
pub fn rescale(lookback: usize, delta: f64, floor: usize, ceiling: usize) -> usize {
    let scaled = (lookback as f64 * (1.0 + delta)).round_ties_even();
    scaled.clamp(floor as f64, ceiling as f64) as usize
}

pub fn update_lookback(
    current: usize,
    closes: &[f64],
    config: &AdaptiveBreakoutConfig,
) -> LookbackUpdate {
    let unchanged = |reason| LookbackUpdate::Unchanged {
        lookback: current,
        reason,
    };

    let Some((today, yesterday)) = volatility_pair(closes, config.volatility_window) else {
        return unchanged(LookbackSkip::InsufficientHistory {
            required: config.closes_required(),
            available: closes.len(),
        });
    };

    match volatility_delta(today, yesterday) {
        Ok(delta) => LookbackUpdate::Adjusted {
            previous: current,
            lookback: rescale(current, delta, config.floor, config.ceiling),
            delta,
        },
        Err(reason) => unchanged(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn population_std(values: &[f64]) -> f64 {
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
        var.sqrt()
    }

    #[test]
    fn test_volatility_pair_uses_adjacent_windows() {
        let closes: Vec<f64> = (0..31).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0).collect();
        let (today, yesterday) = volatility_pair(&closes, 30).unwrap();

        assert_relative_eq!(today, population_std(&closes[1..31]), epsilon = 1e-9);
        assert_relative_eq!(yesterday, population_std(&closes[0..30]), epsilon = 1e-9);
    }

    #[test]
    fn test_volatility_pair_uses_most_recent_closes() {
        let mut closes = vec![500.0; 10];
        closes.extend((0..31).map(|i| 100.0 + i as f64));
        let (today, _) = volatility_pair(&closes, 30).unwrap();

        assert_relative_eq!(today, population_std(&closes[11..41]), epsilon = 1e-9);
    }

    #[test]
    fn test_zero_volatility_keeps_lookback() {
        let config = AdaptiveBreakoutConfig::default();
        let closes = vec![10.0; 31];

        let update = update_lookback(20, &closes, &config);
        assert_eq!(
            update,
            LookbackUpdate::Unchanged {
                lookback: 20,
                reason: LookbackSkip::ZeroVolatility
            }
        );
    }

    #[test]
    fn test_flat_today_after_outlier_keeps_lookback() {
        let config = AdaptiveBreakoutConfig::default();

        let mut closes = vec![0.1];
        closes.extend([10.0; 30]);
        let (today, yesterday) = volatility_pair(&closes, 30).unwrap();
        assert_eq!(today, 0.0);
        assert!(yesterday > 0.0);
        assert_eq!(
            update_lookback(20, &closes, &config),
            LookbackUpdate::Unchanged {
                lookback: 20,
                reason: LookbackSkip::ZeroVolatility
            }
        );

        let mut closes: Vec<f64> = (0..40)
            .map(|i| 40_000.0 + (i as f64 * 1.3).sin() * 2_500.0)
            .collect();
        closes.extend([41234.5; 30]);
        assert_eq!(update_lookback(20, &closes, &config).lookback(), 20);

        let mut closes = vec![51234.56];
        closes.extend([57123.45; 30]);
        assert_eq!(update_lookback(20, &closes, &config).lookback(), 20);
    }

    #[test]
    fn test_short_history_keeps_lookback() {
        let config = AdaptiveBreakoutConfig::default();
        let closes = vec![10.0, 11.0, 12.0];

        let update = update_lookback(17, &closes, &config);
        assert_eq!(update.lookback(), 17);
        assert!(matches!(
            update,
            LookbackUpdate::Unchanged {
                reason: LookbackSkip::InsufficientHistory {
                    required: 31,
                    available: 3
                },
                ..
            }
        ));
    }

    #[test]
    fn test_rising_volatility_lengthens_lookback() {
        let config = AdaptiveBreakoutConfig::default();
        // Calm window followed by a large final move
        let mut closes: Vec<f64> = (0..30).map(|i| 100.0 + (i % 2) as f64).collect();
        closes.push(130.0);

        match update_lookback(20, &closes, &config) {
            LookbackUpdate::Adjusted {
                previous,
                lookback,
                delta,
            } => {
                assert_eq!(previous, 20);
                assert!(delta > 0.0);
                assert!(lookback > 20);
                assert!(lookback <= 30);
            }
            other => panic!("expected adjustment, got {:?}", other),
        }
    }

    #[test]
    fn test_rescale_clamps_to_bounds() {
        assert_eq!(rescale(20, 5.0, 10, 30), 30);
        assert_eq!(rescale(20, -0.9, 10, 30), 10);
        // Negative scale factor still lands on the floor
        assert_eq!(rescale(20, -3.0, 10, 30), 10);
        assert_eq!(rescale(20, 0.1, 10, 30), 22);
    }

    #[test]
    fn test_rescale_rounds_half_to_even() {
        // 20 * 1.125 = 22.5 -> 22, 18 * 1.25 = 22.5 -> 22, 14 * 1.25 = 17.5 -> 18
        assert_eq!(rescale(20, 0.125, 10, 30), 22);
        assert_eq!(rescale(18, 0.25, 10, 30), 22);
        assert_eq!(rescale(14, 0.25, 10, 30), 18);
    }

    #[test]
    fn test_volatility_delta() {
        assert_relative_eq!(volatility_delta(2.0, 1.0).unwrap(), 0.5);
        assert_eq!(volatility_delta(0.0, 1.0), Err(LookbackSkip::ZeroVolatility));
    }
}
