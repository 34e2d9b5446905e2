//! Travel time estimates from straight-line distance

use crate::models::TravelProfile;

/// Average road speed
pub const CAR_KMH: f64 = 60.0;
/// Average rail speed
pub const TRAIN_KMH: f64 = 80.0;
/// Average walking pace on hill roads
pub const WALK_KMH: f64 = 3.0;

/// Placeholder shown when a duration cannot be computed
pub const NO_VALUE: &str = "—";

const MINUTES_PER_HOUR: u64 = 60;
const MINUTES_PER_DAY: u64 = 24 * MINUTES_PER_HOUR;

impl TravelProfile {
    #[must_use]
    pub fn speed_kmh(&self) -> f64 {
        match self {
            TravelProfile::Car => CAR_KMH,
            TravelProfile::Train => TRAIN_KMH,
            TravelProfile::Walk => WALK_KMH,
        }
    }
}

/// Seconds needed to cover `distance_km` at `speed_kmh`.
///
/// Returns NaN for a zero, negative or non-finite speed so the formatter
/// renders a placeholder instead of a bogus value.
#[must_use]
pub fn estimate_seconds(distance_km: f64, speed_kmh: f64) -> f64 {
    if !speed_kmh.is_finite() || speed_kmh <= 0.0 {
        return f64::NAN;
    }
    distance_km / speed_kmh * 3600.0
}

/// Estimate for one of the fixed travel profiles
#[must_use]
pub fn estimate_for(profile: TravelProfile, distance_km: f64) -> f64 {
    estimate_seconds(distance_km, profile.speed_kmh())
}

/// Render seconds as `45 min`, `1 hr 30 min` or `2 days 3 hr 5 min`.
#[must_use]
pub fn format_duration(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return NO_VALUE.to_string();
    }

    let total_minutes = (seconds / 60.0).round() as u64;
    if total_minutes < MINUTES_PER_HOUR {
        return format!("{total_minutes} min");
    }

    let days = total_minutes / MINUTES_PER_DAY;
    let hours = (total_minutes % MINUTES_PER_DAY) / MINUTES_PER_HOUR;
    let minutes = total_minutes % MINUTES_PER_HOUR;

    if days > 0 {
        format!("{days} days {hours} hr {minutes} min")
    } else {
        format!("{hours} hr {minutes} min")
    }
}

/// Render a distance as meters below one kilometer, otherwise kilometers with one decimal
#[must_use]
pub fn format_distance(km: f64) -> String {
    if !km.is_finite() || km < 0.0 {
        return NO_VALUE.to_string();
    }
    if km < 1.0 {
        format!("{:.0} m", km * 1000.0)
    } else {
        format!("{km:.1} km")
    }
}
