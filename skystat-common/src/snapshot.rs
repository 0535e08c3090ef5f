///! Snapshot record and the closed filter enumeration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Exposure times below this floor act as the floor wherever an exposure
/// drives refresh cadence or the renderer time budget. The stored value is
/// never mutated.
pub const MIN_EFFECTIVE_EXPOSURE_SECS: f64 = 10.0;

/// Filter wheel position. Closed enumeration: a stored code outside it is an
/// invalid state reported as [`UnknownFilter`], never mapped to a guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Filter {
    Luminance,
    Red,
    Green,
    Blue,
    HAlpha,
    Oiii,
    Sii,
}

/// A stored filter code that does not resolve through the closed enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown filter code {0}")]
pub struct UnknownFilter(pub i64);

impl Filter {
    /// Resolve a stored filter code.
    pub fn from_code(code: i64) -> Result<Self, UnknownFilter> {
        match code {
            0 => Ok(Filter::Luminance),
            1 => Ok(Filter::Red),
            2 => Ok(Filter::Green),
            3 => Ok(Filter::Blue),
            4 => Ok(Filter::HAlpha),
            5 => Ok(Filter::Oiii),
            6 => Ok(Filter::Sii),
            other => Err(UnknownFilter(other)),
        }
    }

    /// The wheel code this position is stored as.
    pub fn code(self) -> i64 {
        match self {
            Filter::Luminance => 0,
            Filter::Red => 1,
            Filter::Green => 2,
            Filter::Blue => 3,
            Filter::HAlpha => 4,
            Filter::Oiii => 5,
            Filter::Sii => 6,
        }
    }

    /// Display label.
    pub fn label(self) -> &'static str {
        match self {
            Filter::Luminance => "Luminance",
            Filter::Red => "Red",
            Filter::Green => "Green",
            Filter::Blue => "Blue",
            Filter::HAlpha => "H-alpha",
            Filter::Oiii => "O-III",
            Filter::Sii => "S-II",
        }
    }
}

/// Snapshot fields as supplied by ingestion, before the store assigns an id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSnapshot {
    pub instrument: String,
    pub project: String,
    pub update_time: DateTime<Utc>,
    pub avg_guide_error: f64,
    pub ccd_temperature: f64,
    pub last_image_start: DateTime<Utc>,
    pub exposure_time: f64,
    pub current_task_id: i64,
    pub right_ascension: f64,
    pub declination: f64,
    pub west_pier: bool,
    pub filter_code: i64,
    pub site_longitude: f64,
    pub site_latitude: f64,
    pub focus: i64,
}

impl NewSnapshot {
    /// Attach the id assigned by the store.
    pub fn with_id(self, id: i64) -> StatusSnapshot {
        StatusSnapshot {
            id,
            instrument: self.instrument,
            project: self.project,
            update_time: self.update_time,
            avg_guide_error: self.avg_guide_error,
            ccd_temperature: self.ccd_temperature,
            last_image_start: self.last_image_start,
            exposure_time: self.exposure_time,
            current_task_id: self.current_task_id,
            right_ascension: self.right_ascension,
            declination: self.declination,
            west_pier: self.west_pier,
            filter_code: self.filter_code,
            site_longitude: self.site_longitude,
            site_latitude: self.site_latitude,
            focus: self.focus,
        }
    }
}

/// One immutable recorded observation of telescope and instrument state.
/// Corrections arrive as new snapshots; rows are never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub id: i64,
    pub instrument: String,
    pub project: String,
    pub update_time: DateTime<Utc>,
    /// Average guiding error in arcseconds.
    pub avg_guide_error: f64,
    /// CCD temperature in degrees Celsius.
    pub ccd_temperature: f64,
    pub last_image_start: DateTime<Utc>,
    /// Planned exposure duration in seconds, as stored.
    pub exposure_time: f64,
    pub current_task_id: i64,
    /// Decimal degrees.
    pub right_ascension: f64,
    /// Decimal degrees.
    pub declination: f64,
    /// true = optical tube on the west side of the pier.
    pub west_pier: bool,
    pub filter_code: i64,
    pub site_longitude: f64,
    pub site_latitude: f64,
    pub focus: i64,
}

impl StatusSnapshot {
    /// Exposure time with the floor applied, for refresh cadence and the
    /// renderer time budget.
    pub fn effective_exposure_secs(&self) -> f64 {
        if self.exposure_time < MIN_EFFECTIVE_EXPOSURE_SECS {
            MIN_EFFECTIVE_EXPOSURE_SECS
        } else {
            self.exposure_time
        }
    }

    /// Clamped exposure rounded to a whole second, for display and the
    /// refresh header.
    pub fn display_exposure_secs(&self) -> u64 {
        self.effective_exposure_secs().round() as u64
    }

    /// Resolve the stored filter code through the closed enumeration.
    pub fn filter(&self) -> Result<Filter, UnknownFilter> {
        Filter::from_code(self.filter_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot_with_exposure(exposure_time: f64) -> StatusSnapshot {
        let t = Utc.with_ymd_and_hms(2026, 3, 14, 1, 59, 26).unwrap();
        NewSnapshot {
            instrument: "SX-56".to_string(),
            project: "M42".to_string(),
            update_time: t,
            avg_guide_error: 0.42,
            ccd_temperature: -20.0,
            last_image_start: t,
            exposure_time,
            current_task_id: 7,
            right_ascension: 83.82,
            declination: -5.39,
            west_pier: true,
            filter_code: 0,
            site_longitude: 8.82,
            site_latitude: 47.22,
            focus: 31250,
        }
        .with_id(1)
    }

    #[test]
    fn test_filter_codes_round_trip() {
        for code in 0..=6 {
            let filter = Filter::from_code(code).unwrap();
            assert_eq!(filter.code(), code);
        }
    }

    #[test]
    fn test_filter_labels() {
        assert_eq!(Filter::from_code(0).unwrap().label(), "Luminance");
        assert_eq!(Filter::from_code(4).unwrap().label(), "H-alpha");
        assert_eq!(Filter::from_code(5).unwrap().label(), "O-III");
        assert_eq!(Filter::from_code(6).unwrap().label(), "S-II");
    }

    #[test]
    fn test_out_of_range_filter_is_an_error() {
        assert_eq!(Filter::from_code(7), Err(UnknownFilter(7)));
        assert_eq!(Filter::from_code(-1), Err(UnknownFilter(-1)));
        let snapshot = StatusSnapshot {
            filter_code: 99,
            ..snapshot_with_exposure(30.0)
        };
        assert_eq!(snapshot.filter(), Err(UnknownFilter(99)));
    }

    #[test]
    fn test_exposure_floor_applies_below_ten() {
        assert_eq!(snapshot_with_exposure(0.0).effective_exposure_secs(), 10.0);
        assert_eq!(snapshot_with_exposure(9.99).effective_exposure_secs(), 10.0);
        assert_eq!(snapshot_with_exposure(10.0).effective_exposure_secs(), 10.0);
        assert_eq!(snapshot_with_exposure(12.4).effective_exposure_secs(), 12.4);
    }

    #[test]
    fn test_exposure_display_rounds_after_clamp() {
        assert_eq!(snapshot_with_exposure(3.0).display_exposure_secs(), 10);
        assert_eq!(snapshot_with_exposure(12.4).display_exposure_secs(), 12);
        assert_eq!(snapshot_with_exposure(12.5).display_exposure_secs(), 13);
    }

    #[test]
    fn test_stored_exposure_is_never_mutated() {
        let snapshot = snapshot_with_exposure(2.5);
        let _ = snapshot.effective_exposure_secs();
        assert_eq!(snapshot.exposure_time, 2.5);
    }
}
