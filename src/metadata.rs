//! Observation records written next to each downloaded exposure.
//!
//! A record is a plain `Key: value` text file. The fetch step writes the
//! first block; the ephemeris step appends the end position:
//!
//! ```text
//! File: ztf_20200115123456_000123_zr_c01_o_q1_sciimg.fits
//! Observation Date: 2020-01-15
//! Observation Time: 12:34:56.789
//! RA: 150.123456
//! Dec: 20.654321
//! Vmag: 17.8
//!
//! # Asteroid motion calculations
//! RA End (deg): 150.124000
//! Dec End (deg): 20.654900
//! Exposure (s): 30.0
//! ```

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use thiserror::Error;

use crate::wcs::SkyPoint;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetadataError {
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingField(Vec<&'static str>),

    #[error("Invalid value for {field}: '{value}'")]
    InvalidValue { field: &'static str, value: String },
}

/// A validated observation record.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationRecord {
    /// File name of the science exposure as listed by the archive.
    pub file_name: String,
    /// Start of the exposure, UTC.
    pub observed_at: NaiveDateTime,
    pub start: SkyPoint,
    pub v_mag: f64,
    pub mjd: Option<f64>,
    /// End position, present once the ephemeris step has run.
    pub end: Option<SkyPoint>,
    pub exposure_s: Option<f64>,
}

fn line_regex() -> &'static Regex {
    static LINE: OnceLock<Regex> = OnceLock::new();
    LINE.get_or_init(|| Regex::new(r"^\s*([^:#][^:]*?)\s*:\s*(.*?)\s*$").expect("valid regex"))
}

impl ObservationRecord {
    pub fn parse(text: &str) -> Result<Self, MetadataError> {
        let fields: HashMap<&str, &str> = text
            .lines()
            .filter_map(|line| {
                let caps = line_regex().captures(line)?;
                Some((caps.get(1)?.as_str(), caps.get(2)?.as_str()))
            })
            .collect();

        const REQUIRED: [&str; 6] = [
            "File",
            "Observation Date",
            "Observation Time",
            "RA",
            "Dec",
            "Vmag",
        ];
        let missing: Vec<&'static str> = REQUIRED
            .into_iter()
            .filter(|key| fields.get(key).map(|v| v.is_empty()).unwrap_or(true))
            .collect();
        if !missing.is_empty() {
            return Err(MetadataError::MissingField(missing));
        }

        let date = fields["Observation Date"];
        let time = fields["Observation Time"];
        let observed_at = parse_timestamp(date, time).ok_or_else(|| MetadataError::InvalidValue {
            field: "Observation Time",
            value: format!("{date} {time}"),
        })?;

        let start = SkyPoint::new(number(&fields, "RA")?, number(&fields, "Dec")?);
        let end = match (
            optional_number(&fields, "RA End (deg)")?,
            optional_number(&fields, "Dec End (deg)")?,
        ) {
            (Some(ra), Some(dec)) => Some(SkyPoint::new(ra, dec)),
            _ => None,
        };

        Ok(Self {
            file_name: fields["File"].to_string(),
            observed_at,
            start,
            v_mag: number(&fields, "Vmag")?,
            mjd: optional_number(&fields, "MJD")?,
            end,
            exposure_s: optional_number(&fields, "Exposure (s)")?,
        })
    }

    /// `YYYY-MM-DD HH:MM:SS.sss`, the form used in reports.
    pub fn observed_at_utc(&self) -> String {
        self.observed_at.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
    }

    /// Lines to append once the end position is known.
    pub fn motion_block(end: &SkyPoint, exposure_s: f64) -> String {
        format!(
            "\n# Asteroid motion calculations\nRA End (deg): {:.6}\nDec End (deg): {:.6}\nExposure (s): {:.1}",
            end.ra, end.dec, exposure_s
        )
    }
}

fn parse_timestamp(date: &str, time: &str) -> Option<NaiveDateTime> {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    let time = NaiveTime::parse_from_str(time, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M"))
        .ok()?;
    Some(date.and_time(time))
}

fn number(fields: &HashMap<&str, &str>, key: &'static str) -> Result<f64, MetadataError> {
    optional_number(fields, key)?.ok_or(MetadataError::MissingField(vec![key]))
}

fn optional_number(
    fields: &HashMap<&str, &str>,
    key: &'static str,
) -> Result<Option<f64>, MetadataError> {
    match fields.get(key) {
        None => Ok(None),
        Some(raw) if raw.is_empty() => Ok(None),
        Some(raw) => raw
            .parse::<f64>()
            .map(Some)
            .map_err(|_| MetadataError::InvalidValue {
                field: key,
                value: raw.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    const RECORD: &str = "File: ztf_20200115123456_000123_zr_c01_o_q1_sciimg.fits
Observation Date: 2020-01-15
Observation Time: 12:34:56.789
MJD: 58863.524268
RA: 150.123456
Dec: 20.654321
r (AU): 1.234
Delta (AU): 0.321
Distance Center: 12.3
Phase: 34.5
Vmag: 17.8
";

    #[test]
    fn test_parse_fetch_record() {
        let record = ObservationRecord::parse(RECORD).unwrap();
        assert_eq!(record.file_name, "ztf_20200115123456_000123_zr_c01_o_q1_sciimg.fits");
        assert_eq!(record.start, SkyPoint::new(150.123456, 20.654321));
        assert_eq!(record.v_mag, 17.8);
        assert_eq!(record.mjd, Some(58863.524268));
        assert_eq!(record.end, None);
        assert_eq!(record.observed_at.hour(), 12);
        assert_eq!(record.observed_at_utc(), "2020-01-15 12:34:56.789");
    }

    #[test]
    fn test_parse_with_motion_block() {
        let text = format!(
            "{RECORD}{}",
            ObservationRecord::motion_block(&SkyPoint::new(150.124, 20.6549), 30.0)
        );
        let record = ObservationRecord::parse(&text).unwrap();
        assert_eq!(record.end, Some(SkyPoint::new(150.124, 20.6549)));
        assert_eq!(record.exposure_s, Some(30.0));
    }

    #[test]
    fn test_missing_fields_are_all_reported() {
        let err = ObservationRecord::parse("File: a.fits\nRA: 10.0\n").unwrap_err();
        assert_eq!(
            err,
            MetadataError::MissingField(vec!["Observation Date", "Observation Time", "Dec", "Vmag"])
        );
        assert!(err.to_string().contains("Observation Date, Observation Time, Dec, Vmag"));
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let text = RECORD.replace("Vmag: 17.8", "Vmag:");
        let err = ObservationRecord::parse(&text).unwrap_err();
        assert_eq!(err, MetadataError::MissingField(vec!["Vmag"]));
    }

    #[test]
    fn test_invalid_number() {
        let text = RECORD.replace("Dec: 20.654321", "Dec: twenty");
        let err = ObservationRecord::parse(&text).unwrap_err();
        assert_eq!(
            err,
            MetadataError::InvalidValue {
                field: "Dec",
                value: "twenty".to_string()
            }
        );
    }

    #[test]
    fn test_invalid_timestamp() {
        let text = RECORD.replace("2020-01-15", "15/01/2020");
        let err = ObservationRecord::parse(&text).unwrap_err();
        assert!(matches!(err, MetadataError::InvalidValue { field: "Observation Time", .. }));
    }

    #[test]
    fn test_comment_lines_ignored() {
        let text = format!("# header: not a field\n{RECORD}");
        assert!(ObservationRecord::parse(&text).is_ok());
    }
}
