//! MOSMIX KML parsing
//!
//! The document carries one shared list of `dwd:TimeStep` timestamps and one
//! `dwd:Forecast` block per element (`TTT`, `Rad1h`, ...), each holding a
//! whitespace-separated value list aligned with the time steps.

use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

use crate::domain::ForecastSeries;
use crate::error::ParseError;

const TIME_STEP: &[u8] = b"dwd:TimeStep";
const FORECAST: &[u8] = b"dwd:Forecast";
const ELEMENT_NAME: &str = "dwd:elementName";
/// MOSMIX marker for "no data"
const MISSING_TOKEN: &str = "-";

/// Global irradiance accumulated over the last hour (kJ/m²)
pub const RAD1H: &str = "Rad1h";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Outside,
    TimeStep,
    TargetForecast,
    TargetValue,
}

/// Parse a MOSMIX document into the series for `element`.
pub fn parse_forecast(document: &[u8], element: &str) -> Result<ForecastSeries, ParseError> {
    let mut reader = Reader::from_reader(document);
    reader.trim_text(true);

    let mut raw_steps: Vec<String> = Vec::new();
    let mut raw_values: Option<String> = None;
    let mut pending = String::new();
    let mut position = Position::Outside;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                TIME_STEP => {
                    position = Position::TimeStep;
                    pending.clear();
                }
                FORECAST if raw_values.is_none() => {
                    let attr = e
                        .try_get_attribute(ELEMENT_NAME)
                        .map_err(quick_xml::Error::from)?;
                    if let Some(attr) = attr {
                        if attr.unescape_value()? == element {
                            position = Position::TargetForecast;
                        }
                    }
                }
                _ if position == Position::TargetForecast
                    && e.local_name().as_ref().eq_ignore_ascii_case(b"value") =>
                {
                    position = Position::TargetValue;
                    pending.clear();
                }
                _ => {}
            },
            Event::Text(t) => {
                if matches!(position, Position::TimeStep | Position::TargetValue) {
                    if !pending.is_empty() {
                        pending.push(' ');
                    }
                    pending.push_str(&t.unescape()?);
                }
            }
            Event::End(e) => match position {
                Position::TimeStep if e.name().as_ref() == TIME_STEP => {
                    raw_steps.push(std::mem::take(&mut pending));
                    position = Position::Outside;
                }
                Position::TargetValue if e.local_name().as_ref().eq_ignore_ascii_case(b"value") => {
                    raw_values = Some(std::mem::take(&mut pending));
                    position = Position::TargetForecast;
                }
                Position::TargetForecast if e.name().as_ref() == FORECAST => {
                    position = Position::Outside;
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if raw_steps.is_empty() {
        return Err(ParseError::MissingTimeSteps);
    }
    let raw_values = raw_values.ok_or_else(|| ParseError::MissingSeries {
        element: element.to_string(),
    })?;

    let timestamps = parse_timestamps(&raw_steps)?;
    let values = parse_values(&raw_values)?;
    debug!(
        element,
        time_steps = timestamps.len(),
        values = values.len(),
        "parsed forecast document"
    );

    ForecastSeries::new(timestamps, values)
}

fn parse_timestamps(raw: &[String]) -> Result<Vec<DateTime<Utc>>, ParseError> {
    raw.iter()
        .enumerate()
        .map(|(index, s)| {
            DateTime::parse_from_rfc3339(s.trim())
                .map(|t| t.with_timezone(&Utc))
                .map_err(|_| ParseError::InvalidTimestamp {
                    index,
                    raw: s.clone(),
                })
        })
        .collect()
}

fn parse_values(raw: &str) -> Result<Vec<f64>, ParseError> {
    raw.split_whitespace()
        .enumerate()
        .map(|(index, token)| {
            if token == MISSING_TOKEN {
                return Err(ParseError::MissingValue { index });
            }
            match token.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(v),
                _ => Err(ParseError::InvalidValue {
                    index,
                    raw: token.to_string(),
                }),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    const SAMPLE: &str = include_str!("../../tests/fixtures/mosmix_p444.kml");

    fn document(steps: &[&str], forecasts: &[(&str, &str)]) -> String {
        let steps: String = steps
            .iter()
            .map(|s| format!("<dwd:TimeStep>{s}</dwd:TimeStep>"))
            .collect();
        let forecasts: String = forecasts
            .iter()
            .map(|(name, values)| {
                format!(
                    r#"<dwd:Forecast dwd:elementName="{name}"><dwd:value>{values}</dwd:value></dwd:Forecast>"#
                )
            })
            .collect();
        format!(
            r#"<kml:kml xmlns:dwd="urn:dwd" xmlns:kml="urn:kml"><kml:Document>
<dwd:ForecastTimeSteps>{steps}</dwd:ForecastTimeSteps>
<kml:Placemark><kml:ExtendedData>{forecasts}</kml:ExtendedData></kml:Placemark>
</kml:Document></kml:kml>"#
        )
    }

    const STEPS: [&str; 3] = [
        "2024-06-01T10:00:00.000Z",
        "2024-06-01T11:00:00.000Z",
        "2024-06-01T12:00:00.000Z",
    ];

    #[test]
    fn test_parse_sample_rad1h() {
        let series = parse_forecast(SAMPLE.as_bytes(), RAD1H).unwrap();
        assert_eq!(series.len(), 6);
        assert_eq!(
            series.timestamps()[0],
            Utc.with_ymd_and_hms(2024, 6, 1, 4, 0, 0).unwrap()
        );
        assert_eq!(series.values(), &[0.0, 45.0, 360.0, 1080.0, 1620.0, 2160.0]);
    }

    #[test]
    fn test_parse_selects_requested_element() {
        let series = parse_forecast(SAMPLE.as_bytes(), "TTT").unwrap();
        assert!((series.values()[0] - 286.95).abs() < 1e-9);
    }

    #[test]
    fn test_parse_rejects_missing_marker() {
        let err = parse_forecast(SAMPLE.as_bytes(), "RRad1").unwrap_err();
        assert!(matches!(err, ParseError::MissingValue { index: 0 }));
    }

    #[test]
    fn test_parse_missing_series() {
        let err = parse_forecast(SAMPLE.as_bytes(), "SunD1").unwrap_err();
        assert!(matches!(err, ParseError::MissingSeries { ref element } if element == "SunD1"));
    }

    #[test]
    fn test_parse_length_mismatch_is_fatal() {
        let doc = document(&STEPS, &[(RAD1H, "1.0 2.0")]);
        let err = parse_forecast(doc.as_bytes(), RAD1H).unwrap_err();
        assert!(matches!(
            err,
            ParseError::LengthMismatch {
                timestamps: 3,
                values: 2
            }
        ));
    }

    #[test]
    fn test_parse_extra_values_are_fatal() {
        let doc = document(&STEPS, &[(RAD1H, "1 2 3 4")]);
        assert!(matches!(
            parse_forecast(doc.as_bytes(), RAD1H),
            Err(ParseError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_parse_without_time_steps() {
        let doc = document(&[], &[(RAD1H, "")]);
        assert!(matches!(
            parse_forecast(doc.as_bytes(), RAD1H),
            Err(ParseError::MissingTimeSteps)
        ));
    }

    #[rstest]
    #[case("1.0 abc 3.0", 1)]
    #[case("NaN 2 3", 0)]
    #[case("1 2 inf", 2)]
    fn test_parse_rejects_non_numeric(#[case] values: &str, #[case] bad_index: usize) {
        let doc = document(&STEPS, &[(RAD1H, values)]);
        let err = parse_forecast(doc.as_bytes(), RAD1H).unwrap_err();
        assert!(matches!(err, ParseError::InvalidValue { index, .. } if index == bad_index));
    }

    #[test]
    fn test_parse_rejects_bad_timestamp() {
        let doc = document(&["2024-06-01 10:00", STEPS[1], STEPS[2]], &[(RAD1H, "1 2 3")]);
        assert!(matches!(
            parse_forecast(doc.as_bytes(), RAD1H),
            Err(ParseError::InvalidTimestamp { index: 0, .. })
        ));
    }

    #[test]
    fn test_parse_offsets_are_normalized() {
        let doc = document(
            &["2024-06-01T12:00:00+02:00", "2024-06-01T11:00:00Z"],
            &[(RAD1H, "5 6")],
        );
        let series = parse_forecast(doc.as_bytes(), RAD1H).unwrap();
        assert_eq!(series.timestamps()[0], series.timestamps()[1] - chrono::Duration::hours(1));
    }

    #[test]
    fn test_parse_garbage_is_xml_error() {
        let err = parse_forecast(b"<kml><dwd:TimeStep>x</kml>", RAD1H).unwrap_err();
        assert!(matches!(err, ParseError::Xml(_)));
    }
}
