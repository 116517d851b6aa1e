//! CSV and GPX serialization of stored sessions
//!
//! Both formats carry every recorded point in original order with ISO-8601
//! millisecond timestamps. The output is a plain UTF-8 blob handed to a
//! generic share/save mechanism; no field ever contains a comma, so CSV
//! quoting is unnecessary.

use crate::format::format_date;
use crate::track::session::Session;
use chrono::{DateTime, SecondsFormat, Utc};

/// Render a timestamp as ISO-8601 with millisecond precision (UTC)
fn iso8601(timestamp_millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_millis)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| timestamp_millis.to_string())
}

/// Serialize a session as CSV: `Timestamp,Latitude,Longitude` header plus
/// one row per point
pub fn to_csv(session: &Session) -> String {
    let mut out = String::from("Timestamp,Latitude,Longitude\n");
    let rows: Vec<String> = session
        .points
        .iter()
        .map(|p| format!("{},{},{}", iso8601(p.timestamp_millis), p.latitude, p.longitude))
        .collect();
    out.push_str(&rows.join("\n"));
    out
}

/// Serialize a session as a minimal GPX 1.1 document: one track, one
/// segment, one `<trkpt>` per point
pub fn to_gpx(session: &Session) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<gpx version=\"1.1\" creator=\"geotrack\">\n");
    out.push_str("  <trk>\n");
    out.push_str(&format!(
        "    <name>Track {}</name>\n",
        format_date(session.start_time)
    ));
    out.push_str("    <trkseg>\n");
    for p in &session.points {
        out.push_str(&format!(
            "      <trkpt lat=\"{}\" lon=\"{}\">\n        <time>{}</time>\n      </trkpt>\n",
            p.latitude,
            p.longitude,
            iso8601(p.timestamp_millis)
        ));
    }
    out.push_str("    </trkseg>\n");
    out.push_str("  </trk>\n");
    out.push_str("</gpx>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::session::Fix;

    fn session() -> Session {
        Session {
            start_time: 1_700_000_000_000,
            end_time: Some(1_700_000_010_000),
            points: vec![
                Fix {
                    latitude: 7.2513,
                    longitude: 80.3464,
                    timestamp_millis: 1_700_000_000_000,
                },
                Fix {
                    latitude: 7.252,
                    longitude: 80.3464,
                    timestamp_millis: 1_700_000_005_000,
                },
                Fix {
                    latitude: 7.2527,
                    longitude: 80.3471,
                    timestamp_millis: 1_700_000_010_000,
                },
            ],
            distance: 155.7,
        }
    }

    #[test]
    fn test_csv_header_and_row_count() {
        let csv = to_csv(&session());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Timestamp,Latitude,Longitude");
        assert_eq!(lines.len(), 4); // header + one row per point
    }

    #[test]
    fn test_csv_rows_in_original_order() {
        let csv = to_csv(&session());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[1], "2023-11-14T22:13:20.000Z,7.2513,80.3464");
        assert_eq!(lines[2], "2023-11-14T22:13:25.000Z,7.252,80.3464");
        assert_eq!(lines[3], "2023-11-14T22:13:30.000Z,7.2527,80.3471");
    }

    #[test]
    fn test_csv_empty_session_is_header_only() {
        let empty = Session::new(1_700_000_000_000);
        assert_eq!(to_csv(&empty), "Timestamp,Latitude,Longitude\n");
    }

    #[test]
    fn test_gpx_one_trkpt_per_point() {
        let gpx = to_gpx(&session());
        assert_eq!(gpx.matches("<trkpt ").count(), 3);
        assert_eq!(gpx.matches("<trk>").count(), 1);
        assert_eq!(gpx.matches("<trkseg>").count(), 1);
    }

    #[test]
    fn test_gpx_structure_and_order() {
        let gpx = to_gpx(&session());
        assert!(gpx.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(gpx.contains("<gpx version=\"1.1\" creator=\"geotrack\">"));
        assert!(gpx.contains("<name>Track 2023-11-14 22:13</name>"));

        let first = gpx.find("lat=\"7.2513\"").unwrap();
        let second = gpx.find("lat=\"7.252\"").unwrap();
        let third = gpx.find("lat=\"7.2527\"").unwrap();
        assert!(first < second && second < third);
    }

    #[test]
    fn test_gpx_times_are_iso8601() {
        let gpx = to_gpx(&session());
        assert!(gpx.contains("<time>2023-11-14T22:13:20.000Z</time>"));
        assert!(gpx.contains("<time>2023-11-14T22:13:30.000Z</time>"));
    }
}
