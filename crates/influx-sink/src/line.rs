//! InfluxDB v2 Line Protocol Generation

use crate::Point;

/// Characters escaped in measurement names.
const MEASUREMENT_SPECIALS: [char; 2] = [',', ' '];

/// Characters escaped in tag keys, tag values and field keys.
const KEY_SPECIALS: [char; 3] = [',', '=', ' '];

fn escape_into(out: &mut String, s: &str, specials: &[char]) {
    for c in s.chars() {
        if specials.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Render one point as a line-protocol record with a ns timestamp.
///
/// `measurement,tag=v field=1.5,other=2 1700000000000000000`
pub fn to_line(point: &Point) -> String {
    let mut line = String::new();
    escape_into(&mut line, &point.measurement, &MEASUREMENT_SPECIALS);

    for (key, value) in &point.tags {
        line.push(',');
        escape_into(&mut line, key, &KEY_SPECIALS);
        line.push('=');
        escape_into(&mut line, value, &KEY_SPECIALS);
    }

    line.push(' ');
    for (i, (key, value)) in point.fields.iter().enumerate() {
        if i > 0 {
            line.push(',');
        }
        escape_into(&mut line, key, &KEY_SPECIALS);
        line.push('=');
        line.push_str(&value.to_string());
    }

    line.push(' ');
    line.push_str(&point.timestamp_ns.to_string());
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point() -> Point {
        Point {
            measurement: "anomaly_score".to_string(),
            tags: vec![("sensor_id".to_string(), "pump-1".to_string())],
            fields: vec![("score".to_string(), -0.25)],
            timestamp_ns: 1_700_000_000_000_000_000,
        }
    }

    #[test]
    fn test_basic_line_layout() {
        assert_eq!(
            to_line(&point()),
            "anomaly_score,sensor_id=pump-1 score=-0.25 1700000000000000000"
        );
    }

    #[test]
    fn test_multiple_fields_joined_with_commas() {
        let mut p = point();
        p.measurement = "signal_features".to_string();
        p.fields = vec![
            ("rms_ax".to_string(), 1.5),
            ("peak_freq_ax".to_string(), 120.0),
        ];
        assert_eq!(
            to_line(&p),
            "signal_features,sensor_id=pump-1 rms_ax=1.5,peak_freq_ax=120 1700000000000000000"
        );
    }

    #[test]
    fn test_specials_are_escaped() {
        let mut p = point();
        p.measurement = "cnc mill,7".to_string();
        p.tags = vec![("device_id".to_string(), "rack=2 a".to_string())];
        assert_eq!(
            to_line(&p),
            "cnc\\ mill\\,7,device_id=rack\\=2\\ a score=-0.25 1700000000000000000"
        );
    }
}
