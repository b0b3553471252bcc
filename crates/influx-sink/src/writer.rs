//! Point Writers

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::line;
use crate::{Point, PointWriter, SinkError};

/// InfluxDB v2 connection settings
#[derive(Debug, Clone)]
pub struct InfluxConfig {
    /// Base URL, e.g. `http://influx:8086`
    pub url: String,
    pub org: String,
    pub bucket: String,
    pub token: String,
}

/// HTTP writer against the InfluxDB v2 write API.
pub struct InfluxWriter {
    config: InfluxConfig,
    client: reqwest::Client,
}

impl InfluxWriter {
    pub fn new(config: InfluxConfig) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SinkError::Client(e.to_string()))?;

        Ok(Self {
            config: InfluxConfig {
                url: config.url.trim_end_matches('/').to_string(),
                ..config
            },
            client,
        })
    }

    /// Health probe against `/ping`; run at service startup before any
    /// event is consumed.
    pub async fn ping(&self) -> Result<(), SinkError> {
        let url = format!("{}/ping", self.config.url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SinkError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SinkError::Unreachable(format!(
                "status {}",
                response.status()
            )));
        }

        info!(url = %self.config.url, "sink reachable");
        Ok(())
    }
}

#[async_trait]
impl PointWriter for InfluxWriter {
    async fn write_point(&self, point: &Point) -> Result<(), SinkError> {
        if point.fields.is_empty() {
            return Err(SinkError::EmptyPoint);
        }

        let url = format!("{}/api/v2/write", self.config.url);
        let response = self
            .client
            .post(&url)
            .query(&[
                ("org", self.config.org.as_str()),
                ("bucket", self.config.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header("Authorization", format!("Token {}", self.config.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(line::to_line(point))
            .send()
            .await
            .map_err(|e| SinkError::Write(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SinkError::Write(format!("status {}", response.status())));
        }

        debug!(measurement = %point.measurement, "point written");
        Ok(())
    }
}

/// In-memory writer recording points, with an optional forced failure
/// for exercising sink-error paths.
#[derive(Default)]
pub struct MemoryWriter {
    points: Mutex<Vec<Point>>,
    fail_tag_value: Mutex<Option<String>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail writes for points carrying this tag value.
    pub fn fail_when_tagged(&self, tag_value: &str) {
        let mut fail = self.fail_tag_value.lock().unwrap_or_else(|e| e.into_inner());
        *fail = Some(tag_value.to_string());
    }

    /// Snapshot of everything written so far.
    pub fn points(&self) -> Vec<Point> {
        self.points
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl PointWriter for MemoryWriter {
    async fn write_point(&self, point: &Point) -> Result<(), SinkError> {
        if point.fields.is_empty() {
            return Err(SinkError::EmptyPoint);
        }

        let fail = self.fail_tag_value.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tag_value) = fail.as_deref() {
            if point.tags.iter().any(|(_, v)| v == tag_value) {
                return Err(SinkError::Write(format!(
                    "forced failure for tag {tag_value}"
                )));
            }
        }
        drop(fail);

        let mut points = self.points.lock().unwrap_or_else(|e| e.into_inner());
        points.push(point.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(tag_value: &str) -> Point {
        Point {
            measurement: "anomaly_score".to_string(),
            tags: vec![("sensor_id".to_string(), tag_value.to_string())],
            fields: vec![("score".to_string(), 0.5)],
            timestamp_ns: 0,
        }
    }

    #[tokio::test]
    async fn test_memory_writer_records_points() {
        let writer = MemoryWriter::new();
        writer.write_point(&point("a")).await.unwrap();
        writer.write_point(&point("b")).await.unwrap();

        let points = writer.points();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].tags[0].1, "b");
    }

    #[tokio::test]
    async fn test_memory_writer_forced_failure() {
        let writer = MemoryWriter::new();
        writer.fail_when_tagged("bad");

        assert!(writer.write_point(&point("good")).await.is_ok());
        assert!(matches!(
            writer.write_point(&point("bad")).await,
            Err(SinkError::Write(_))
        ));
        assert_eq!(writer.points().len(), 1);
    }

    #[tokio::test]
    async fn test_point_without_fields_rejected() {
        let writer = MemoryWriter::new();
        let mut empty = point("a");
        empty.fields.clear();

        assert!(matches!(
            writer.write_point(&empty).await,
            Err(SinkError::EmptyPoint)
        ));
    }

    #[test]
    fn test_influx_writer_trims_trailing_slash() {
        let writer = InfluxWriter::new(InfluxConfig {
            url: "http://influx:8086/".to_string(),
            org: "vibro".to_string(),
            bucket: "scores".to_string(),
            token: "secret".to_string(),
        })
        .unwrap();
        assert_eq!(writer.config.url, "http://influx:8086");
    }
}
