//! InfluxDB v2 sink over the HTTP write API.
//!
//! Each flush is a single synchronous `POST /api/v2/write` with the batch
//! encoded as line protocol at nanosecond precision. The store accepts or
//! rejects the request as a whole.

use ureq::{Agent, AgentBuilder};

use crate::config::StoreConfig;
use crate::error::{ConfigError, SinkError};
use crate::event::TelemetryEvent;
use crate::line_protocol::LineFormat;
use crate::sink::TelemetrySink;

/// Blocking InfluxDB writer.
pub struct InfluxSink {
    agent: Agent,
    config: StoreConfig,
    format: LineFormat,
    closed: bool,
}

impl InfluxSink {
    pub fn new(config: StoreConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let agent = AgentBuilder::new().timeout(config.timeout).build();
        let format = LineFormat::new(&config.measurement, &config.tags);
        Ok(Self {
            agent,
            config,
            format,
            closed: false,
        })
    }

    /// Write endpoint without the query string.
    pub fn write_endpoint(&self) -> String {
        format!("{}/api/v2/write", self.config.url.trim_end_matches('/'))
    }

    /// Query parameters sent with every write.
    pub fn write_query(&self) -> [(&'static str, &str); 3] {
        [
            ("org", self.config.org.as_str()),
            ("bucket", self.config.bucket.as_str()),
            ("precision", "ns"),
        ]
    }

    /// `Authorization` header value, if a token is configured.
    pub fn auth_header(&self) -> Option<String> {
        if self.config.token.is_empty() {
            None
        } else {
            Some(format!("Token {}", self.config.token))
        }
    }

    /// Best-effort reachability check against `/health`.
    pub fn ping(&self) -> Result<(), SinkError> {
        let url = format!("{}/health", self.config.url.trim_end_matches('/'));
        self.agent.get(&url).call().map_err(map_ureq_error)?;
        Ok(())
    }
}

impl TelemetrySink for InfluxSink {
    fn name(&self) -> &'static str {
        "influx"
    }

    fn write_batch(&mut self, batch: &[TelemetryEvent]) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Closed);
        }

        let body = self.format.encode(batch);
        let mut request = self
            .agent
            .post(&self.write_endpoint())
            .set("Content-Type", "text/plain; charset=utf-8")
            .set("Accept", "application/json");
        for (k, v) in self.write_query() {
            request = request.query(k, v);
        }
        if let Some(auth) = self.auth_header() {
            request = request.set("Authorization", &auth);
        }

        request.send_string(&body).map_err(map_ureq_error)?;
        log::debug!("influx accepted {} point(s)", batch.len());
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.closed = true;
        Ok(())
    }
}

fn map_ureq_error(e: ureq::Error) -> SinkError {
    match e {
        ureq::Error::Status(status, response) => SinkError::Rejected {
            status,
            body: response.into_string().unwrap_or_default(),
        },
        ureq::Error::Transport(t) => SinkError::Transport(t.to_string()),
    }
}
