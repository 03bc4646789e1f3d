use crate::error::{ApiError, Result};
use crate::MonitoringApi;
use async_trait::async_trait;
use hostpulse_common::types::{CheckReport, Host, HostSpec, MetricSample};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const API_KEY_HEADER: &str = "X-Api-Key";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpApiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    verbose: bool,
}

#[derive(Deserialize)]
struct CreateHostResponse {
    id: String,
}

#[derive(Deserialize)]
struct FindHostResponse {
    host: Host,
}

#[derive(Deserialize)]
struct FindHostsResponse {
    hosts: Vec<Host>,
}

impl HttpApiClient {
    pub fn new(base_url: &str, api_key: &str, verbose: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("hostpulse-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
            verbose,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, builder: reqwest::RequestBuilder, path: &str) -> Result<String> {
        let resp = builder.header(API_KEY_HEADER, &self.api_key).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if self.verbose {
            tracing::debug!(path, status = status.as_u16(), body = %body, "API response");
        }
        if status.is_success() {
            Ok(body)
        } else {
            Err(ApiError::from_status(status.as_u16(), body))
        }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        payload: Option<&Value>,
    ) -> Result<T> {
        let mut builder = self.client.request(method, self.url(path));
        if let Some(payload) = payload {
            builder = builder.json(payload);
        }
        let body = self.send(builder, path).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl MonitoringApi for HttpApiClient {
    async fn create_host(&self, spec: &HostSpec) -> Result<String> {
        let payload = serde_json::to_value(spec)?;
        let resp: CreateHostResponse = self
            .request(Method::POST, "/api/v0/hosts", Some(&payload))
            .await?;
        Ok(resp.id)
    }

    async fn find_host(&self, host_id: &str) -> Result<Host> {
        let resp: FindHostResponse = self
            .request(Method::GET, &format!("/api/v0/hosts/{host_id}"), None)
            .await?;
        Ok(resp.host)
    }

    async fn find_host_by_custom_identifier(&self, custom_identifier: &str) -> Result<Host> {
        let path = "/api/v0/hosts";
        let builder = self
            .client
            .get(self.url(path))
            .query(&[("customIdentifier", custom_identifier)]);
        let body = self.send(builder, path).await?;
        let resp: FindHostsResponse = serde_json::from_str(&body)?;
        resp.hosts.into_iter().next().ok_or_else(|| {
            ApiError::NotFound(format!("no host for custom identifier {custom_identifier}"))
        })
    }

    async fn update_host(&self, host_id: &str, spec: &HostSpec) -> Result<()> {
        let payload = serde_json::to_value(spec)?;
        let _: Value = self
            .request(Method::PUT, &format!("/api/v0/hosts/{host_id}"), Some(&payload))
            .await?;
        Ok(())
    }

    async fn update_host_status(&self, host_id: &str, status: &str) -> Result<()> {
        let payload = json!({ "status": status });
        let _: Value = self
            .request(
                Method::POST,
                &format!("/api/v0/hosts/{host_id}/status"),
                Some(&payload),
            )
            .await?;
        Ok(())
    }

    async fn post_metrics_values(&self, values: &[MetricSample]) -> Result<()> {
        let payload = serde_json::to_value(values)?;
        let _: Value = self
            .request(Method::POST, "/api/v0/tsdb", Some(&payload))
            .await?;
        Ok(())
    }

    async fn report_check_monitors(&self, host_id: &str, reports: &[CheckReport]) -> Result<()> {
        let payload = check_reports_payload(host_id, reports);
        let _: Value = self
            .request(
                Method::POST,
                "/api/v0/monitoring/checks/report",
                Some(&payload),
            )
            .await?;
        Ok(())
    }
}

fn check_reports_payload(host_id: &str, reports: &[CheckReport]) -> Value {
    let reports: Vec<Value> = reports
        .iter()
        .map(|r| {
            json!({
                "source": { "type": "host", "hostId": host_id },
                "name": r.name,
                "status": r.status,
                "message": r.message,
                "occurredAt": r.occurred_at.timestamp(),
            })
        })
        .collect();
    json!({ "reports": reports })
}
