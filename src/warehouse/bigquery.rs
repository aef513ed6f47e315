// src/warehouse/bigquery.rs
use anyhow::{bail, Context, Result};
use reqwest::{header::CONTENT_TYPE, Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument};

use super::{Warehouse, RAW_SCHEMA};
use crate::normalize::MetricRecord;

pub const DEFAULT_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";
pub const DEFAULT_UPLOAD_URL: &str = "https://bigquery.googleapis.com/upload/bigquery/v2";

const MULTIPART_BOUNDARY: &str = "indexscraper-load-boundary";
const JOB_POLL: Duration = Duration::from_secs(2);
/// Ten minutes at the default poll interval.
const JOB_MAX_POLLS: u32 = 300;

/// BigQuery over its v2 REST API. The caller supplies an OAuth bearer token.
/// Appends run as `WRITE_APPEND` load jobs.
pub struct BigQueryWarehouse {
    client: Client,
    base: String,
    upload_base: String,
    project: String,
    dataset: String,
    token: Option<String>,
    poll: Duration,
    max_polls: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: Option<JobReference>,
    #[serde(default)]
    errors: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    #[serde(default)]
    state: String,
    error_result: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Job {
    job_reference: Option<JobReference>,
    #[serde(default)]
    status: JobStatus,
}

async fn check(resp: Response, what: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    bail!("{} failed with HTTP {}: {}", what, status, body)
}

/// One JSON object per line, as BigQuery's NEWLINE_DELIMITED_JSON expects.
fn ndjson(records: &[MetricRecord]) -> Result<String> {
    let mut out = String::new();
    for r in records {
        out.push_str(&serde_json::to_string(r)?);
        out.push('\n');
    }
    Ok(out)
}

/// `multipart/related` body: job configuration, then the data.
fn multipart_body(config: &Value, data: &str) -> String {
    format!(
        "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{config}\r\n\
         --{b}\r\nContent-Type: application/octet-stream\r\n\r\n{data}\r\n--{b}--\r\n",
        b = MULTIPART_BOUNDARY,
        config = config,
        data = data,
    )
}

impl BigQueryWarehouse {
    pub fn new(client: Client, project: &str, dataset: &str, token: Option<String>) -> Self {
        Self {
            client,
            base: DEFAULT_BASE_URL.to_string(),
            upload_base: DEFAULT_UPLOAD_URL.to_string(),
            project: project.to_string(),
            dataset: dataset.to_string(),
            token,
            poll: JOB_POLL,
            max_polls: JOB_MAX_POLLS,
        }
    }

    /// Point at another host; uploads go to `<base>/upload`.
    pub fn with_base_url(
        client: Client,
        base: &str,
        project: &str,
        dataset: &str,
        token: Option<String>,
    ) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            base: base.to_string(),
            upload_base: format!("{}/upload", base),
            ..Self::new(client, project, dataset, token)
        }
    }

    /// Poll interval and poll count for jobs that do not finish at once.
    pub fn with_job_polling(mut self, poll: Duration, max_polls: u32) -> Self {
        self.poll = poll;
        self.max_polls = max_polls;
        self
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    fn tables_url(&self) -> String {
        format!(
            "{}/projects/{}/datasets/{}/tables",
            self.base, self.project, self.dataset
        )
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }

    fn schema_json() -> Value {
        let fields: Vec<Value> = RAW_SCHEMA
            .iter()
            .map(|f| {
                json!({
                    "name": f.name,
                    "type": f.ty,
                    "mode": if f.required { "REQUIRED" } else { "NULLABLE" },
                })
            })
            .collect();
        json!({ "fields": fields })
    }

    fn load_config(&self, table: &str) -> Value {
        json!({
            "configuration": {
                "load": {
                    "destinationTable": {
                        "projectId": self.project,
                        "datasetId": self.dataset,
                        "tableId": table,
                    },
                    "schema": Self::schema_json(),
                    "sourceFormat": "NEWLINE_DELIMITED_JSON",
                    "writeDisposition": "WRITE_APPEND",
                }
            }
        })
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        let url = format!("{}/{}", self.tables_url(), table);
        let resp = self
            .authed(self.client.delete(&url))
            .send()
            .await
            .with_context(|| format!("deleting table {}", table))?;
        if resp.status() == StatusCode::NOT_FOUND {
            info!(table, "raw table did not exist");
            return Ok(());
        }
        check(resp, "delete table").await?;
        info!(table, "dropped raw table");
        Ok(())
    }

    async fn create_table(&self, table: &str) -> Result<()> {
        let body = json!({
            "tableReference": {
                "projectId": self.project,
                "datasetId": self.dataset,
                "tableId": table,
            },
            "schema": Self::schema_json(),
        });
        let resp = self
            .authed(self.client.post(self.tables_url()))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("creating table {}", table))?;
        if resp.status() == StatusCode::CONFLICT {
            info!(table, "raw table already exists");
            return Ok(());
        }
        check(resp, "create table").await?;
        info!(table, "created raw table");
        Ok(())
    }

    fn job_outcome(job: &Job) -> Result<bool> {
        if let Some(err) = &job.status.error_result {
            bail!("job failed: {}", err);
        }
        Ok(job.status.state == "DONE")
    }

    /// Poll `jobs.get` until the job is DONE, giving up after `max_polls`.
    async fn wait_for_job(&self, job: &JobReference) -> Result<()> {
        let url = format!("{}/projects/{}/jobs/{}", self.base, self.project, job.job_id);
        for attempt in 1..=self.max_polls {
            sleep(self.poll).await;
            let mut req = self.authed(self.client.get(&url));
            if let Some(loc) = &job.location {
                req = req.query(&[("location", loc)]);
            }
            let resp = req.send().await.context("polling job")?;
            let polled: Job = check(resp, "jobs.get").await?.json().await?;
            if Self::job_outcome(&polled).with_context(|| format!("job {}", job.job_id))? {
                return Ok(());
            }
            debug!(job = %job.job_id, attempt, state = %polled.status.state, "job still running");
        }
        bail!(
            "job {} not done after {} polls of {:?}",
            job.job_id,
            self.max_polls,
            self.poll
        )
    }
}

impl Warehouse for BigQueryWarehouse {
    #[instrument(level = "info", skip(self), fields(dataset = %self.dataset))]
    async fn recreate_raw_table(&self, table: &str) -> Result<()> {
        self.drop_table(table).await?;
        self.create_table(table).await
    }

    #[instrument(level = "info", skip(self, records), fields(rows = records.len()))]
    async fn append(&self, table: &str, records: &[MetricRecord]) -> Result<usize> {
        let body = multipart_body(&self.load_config(table), &ndjson(records)?);
        let url = format!("{}/projects/{}/jobs", self.upload_base, self.project);
        let resp = self
            .authed(self.client.post(&url))
            .query(&[("uploadType", "multipart")])
            .header(
                CONTENT_TYPE,
                format!("multipart/related; boundary={}", MULTIPART_BOUNDARY),
            )
            .body(body)
            .send()
            .await
            .with_context(|| format!("starting load job into {}", table))?;
        let job: Job = check(resp, "load job").await?.json().await?;

        if !Self::job_outcome(&job).with_context(|| format!("loading {}", table))? {
            let Some(reference) = &job.job_reference else {
                bail!("running load job returned no job reference");
            };
            self.wait_for_job(reference)
                .await
                .with_context(|| format!("loading {}", table))?;
        }
        info!(table, rows = records.len(), "appended");
        Ok(records.len())
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        let url = format!("{}/projects/{}/queries", self.base, self.project);
        let resp = self
            .authed(self.client.post(&url))
            .json(&json!({ "query": sql, "useLegacySql": false }))
            .send()
            .await
            .context("submitting query")?;
        let parsed: QueryResponse = check(resp, "query").await?.json().await?;
        if !parsed.errors.is_empty() {
            bail!("query failed: {}", Value::Array(parsed.errors));
        }
        if parsed.job_complete {
            return Ok(());
        }
        let Some(job) = parsed.job_reference else {
            bail!("incomplete query returned no job reference");
        };
        self.wait_for_job(&job).await
    }
}
