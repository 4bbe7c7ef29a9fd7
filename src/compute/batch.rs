//! Batch REST API client.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, Method, Response, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::auth::{BATCH_HEADER_PREFIX, SharedKeyCredential};
use crate::compute::{ComputeGateway, JobSpec, OutputStream, PoolSpec, TaskInfo, TaskSpec};
use crate::config::BatchCredentials;
use crate::error::{QuickstartError, QuickstartResult, Service, truncate_body};
use crate::outcome::{CreateOutcome, DeleteOutcome};

/// Batch service REST version.
pub const BATCH_API_VERSION: &str = "2023-05-01.17.0";

/// Most tasks the service accepts in one add-collection request.
pub const MAX_TASKS_PER_REQUEST: usize = 100;

const JSON_CONTENT_TYPE: &str = "application/json; odata=minimalmetadata";

const POOL_EXISTS: &str = "PoolExists";
const JOB_EXISTS: &str = "JobExists";
const POOL_NOT_FOUND: &str = "PoolNotFound";
const JOB_NOT_FOUND: &str = "JobNotFound";

/// Error body returned by the batch service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<BatchErrorMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchErrorMessage {
    #[serde(default)]
    pub value: String,
}

impl BatchErrorBody {
    fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    fn message(&self) -> String {
        self.message
            .as_ref()
            .map(|m| m.value.clone())
            .unwrap_or_default()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JobAddBody<'a> {
    id: &'a str,
    pool_info: PoolInfoBody<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PoolInfoBody<'a> {
    pool_id: &'a str,
}

#[derive(Serialize)]
struct TaskAddCollection<'a> {
    value: &'a [TaskSpec],
}

#[derive(Debug, Deserialize)]
struct TaskAddCollectionResult {
    #[serde(default)]
    value: Vec<TaskAddResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
enum TaskAddStatus {
    Success,
    ClientError,
    ServerError,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskAddResult {
    status: TaskAddStatus,
    task_id: String,
    #[serde(default)]
    error: Option<BatchErrorBody>,
}

#[derive(Debug, Deserialize)]
struct TaskListPage {
    #[serde(default)]
    value: Vec<TaskInfo>,
    #[serde(rename = "odata.nextLink", default)]
    next_link: Option<String>,
}

/// [`ComputeGateway`] over the Batch REST API.
#[derive(Debug, Clone)]
pub struct BatchServiceClient {
    http: Client,
    endpoint: Url,
    credential: SharedKeyCredential,
}

impl BatchServiceClient {
    pub fn new(account_url: &str, credential: SharedKeyCredential) -> QuickstartResult<Self> {
        let endpoint = Url::parse(account_url)
            .map_err(|e| QuickstartError::decode(format!("invalid batch account url: {e}")))?;
        Ok(Self {
            http: Client::new(),
            endpoint,
            credential,
        })
    }

    pub fn from_credentials(credentials: &BatchCredentials) -> QuickstartResult<Self> {
        let credential = SharedKeyCredential::new(
            credentials.account_name.clone(),
            credentials.account_key.clone(),
        );
        Self::new(&credentials.account_url, credential)
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.query_pairs_mut()
            .append_pair("api-version", BATCH_API_VERSION);
        url
    }

    async fn send(&self, method: Method, url: Url, body: Option<Vec<u8>>) -> QuickstartResult<Response> {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let mut builder = self.http.request(method, url).header("ocp-date", date);
        builder = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
                .header(CONTENT_LENGTH, body.len())
                .body(body),
            None => builder,
        };
        let mut request = builder.build()?;
        self.credential
            .sign_request(&mut request, BATCH_HEADER_PREFIX)?;

        debug!(method = %request.method(), path = %request.url().path(), "Sending batch request");
        Ok(self.http.execute(request).await?)
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: &T,
    ) -> QuickstartResult<Response> {
        let body = serde_json::to_vec(body).map_err(|e| QuickstartError::decode(e.to_string()))?;
        self.send(method, url, Some(body)).await
    }

    async fn create(
        &self,
        segments: &[&str],
        body: &(impl Serialize + Sync),
        conflict_code: &str,
    ) -> QuickstartResult<CreateOutcome> {
        let response = self.send_json(Method::POST, self.url(segments), body).await?;
        let status = response.status().as_u16();
        if response.status().is_success() {
            return Ok(CreateOutcome::Created);
        }
        let error = read_error(response).await;
        CreateOutcome::classify(status, error.code(), conflict_code)
            .ok_or_else(|| service_error(status, &error))
    }

    async fn delete(&self, segments: &[&str], not_found_code: &str) -> QuickstartResult<DeleteOutcome> {
        let response = self.send(Method::DELETE, self.url(segments), None).await?;
        let status = response.status().as_u16();
        if response.status().is_success() {
            return Ok(DeleteOutcome::Deleted);
        }
        let error = read_error(response).await;
        DeleteOutcome::classify(status, error.code(), not_found_code)
            .ok_or_else(|| service_error(status, &error))
    }

    async fn ensure_success(response: Response) -> QuickstartResult<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let error = read_error(response).await;
        Err(service_error(status, &error))
    }
}

async fn read_error(response: Response) -> BatchErrorBody {
    let text = response.text().await.unwrap_or_default();
    serde_json::from_str(&text).unwrap_or_else(|_| {
        BatchErrorBody {
            code: None,
            message: Some(BatchErrorMessage {
                value: truncate_body(text),
            }),
        }
    })
}

fn service_error(status: u16, error: &BatchErrorBody) -> QuickstartError {
    QuickstartError::Service {
        service: Service::Batch,
        status,
        code: error.code().unwrap_or("Unknown").to_string(),
        message: error.message(),
    }
}

/// First rejected task in an add-collection result, as an error.
fn first_rejection(results: Vec<TaskAddResult>) -> Option<QuickstartError> {
    results
        .into_iter()
        .find(|r| r.status != TaskAddStatus::Success)
        .map(|r| {
            let error = r.error.unwrap_or_default();
            QuickstartError::TaskSubmission {
                task_id: r.task_id,
                code: error.code().unwrap_or("Unknown").to_string(),
                message: error.message(),
            }
        })
}

#[async_trait]
impl ComputeGateway for BatchServiceClient {
    async fn ensure_pool(&self, pool: &PoolSpec) -> QuickstartResult<CreateOutcome> {
        let outcome = self.create(&["pools"], pool, POOL_EXISTS).await?;
        debug!(pool_id = %pool.id, ?outcome, "Pool create returned");
        Ok(outcome)
    }

    async fn ensure_job(&self, job: &JobSpec) -> QuickstartResult<CreateOutcome> {
        let body = JobAddBody {
            id: &job.id,
            pool_info: PoolInfoBody {
                pool_id: &job.pool_id,
            },
        };
        let outcome = self.create(&["jobs"], &body, JOB_EXISTS).await?;
        debug!(job_id = %job.id, ?outcome, "Job create returned");
        Ok(outcome)
    }

    async fn submit_tasks(&self, job_id: &str, tasks: &[TaskSpec]) -> QuickstartResult<()> {
        for chunk in tasks.chunks(MAX_TASKS_PER_REQUEST) {
            let url = self.url(&["jobs", job_id, "addtaskcollection"]);
            let response = self
                .send_json(Method::POST, url, &TaskAddCollection { value: chunk })
                .await?;
            let response = Self::ensure_success(response).await?;
            let result: TaskAddCollectionResult = response
                .json()
                .await
                .map_err(|e| QuickstartError::decode(e.to_string()))?;
            if let Some(err) = first_rejection(result.value) {
                return Err(err);
            }
            info!(job_id = %job_id, count = chunk.len(), "Added tasks");
        }
        Ok(())
    }

    async fn list_tasks(&self, job_id: &str) -> QuickstartResult<Vec<TaskInfo>> {
        let mut tasks = Vec::new();
        let mut next = Some(self.url(&["jobs", job_id, "tasks"]));
        while let Some(url) = next.take() {
            let response = Self::ensure_success(self.send(Method::GET, url, None).await?).await?;
            let page: TaskListPage = response
                .json()
                .await
                .map_err(|e| QuickstartError::decode(e.to_string()))?;
            tasks.extend(page.value);
            if let Some(link) = page.next_link {
                next = Some(
                    Url::parse(&link)
                        .map_err(|e| QuickstartError::decode(format!("bad next link: {e}")))?,
                );
            }
        }
        Ok(tasks)
    }

    async fn task_output(
        &self,
        job_id: &str,
        task_id: &str,
        stream: OutputStream,
    ) -> QuickstartResult<String> {
        let url = self.url(&["jobs", job_id, "tasks", task_id, "files", stream.file_name()]);
        let response = Self::ensure_success(self.send(Method::GET, url, None).await?).await?;
        Ok(response.text().await?)
    }

    async fn delete_job(&self, job_id: &str) -> QuickstartResult<DeleteOutcome> {
        self.delete(&["jobs", job_id], JOB_NOT_FOUND).await
    }

    async fn delete_pool(&self, pool_id: &str) -> QuickstartResult<DeleteOutcome> {
        self.delete(&["pools", pool_id], POOL_NOT_FOUND).await
    }
}
