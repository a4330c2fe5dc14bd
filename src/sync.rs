use crate::auth::Credential;
use crate::config::ApiConfig;
use crate::models::Todo;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, warn};
use reqwest::blocking::Client;
use serde::Serialize;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

#[derive(Debug)]
pub enum ApiError {
    EmptyTitle,
    Request(String),
    Status { context: &'static str, status: u16 },
    Decode(String),
}

impl ApiError {
    pub fn message(&self) -> String {
        match self {
            ApiError::EmptyTitle => "Title must not be empty.".to_string(),
            ApiError::Request(msg) => format!("Request failed: {msg}"),
            ApiError::Status { context, status } => format!("{context} failed: HTTP {status}"),
            ApiError::Decode(msg) => format!("Unexpected response: {msg}"),
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ApiError::Status { status: 401 | 403, .. })
    }
}

/// The wire format for instants: UTC RFC 3339 with milliseconds, matching
/// what the service stores and echoes back verbatim.
pub fn wire_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Distinguishes "no data yet" from "data is server truth" from "the last
/// refresh failed and the previous snapshot is on display".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    NotLoaded,
    Loaded,
    Stale,
}

#[derive(Serialize)]
struct CreateTodoRequest {
    title: String,
    // Serialized even when absent: the service expects an explicit null.
    #[serde(rename = "dueDate")]
    due_date: Option<String>,
}

/// Partial update body for `/update-todo/{id}`. Absent fields are left
/// untouched by the server; an explicit `dueDate: null` removes the due date.
#[derive(Serialize, Clone, Default)]
pub struct TodoPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(rename = "dueDate", skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<String>>,
}

/// Owns the local todo snapshot and every call against the todo service.
///
/// The snapshot is only ever replaced wholesale by `refresh`; mutations never
/// edit it in place. `&mut self` on every operation serializes mutate+refresh
/// sequences per instance, so two operations on one controller cannot
/// interleave their refresh reads.
pub struct SyncController {
    client: Client,
    base_url: String,
    todos: Vec<Todo>,
    phase: LoadPhase,
}

impl SyncController {
    pub fn new(api: &ApiConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(api.timeout_seconds.max(5)))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            todos: Vec::new(),
            phase: LoadPhase::NotLoaded,
        }
    }

    pub fn todos(&self) -> &[Todo] {
        &self.todos
    }

    pub fn phase(&self) -> LoadPhase {
        self.phase
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Full re-read of the collection. On success the snapshot is replaced
    /// entirely; on failure it is left exactly as it was.
    pub fn refresh(&mut self, credential: &Credential) -> Result<(), ApiError> {
        match self.fetch_all(credential) {
            Ok(todos) => {
                debug!("snapshot replaced: {} todos", todos.len());
                self.todos = todos;
                self.phase = LoadPhase::Loaded;
                Ok(())
            }
            Err(err) => {
                if self.phase == LoadPhase::Loaded {
                    self.phase = LoadPhase::Stale;
                }
                warn!("refresh failed: {}", err.message());
                Err(err)
            }
        }
    }

    fn fetch_all(&self, credential: &Credential) -> Result<Vec<Todo>, ApiError> {
        let resp = self
            .client
            .get(self.url("get-all-todo"))
            .bearer_auth(credential.bearer())
            .send()
            .map_err(|e| ApiError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ApiError::Status {
                context: "List",
                status: resp.status().as_u16(),
            });
        }
        resp.json().map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Creates a todo and re-derives the snapshot from the server. The
    /// created item is never inserted locally: its id and any other
    /// server-assigned fields come back through the refresh.
    pub fn create(
        &mut self,
        credential: &Credential,
        title: &str,
        due: Option<DateTime<Utc>>,
    ) -> Result<(), ApiError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ApiError::EmptyTitle);
        }

        let body = CreateTodoRequest {
            title: title.to_string(),
            due_date: due.map(|d| wire_instant(&d)),
        };
        let resp = self
            .client
            .post(self.url("create-todo"))
            .bearer_auth(credential.bearer())
            .json(&body)
            .send()
            .map_err(|e| ApiError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ApiError::Status {
                context: "Create",
                status: resp.status().as_u16(),
            });
        }
        self.refresh(credential)
    }

    /// Sends the negation of the server-reported completion state.
    pub fn toggle(&mut self, credential: &Credential, todo: &Todo) -> Result<(), ApiError> {
        let patch = TodoPatch {
            completed: Some(!todo.completed),
            ..TodoPatch::default()
        };
        self.update(credential, &todo.todo_id, patch)
    }

    pub fn update(
        &mut self,
        credential: &Credential,
        todo_id: &str,
        patch: TodoPatch,
    ) -> Result<(), ApiError> {
        if let Some(title) = &patch.title
            && title.trim().is_empty()
        {
            return Err(ApiError::EmptyTitle);
        }

        let resp = self
            .client
            .patch(self.url(&format!("update-todo/{todo_id}")))
            .bearer_auth(credential.bearer())
            .json(&patch)
            .send()
            .map_err(|e| ApiError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ApiError::Status {
                context: "Update",
                status: resp.status().as_u16(),
            });
        }
        self.refresh(credential)
    }

    pub fn delete(&mut self, credential: &Credential, todo_id: &str) -> Result<(), ApiError> {
        let resp = self
            .client
            .delete(self.url(&format!("delete-todo/{todo_id}")))
            .bearer_auth(credential.bearer())
            .send()
            .map_err(|e| ApiError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ApiError::Status {
                context: "Delete",
                status: resp.status().as_u16(),
            });
        }
        self.refresh(credential)
    }
}

pub enum TaskOp {
    Refresh,
    Create {
        title: String,
        due: Option<DateTime<Utc>>,
    },
    Toggle {
        todo: Todo,
    },
    Update {
        todo_id: String,
        patch: TodoPatch,
    },
    Delete {
        todo_id: String,
    },
}

impl TaskOp {
    pub fn describe(&self) -> &'static str {
        match self {
            TaskOp::Refresh => "Refresh",
            TaskOp::Create { .. } => "Add",
            TaskOp::Toggle { .. } => "Toggle",
            TaskOp::Update { .. } => "Update",
            TaskOp::Delete { .. } => "Delete",
        }
    }
}

pub struct OpOutcome {
    pub controller: SyncController,
    pub op: TaskOp,
    pub result: Result<(), ApiError>,
}

/// Runs one operation on a worker thread and hands the controller back with
/// the outcome. Moving the controller out for the duration is what makes a
/// second concurrent operation unrepresentable in the app layer; the worker
/// keeps its own clone of the credential, so a logout during flight does not
/// cancel the request (it fails server-side instead).
pub fn spawn_task_op(
    mut controller: SyncController,
    credential: Credential,
    op: TaskOp,
) -> Receiver<OpOutcome> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let result = run_task_op(&mut controller, &credential, &op);
        let _ = tx.send(OpOutcome {
            controller,
            op,
            result,
        });
    });
    rx
}

fn run_task_op(
    controller: &mut SyncController,
    credential: &Credential,
    op: &TaskOp,
) -> Result<(), ApiError> {
    match op {
        TaskOp::Refresh => controller.refresh(credential),
        TaskOp::Create { title, due } => controller.create(credential, title, *due),
        TaskOp::Toggle { todo } => controller.toggle(credential, todo),
        TaskOp::Update { todo_id, patch } => controller.update(credential, todo_id, patch.clone()),
        TaskOp::Delete { todo_id } => controller.delete(credential, todo_id),
    }
}
