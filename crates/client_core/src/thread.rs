//! Client-side model of one task and its comment thread.
//!
//! Every successful mutation replaces the cached comments with the list the
//! backend returned. Mutations on the same task are serialized through
//! [`InFlightRegistry`] so an older response can never overwrite a newer one.
//! Loads are not serialized; a load whose response arrives after a mutation
//! was applied is discarded instead.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex as StdMutex, PoisonError},
};

use shared::{
    domain::{Comment, CommentId, Task, TaskId, TaskStatus},
    protocol::{CommentRequest, CommentsEnvelope, TaskEnvelope, UpdateTaskRequest},
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    confirm::{Affirmed, DeleteComment, DeleteTask},
    transport::{call, ApiRequest, ApiTransport, TransportError},
    Notifier, Route,
};

#[derive(Debug, Error)]
pub enum ThreadError {
    #[error("task {0} not found")]
    NotFound(TaskId),
    #[error("failed to load task {task_id}: {source}")]
    Load {
        task_id: TaskId,
        #[source]
        source: TransportError,
    },
    #[error("failed to update task: {0}")]
    Update(#[source] TransportError),
    #[error("failed to post comment: {0}")]
    Comment(#[source] TransportError),
    #[error("failed to delete: {0}")]
    Delete(#[source] TransportError),
    #[error("another change to task {0} is still in flight")]
    Busy(TaskId),
    #[error("confirmation was given for task {confirmed}, not {current}")]
    WrongTask { confirmed: TaskId, current: TaskId },
}

/// Outcome of a comment or reply submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Blank text; nothing was sent.
    Skipped,
    Applied,
}

/// Tasks that currently have a mutation outstanding.
#[derive(Debug, Clone, Default)]
pub struct InFlightRegistry {
    tasks: Arc<StdMutex<HashSet<TaskId>>>,
}

impl InFlightRegistry {
    pub fn try_acquire(&self, task_id: &TaskId) -> Option<InFlightGuard> {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.insert(task_id.clone()).then(|| InFlightGuard {
            registry: self.clone(),
            task_id: task_id.clone(),
        })
    }

    pub fn is_in_flight(&self, task_id: &TaskId) -> bool {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(task_id)
    }
}

#[derive(Debug)]
pub struct InFlightGuard {
    registry: InFlightRegistry,
    task_id: TaskId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.task_id);
    }
}

#[derive(Debug, Default)]
struct ThreadState {
    task: Option<Task>,
    comments: Vec<Comment>,
    /// Bumped by every applied mutation.
    generation: u64,
    /// Last load ticket handed out and last one applied.
    loads_issued: u64,
    loads_applied: u64,
}

impl ThreadState {
    fn replace_task(&mut self, task: Task) {
        self.comments = task.comments.clone();
        self.task = Some(task);
        self.generation += 1;
    }

    fn replace_comments(&mut self, comments: Vec<Comment>) {
        if let Some(task) = self.task.as_mut() {
            task.comments = comments.clone();
        }
        self.comments = comments;
        self.generation += 1;
    }

    fn clear(&mut self) {
        self.task = None;
        self.comments.clear();
        self.generation += 1;
    }

    fn begin_load(&mut self) -> LoadTicket {
        self.loads_issued += 1;
        LoadTicket {
            generation: self.generation,
            seq: self.loads_issued,
        }
    }

    /// Applies a loaded task unless a mutation or a later load landed first.
    fn finish_load(&mut self, ticket: LoadTicket, task: Task) -> bool {
        if ticket.generation != self.generation || ticket.seq < self.loads_applied {
            return false;
        }
        self.comments = task.comments.clone();
        self.task = Some(task);
        self.loads_applied = ticket.seq;
        true
    }
}

#[derive(Debug, Clone, Copy)]
struct LoadTicket {
    generation: u64,
    seq: u64,
}

pub struct TaskThread {
    transport: Arc<dyn ApiTransport>,
    registry: InFlightRegistry,
    notifier: Notifier,
    task_id: TaskId,
    state: Mutex<ThreadState>,
}

impl TaskThread {
    pub fn new(
        transport: Arc<dyn ApiTransport>,
        registry: InFlightRegistry,
        notifier: Notifier,
        task_id: TaskId,
    ) -> Self {
        Self {
            transport,
            registry,
            notifier,
            task_id,
            state: Mutex::new(ThreadState::default()),
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub async fn task(&self) -> Option<Task> {
        self.state.lock().await.task.clone()
    }

    pub async fn status(&self) -> Option<TaskStatus> {
        self.state.lock().await.task.as_ref().map(|task| task.status)
    }

    pub async fn assigned_user(&self) -> Option<String> {
        self.state
            .lock()
            .await
            .task
            .as_ref()
            .map(|task| task.assigned_user.clone())
    }

    pub async fn comments(&self) -> Vec<Comment> {
        self.state.lock().await.comments.clone()
    }

    pub fn is_mutation_in_flight(&self) -> bool {
        self.registry.is_in_flight(&self.task_id)
    }

    /// Fetches the task. If a mutation was applied while the request was out,
    /// the response is dropped and the newer cached task is returned.
    pub async fn load_task(&self) -> Result<Task, ThreadError> {
        let ticket = self.state.lock().await.begin_load();
        let path = format!("/api/tasks/{}", self.task_id);
        match call::<TaskEnvelope>(self.transport.as_ref(), ApiRequest::get(path)).await {
            Ok(TaskEnvelope { task }) => {
                let mut state = self.state.lock().await;
                if state.finish_load(ticket, task.clone()) {
                    debug!(task_id = %self.task_id, comments = task.comments.len(), "task loaded");
                    return Ok(task);
                }
                debug!(task_id = %self.task_id, "discarding stale task load");
                state
                    .task
                    .clone()
                    .ok_or_else(|| ThreadError::NotFound(self.task_id.clone()))
            }
            Err(source) if source.is_not_found() => {
                self.notifier.error("Task not found.");
                Err(ThreadError::NotFound(self.task_id.clone()))
            }
            Err(source) => {
                warn!(task_id = %self.task_id, error = %source, "failed to load task");
                self.notifier.error("Error fetching task.");
                Err(ThreadError::Load {
                    task_id: self.task_id.clone(),
                    source,
                })
            }
        }
    }

    pub async fn update_status(
        &self,
        status: TaskStatus,
        assigned_user: &str,
    ) -> Result<Task, ThreadError> {
        let _guard = self.acquire()?;
        let request = ApiRequest::put(format!("/api/tasks/{}", self.task_id))
            .json(&UpdateTaskRequest {
                status,
                assigned_user: assigned_user.to_string(),
            })
            .map_err(ThreadError::Update)?;

        match call::<TaskEnvelope>(self.transport.as_ref(), request).await {
            Ok(TaskEnvelope { task }) => {
                info!(task_id = %self.task_id, %status, "task updated");
                self.state.lock().await.replace_task(task.clone());
                self.notifier.success("Task updated successfully!");
                Ok(task)
            }
            Err(source) => {
                warn!(task_id = %self.task_id, error = %source, "failed to update task");
                self.notifier.error("Error updating task.");
                Err(ThreadError::Update(source))
            }
        }
    }

    /// Posts `draft` as a new top-level comment. The draft is cleared only on success.
    pub async fn add_comment(&self, draft: &mut String) -> Result<Submission, ThreadError> {
        let path = format!("/api/tasks/comments/{}", self.task_id);
        self.submit_comment(path, draft).await
    }

    /// Posts `draft` as a reply under `comment_id`.
    pub async fn add_reply(
        &self,
        comment_id: &CommentId,
        draft: &mut String,
    ) -> Result<Submission, ThreadError> {
        let path = format!("/api/tasks/admincomments/{}/{comment_id}", self.task_id);
        self.submit_comment(path, draft).await
    }

    pub async fn delete_comment(
        &self,
        confirmation: Affirmed<DeleteComment>,
    ) -> Result<(), ThreadError> {
        let action = confirmation.into_action();
        self.ensure_same_task(&action.task_id)?;
        let _guard = self.acquire()?;
        let path = format!(
            "/api/tasks/{}/comments/{}",
            self.task_id, action.comment_id
        );

        match call::<CommentsEnvelope>(self.transport.as_ref(), ApiRequest::delete(path)).await {
            Ok(CommentsEnvelope { comments }) => {
                info!(task_id = %self.task_id, comment_id = %action.comment_id, "comment deleted");
                self.state.lock().await.replace_comments(comments);
                Ok(())
            }
            Err(source) => {
                warn!(task_id = %self.task_id, error = %source, "failed to delete comment");
                self.notifier.error("Error deleting comment.");
                Err(ThreadError::Delete(source))
            }
        }
    }

    /// Deletes the task; on success the caller should leave the task view.
    pub async fn delete_task(&self, confirmation: Affirmed<DeleteTask>) -> Result<Route, ThreadError> {
        let action = confirmation.into_action();
        self.ensure_same_task(&action.task_id)?;
        let _guard = self.acquire()?;
        let request = ApiRequest::delete(format!("/api/tasks/{}", self.task_id));

        match self.transport.execute(request).await {
            Ok(_) => {
                info!(task_id = %self.task_id, "task deleted");
                self.state.lock().await.clear();
                self.notifier.success("Task deleted.");
                Ok(Route::TaskList)
            }
            Err(source) => {
                warn!(task_id = %self.task_id, error = %source, "failed to delete task");
                self.notifier.error("Error deleting task.");
                Err(ThreadError::Delete(source))
            }
        }
    }

    async fn submit_comment(
        &self,
        path: String,
        draft: &mut String,
    ) -> Result<Submission, ThreadError> {
        if draft.trim().is_empty() {
            return Ok(Submission::Skipped);
        }
        let _guard = self.acquire()?;
        let request = ApiRequest::post(path)
            .json(&CommentRequest {
                text: draft.clone(),
            })
            .map_err(ThreadError::Comment)?;

        match call::<CommentsEnvelope>(self.transport.as_ref(), request).await {
            Ok(CommentsEnvelope { comments }) => {
                debug!(task_id = %self.task_id, comments = comments.len(), "comment thread replaced");
                self.state.lock().await.replace_comments(comments);
                draft.clear();
                Ok(Submission::Applied)
            }
            Err(source) => {
                warn!(task_id = %self.task_id, error = %source, "failed to post comment");
                self.notifier.error("Error adding comment.");
                Err(ThreadError::Comment(source))
            }
        }
    }

    fn acquire(&self) -> Result<InFlightGuard, ThreadError> {
        self.registry
            .try_acquire(&self.task_id)
            .ok_or_else(|| ThreadError::Busy(self.task_id.clone()))
    }

    fn ensure_same_task(&self, confirmed: &TaskId) -> Result<(), ThreadError> {
        if confirmed == &self.task_id {
            Ok(())
        } else {
            Err(ThreadError::WrongTask {
                confirmed: confirmed.clone(),
                current: self.task_id.clone(),
            })
        }
    }
}

#[cfg(test)]
#[path = "tests/thread_tests.rs"]
mod tests;
