//! "My tasks" listing with client-side filtering and fixed-size pages.

use chrono::NaiveDate;
use shared::{
    domain::{Task, TaskStatus},
    protocol::TasksEnvelope,
};
use tracing::debug;

use crate::{
    error::PortalError,
    transport::{call, ApiRequest},
    PortalClient,
};

pub const TASKS_PER_PAGE: usize = 7;

const MY_TASKS_PATH: &str = "/api/tasks/my-tasks-by-email";

/// Inclusive range of deadline dates (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DeadlineRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

/// Every criterion left empty matches every task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub assigned: Option<String>,
    pub company: Option<String>,
    pub deadline: Option<DeadlineRange>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        let status_ok = self.status.map_or(true, |status| task.status == status);
        let assigned_ok = contains_ignore_case(Some(&task.assigned_user), self.assigned.as_deref());
        let company_ok = contains_ignore_case(task.company.as_deref(), self.company.as_deref());
        let deadline_ok = match self.deadline {
            None => true,
            Some(range) => task
                .deadline
                .is_some_and(|deadline| range.contains(deadline.date_naive())),
        };
        status_ok && assigned_ok && company_ok && deadline_ok
    }

    pub fn apply<'a>(&self, tasks: &'a [Task]) -> Vec<&'a Task> {
        tasks.iter().filter(|task| self.matches(task)).collect()
    }
}

fn contains_ignore_case(haystack: Option<&str>, needle: Option<&str>) -> bool {
    let Some(needle) = needle.map(str::trim).filter(|needle| !needle.is_empty()) else {
        return true;
    };
    haystack.is_some_and(|haystack| {
        haystack
            .to_lowercase()
            .contains(&needle.to_lowercase())
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page<'a, T> {
    pub items: &'a [T],
    /// 1-based.
    pub number: usize,
    pub total_pages: usize,
}

/// Slices out page `page`, clamped to the pages that exist. An empty list has one empty page.
pub fn paginate<T>(items: &[T], page: usize) -> Page<'_, T> {
    let total_pages = items.len().div_ceil(TASKS_PER_PAGE).max(1);
    let number = page.clamp(1, total_pages);
    let start = (number - 1) * TASKS_PER_PAGE;
    let end = (start + TASKS_PER_PAGE).min(items.len());
    Page {
        items: &items[start.min(end)..end],
        number,
        total_pages,
    }
}

impl PortalClient {
    pub async fn fetch_my_tasks(&self, email: &str) -> Result<Vec<Task>, PortalError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(PortalError::Validation("an email is required".to_string()));
        }
        let request = ApiRequest::get(MY_TASKS_PATH).query("email", email);
        let TasksEnvelope { tasks } = call(self.transport.as_ref(), request).await?;
        debug!(%email, count = tasks.len(), "tasks fetched");
        Ok(tasks)
    }

    /// Tasks for whoever is signed in.
    pub async fn my_tasks(&self) -> Result<Vec<Task>, PortalError> {
        let email = self
            .credentials
            .email()
            .await
            .ok_or(PortalError::NotSignedIn)?;
        self.fetch_my_tasks(&email).await
    }
}

#[cfg(test)]
#[path = "tests/task_list_tests.rs"]
mod tests;
