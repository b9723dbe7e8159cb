//! Remote task service access.
//!
//! The engine sees the remote side only through [`RemoteService`]; the
//! production backend is the ClickUp REST client in [`clickup`].

pub mod clickup;

pub use clickup::ClickUpClient;

use crate::error::Result;
use crate::model::{Comment, NewTask, RemoteTask, TaskUpdate};

/// Capabilities the engine needs from the remote task service.
pub trait RemoteService {
    /// Every task in the list, paginated internally.
    fn list_all_tasks(&self, list_id: &str) -> Result<Vec<RemoteTask>>;

    fn get_task(&self, id: &str) -> Result<RemoteTask>;

    /// Create a task and return its id.
    fn create_task(&mut self, list_id: &str, task: &NewTask) -> Result<String>;

    /// Apply the fields set in `update`. A status the workspace does not know
    /// is rejected by the service.
    fn update_task(&mut self, id: &str, update: &TaskUpdate) -> Result<()>;

    fn list_comments(&self, id: &str) -> Result<Vec<Comment>>;

    /// Post a comment and return its id.
    fn add_comment(&mut self, id: &str, text: &str) -> Result<String>;
}

impl<T: RemoteService + ?Sized> RemoteService for Box<T> {
    fn list_all_tasks(&self, list_id: &str) -> Result<Vec<RemoteTask>> {
        (**self).list_all_tasks(list_id)
    }

    fn get_task(&self, id: &str) -> Result<RemoteTask> {
        (**self).get_task(id)
    }

    fn create_task(&mut self, list_id: &str, task: &NewTask) -> Result<String> {
        (**self).create_task(list_id, task)
    }

    fn update_task(&mut self, id: &str, update: &TaskUpdate) -> Result<()> {
        (**self).update_task(id, update)
    }

    fn list_comments(&self, id: &str) -> Result<Vec<Comment>> {
        (**self).list_comments(id)
    }

    fn add_comment(&mut self, id: &str, text: &str) -> Result<String> {
        (**self).add_comment(id, text)
    }
}
