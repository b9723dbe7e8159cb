#![allow(dead_code)]

use chrono::Utc;
use clickup_sync::model::{Comment, NewTask, RemoteTask, TaskUpdate};
use clickup_sync::remote::RemoteService;
use clickup_sync::{Result, SyncError};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Every call the engine made, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListTasks(String),
    GetTask(String),
    CreateTask { list_id: String, name: String },
    UpdateTask { id: String, update: TaskUpdate },
    ListComments(String),
    AddComment { id: String, text: String },
}

/// In-memory remote list with call recording and failure injection.
#[derive(Debug, Default)]
pub struct FakeRemote {
    pub tasks: BTreeMap<String, RemoteTask>,
    pub comments: HashMap<String, Vec<Comment>>,
    /// When set, status writes to any other lane are rejected like ClickUp does.
    pub known_lanes: Option<HashSet<String>>,
    pub fail_list: bool,
    pub fail_create: bool,
    calls: RefCell<Vec<Call>>,
    next_id: u32,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: impl IntoIterator<Item = RemoteTask>) -> Self {
        let mut remote = Self::new();
        for task in tasks {
            remote.insert(task);
        }
        remote
    }

    pub fn insert(&mut self, task: RemoteTask) {
        self.tasks.insert(task.id.clone(), task);
    }

    pub fn restrict_lanes(&mut self, lanes: &[&str]) {
        self.known_lanes = Some(lanes.iter().map(|l| (*l).to_string()).collect());
    }

    pub fn task(&self, id: &str) -> &RemoteTask {
        self.tasks.get(id).expect("task exists")
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn create_count(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| matches!(c, Call::CreateTask { .. }))
            .count()
    }

    /// Calls that change anything remotely.
    pub fn writes(&self) -> Vec<Call> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    Call::CreateTask { .. } | Call::UpdateTask { .. } | Call::AddComment { .. }
                )
            })
            .cloned()
            .collect()
    }

    pub fn comment_texts(&self, id: &str) -> Vec<String> {
        self.comments
            .get(id)
            .map(|list| list.iter().map(|c| c.text.clone()).collect())
            .unwrap_or_default()
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    fn lane_known(&self, lane: &str) -> bool {
        self.known_lanes
            .as_ref()
            .is_none_or(|lanes| lanes.contains(&lane.to_lowercase()))
    }
}

impl RemoteService for FakeRemote {
    fn list_all_tasks(&self, list_id: &str) -> Result<Vec<RemoteTask>> {
        self.record(Call::ListTasks(list_id.to_string()));
        if self.fail_list {
            return Err(SyncError::Transport("connection reset".into()));
        }
        Ok(self.tasks.values().cloned().collect())
    }

    fn get_task(&self, id: &str) -> Result<RemoteTask> {
        self.record(Call::GetTask(id.to_string()));
        self.tasks
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::TaskNotFound { id: id.to_string() })
    }

    fn create_task(&mut self, list_id: &str, task: &NewTask) -> Result<String> {
        self.record(Call::CreateTask {
            list_id: list_id.to_string(),
            name: task.name.clone(),
        });
        if self.fail_create {
            return Err(SyncError::Remote {
                status: 500,
                message: "internal error".into(),
            });
        }

        self.next_id += 1;
        let id = format!("new{}", self.next_id);
        self.insert(RemoteTask {
            id: id.clone(),
            name: task.name.clone(),
            description: task.description.clone(),
            status: "to do".to_string(),
            priority: task.priority,
            date_updated: Utc::now(),
            tags: task.tags.clone(),
        });
        Ok(id)
    }

    fn update_task(&mut self, id: &str, update: &TaskUpdate) -> Result<()> {
        self.record(Call::UpdateTask {
            id: id.to_string(),
            update: update.clone(),
        });
        if let Some(lane) = &update.status {
            if !self.lane_known(lane) {
                return Err(SyncError::Remote {
                    status: 400,
                    message: "Status does not exist".into(),
                });
            }
        }

        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| SyncError::TaskNotFound { id: id.to_string() })?;
        if let Some(name) = &update.name {
            task.name.clone_from(name);
        }
        if let Some(description) = &update.description {
            task.description = Some(description.clone());
        }
        if let Some(lane) = &update.status {
            task.status.clone_from(lane);
        }
        if let Some(priority) = update.priority {
            task.priority = priority;
        }
        task.date_updated = Utc::now();
        Ok(())
    }

    fn list_comments(&self, id: &str) -> Result<Vec<Comment>> {
        self.record(Call::ListComments(id.to_string()));
        Ok(self.comments.get(id).cloned().unwrap_or_default())
    }

    fn add_comment(&mut self, id: &str, text: &str) -> Result<String> {
        self.record(Call::AddComment {
            id: id.to_string(),
            text: text.to_string(),
        });
        let list = self.comments.entry(id.to_string()).or_default();
        let comment_id = format!("c{}", list.len() + 1);
        list.push(Comment {
            id: comment_id.clone(),
            author: None,
            text: text.to_string(),
            created_at: Some(Utc::now()),
        });
        Ok(comment_id)
    }
}
