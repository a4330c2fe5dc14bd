use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum InputMode {
    Navigate,
    Form,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FormField {
    Title,
    Due,
}

/// What the add/edit form will do on submit.
#[derive(Debug, Clone, PartialEq)]
pub enum FormTarget {
    Create,
    Edit { todo_id: String },
}

/// A todo exactly as the server last reported it. The client never
/// fabricates one of these; `todo_id` is assigned by the server and the
/// whole collection is replaced wholesale on every refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub todo_id: String,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Todo {
    pub fn due_local(&self) -> Option<DateTime<Local>> {
        let raw = self.due_date.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Local))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_server_listing_fields() {
        let body = r#"{
            "todoId": "42",
            "title": "Buy milk",
            "completed": false,
            "createdAt": "2026-03-01T08:00:00",
            "dueDate": "2026-03-02T17:00:00.000Z"
        }"#;
        let todo: Todo = serde_json::from_str(body).expect("todo");
        assert_eq!(todo.todo_id, "42");
        assert_eq!(todo.title, "Buy milk");
        assert!(!todo.completed);
        assert!(todo.due_date.is_some());
        assert!(todo.created_at.is_some());
    }

    #[test]
    fn due_date_is_optional() {
        let body = r#"{"todoId": "7", "title": "No deadline", "completed": true}"#;
        let todo: Todo = serde_json::from_str(body).expect("todo");
        assert!(todo.due_date.is_none());
        assert!(todo.due_local().is_none());
    }

    #[test]
    fn unparseable_due_date_displays_as_none() {
        let todo = Todo {
            todo_id: "1".to_string(),
            title: "x".to_string(),
            completed: false,
            due_date: Some("not-a-date".to_string()),
            created_at: None,
        };
        assert!(todo.due_local().is_none());
    }
}
