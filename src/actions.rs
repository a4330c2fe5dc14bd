use crate::{
    app::App,
    date_input,
    models::FormTarget,
    sync::{TaskOp, TodoPatch, wire_instant},
};
use chrono::Local;

pub fn refresh(app: &mut App) {
    if !app.signed_in() {
        app.toast("Not signed in.");
        return;
    }
    app.dispatch(TaskOp::Refresh);
}

pub fn toggle_selected(app: &mut App) {
    let Some(todo) = app.selected_todo() else {
        app.toast("No todo selected.");
        return;
    };
    let todo = todo.clone();
    app.dispatch(TaskOp::Toggle { todo });
}

pub fn delete_selected(app: &mut App) {
    let Some(todo) = app.selected_todo() else {
        app.toast("No todo selected.");
        return;
    };
    let todo_id = todo.todo_id.clone();
    app.dispatch(TaskOp::Delete { todo_id });
}

/// Validates the form and dispatches a create or partial update. Local
/// validation failures (empty title, unreadable due date) never reach the
/// network; the inputs stay put either way and are only cleared once the
/// operation succeeds.
pub fn submit_form(app: &mut App) {
    let title = app.title_input.trim().to_string();
    if title.is_empty() {
        app.toast("Title must not be empty.");
        return;
    }

    let due_raw = app.due_input.trim().to_string();
    let due = if due_raw.is_empty() {
        None
    } else {
        let today = Local::now().date_naive();
        let Some(parsed) = date_input::parse_due_input(&due_raw, today) else {
            app.toast("Due date not understood (try 2026-04-01 09:30, tomorrow, +3d, fri).");
            return;
        };
        let Some(instant) = date_input::to_utc(parsed) else {
            app.toast("That local time does not exist (DST gap); pick another.");
            return;
        };
        Some(instant)
    };

    let op = match &app.form_target {
        FormTarget::Create => TaskOp::Create { title, due },
        FormTarget::Edit { todo_id } => TaskOp::Update {
            todo_id: todo_id.clone(),
            patch: TodoPatch {
                title: Some(title),
                // Always sent: an emptied due field clears the date server-side.
                due_date: Some(due.map(|d| wire_instant(&d))),
                ..TodoPatch::default()
            },
        },
    };

    if app.dispatch(op) {
        app.close_form();
    }
}

/// Clears the credential, opens the hosted logout page, and re-enters the
/// login flow — the same place the original redirect chain lands. Requests
/// already in flight keep their credential clone and fail on their own.
pub fn logout(app: &mut App) {
    if !app.signed_in() {
        // The logout key doubles as "sign in" when nothing is active.
        app.begin_login();
        return;
    }

    match app.store.logout() {
        Ok(url) => {
            app.claims = None;
            app.todos.clear();
            app.phase = crate::sync::LoadPhase::NotLoaded;
            app.list_state.select(None);
            app.clear_form();
            if app.controller.is_some() {
                // Drop the old snapshot held inside the idle controller.
                app.controller = Some(crate::sync::SyncController::new(&app.config.api));
            }
            if open::that(&url).is_err() {
                app.toast("Could not open a browser for logout.");
            }
            app.begin_login();
        }
        Err(err) => app.toast(err.message()),
    }
}
