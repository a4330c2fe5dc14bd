use crate::app::App;
use crate::auth::LoginOutcome;
use crate::sync::{SyncController, TaskOp};
use chrono::Local;
use std::sync::mpsc::TryRecvError;

pub fn tick(app: &mut App) {
    handle_login(app);
    handle_task_op(app);

    if let Some(expiry) = app.toast_expiry
        && Local::now() >= expiry
    {
        app.toast_expiry = None;
        app.toast_message = None;
    }
}

fn handle_login(app: &mut App) {
    let result = {
        let Some(receiver) = app.login_receiver.as_ref() else {
            return;
        };
        receiver.try_recv()
    };

    match result {
        Ok(LoginOutcome::Fragment(fragment)) => {
            app.login_receiver = None;
            app.login_display = None;
            match app.store.complete_login(&fragment) {
                Ok(()) => {
                    app.adopt_claims();
                    let message = match app.email() {
                        Some(email) => format!("Signed in as {email}."),
                        None => "Signed in.".to_string(),
                    };
                    app.toast(message);
                    app.dispatch(TaskOp::Refresh);
                }
                Err(err) => {
                    let message = format!("Sign-in failed: {}", err.message());
                    app.toast(message);
                }
            }
        }
        Ok(LoginOutcome::Error(message)) => {
            app.login_receiver = None;
            app.login_display = None;
            app.toast(format!("Sign-in failed: {message}"));
        }
        Err(TryRecvError::Empty) => {}
        Err(TryRecvError::Disconnected) => {
            app.login_receiver = None;
            app.login_display = None;
            app.toast("Sign-in listener stopped.");
        }
    }
}

fn handle_task_op(app: &mut App) {
    let result = {
        let Some(receiver) = app.op_receiver.as_ref() else {
            return;
        };
        receiver.try_recv()
    };

    match result {
        Ok(outcome) => {
            app.op_receiver = None;
            app.adopt_outcome(outcome);
        }
        Err(TryRecvError::Empty) => {}
        Err(TryRecvError::Disconnected) => {
            // The worker died without reporting; the controller went with it.
            app.op_receiver = None;
            app.controller = Some(SyncController::new(&app.config.api));
            app.toast("Request worker stopped unexpectedly.");
        }
    }
}
