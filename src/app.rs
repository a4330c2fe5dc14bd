use crate::auth::{self, Claims, CredentialStore, LoginDisplay, LoginOutcome, StartupResolution};
use crate::config::{Config, token_path};
use crate::models::{FormField, FormTarget, InputMode, Todo};
use crate::sync::{LoadPhase, OpOutcome, SyncController, TaskOp, spawn_task_op};
use chrono::{DateTime, Duration, Local};
use ratatui::widgets::ListState;
use std::sync::mpsc::Receiver;

pub struct App {
    pub input_mode: InputMode,

    /// Display copy of the controller's last snapshot; replaced wholesale
    /// whenever an operation hands the controller back.
    pub todos: Vec<Todo>,
    pub phase: LoadPhase,
    pub list_state: ListState,

    pub form_target: FormTarget,
    pub form_field: FormField,
    pub title_input: String,
    pub due_input: String,

    pub store: CredentialStore,
    pub claims: Option<Claims>,

    /// Present while idle; moved into the worker thread for the duration of
    /// an operation, which is what keeps operations serialized.
    pub controller: Option<SyncController>,
    pub op_receiver: Option<Receiver<OpOutcome>>,

    pub login_receiver: Option<Receiver<LoginOutcome>>,
    pub login_display: Option<LoginDisplay>,

    pub show_help_popup: bool,
    pub toast_message: Option<String>,
    pub toast_expiry: Option<DateTime<Local>>,
    pub should_quit: bool,

    pub config: Config,
}

impl App {
    pub fn new(config: Config) -> App {
        let store = CredentialStore::new(config.auth.clone(), token_path(&config));
        let controller = SyncController::new(&config.api);

        let mut app = App {
            input_mode: InputMode::Navigate,
            todos: Vec::new(),
            phase: LoadPhase::NotLoaded,
            list_state: ListState::default(),
            form_target: FormTarget::Create,
            form_field: FormField::Title,
            title_input: String::new(),
            due_input: String::new(),
            store,
            claims: None,
            controller: Some(controller),
            op_receiver: None,
            login_receiver: None,
            login_display: None,
            show_help_popup: false,
            toast_message: None,
            toast_expiry: None,
            should_quit: false,
            config,
        };
        app.startup();
        app
    }

    fn startup(&mut self) {
        if !self.is_configured() {
            self.toast("Set [api] base_url and [auth] in config.toml to get started.");
            return;
        }

        match self.store.resolve_on_startup(None) {
            StartupResolution::Active => {
                self.adopt_claims();
                self.dispatch(TaskOp::Refresh);
            }
            StartupResolution::LoginRequired => self.begin_login(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.auth.is_configured() && !self.config.api.base_url.trim().is_empty()
    }

    /// True while an operation is outstanding; the key handlers use this to
    /// refuse re-entrant triggers.
    pub fn in_flight(&self) -> bool {
        self.op_receiver.is_some()
    }

    pub fn login_pending(&self) -> bool {
        self.login_receiver.is_some()
    }

    pub fn signed_in(&self) -> bool {
        self.store.active().is_some()
    }

    pub fn email(&self) -> Option<&str> {
        self.claims.as_ref()?.email.as_deref()
    }

    pub fn adopt_claims(&mut self) {
        self.claims = self.store.active().and_then(|c| c.claims());
    }

    /// Moves the controller and a credential clone into a worker thread.
    /// Returns false (with a toast) when a request is already outstanding or
    /// no credential is active.
    pub fn dispatch(&mut self, op: TaskOp) -> bool {
        if self.in_flight() {
            self.toast("A request is already in progress.");
            return false;
        }
        let Some(credential) = self.store.active() else {
            self.toast("Not signed in.");
            return false;
        };
        let Some(controller) = self.controller.take() else {
            self.toast("A request is already in progress.");
            return false;
        };
        self.op_receiver = Some(spawn_task_op(controller, credential.clone(), op));
        true
    }

    /// Takes the controller back from a finished worker and mirrors its
    /// snapshot into the display state.
    pub fn adopt_outcome(&mut self, outcome: OpOutcome) {
        let OpOutcome {
            controller,
            op,
            result,
        } = outcome;

        if !self.signed_in() {
            // Logged out while the request was in flight; the outcome is
            // stale by definition. Start over with an empty controller.
            self.controller = Some(SyncController::new(&self.config.api));
            return;
        }

        self.todos = controller.todos().to_vec();
        self.phase = controller.phase();
        self.controller = Some(controller);
        self.clamp_selection();

        match result {
            Ok(()) => {
                match op {
                    TaskOp::Create { .. } => {
                        self.clear_form();
                        self.toast("Added.");
                    }
                    TaskOp::Update { .. } => {
                        self.clear_form();
                        self.toast("Updated.");
                    }
                    TaskOp::Toggle { .. } | TaskOp::Delete { .. } => {}
                    TaskOp::Refresh => {}
                }
            }
            Err(err) => {
                if err.is_auth_failure() {
                    self.toast(format!(
                        "{} Session may have expired; press Ctrl+L to sign in again.",
                        err.message()
                    ));
                } else {
                    self.toast(err.message());
                }
                // A failed create/update keeps its pending inputs so the user
                // can fix and resubmit.
                if matches!(op, TaskOp::Create { .. } | TaskOp::Update { .. }) {
                    self.input_mode = InputMode::Form;
                }
            }
        }
    }

    pub fn begin_login(&mut self) {
        if self.login_pending() {
            self.toast("Sign-in already in progress.");
            return;
        }

        match auth::start_login_flow(&self.config.auth) {
            Ok(session) => {
                let url = session.display.login_url.clone();
                self.login_display = Some(session.display.clone());
                self.login_receiver = Some(auth::spawn_redirect_poll(session));
                if open::that(&url).is_err() {
                    self.toast("Could not open a browser; use the URL shown in the sign-in panel.");
                }
            }
            Err(err) => self.toast(err.message()),
        }
    }

    pub fn selected_todo(&self) -> Option<&Todo> {
        self.todos.get(self.list_state.selected()?)
    }

    pub fn select_next(&mut self) {
        if self.todos.is_empty() {
            return;
        }
        let next = match self.list_state.selected() {
            Some(i) if i + 1 < self.todos.len() => i + 1,
            Some(i) => i,
            None => 0,
        };
        self.list_state.select(Some(next));
    }

    pub fn select_prev(&mut self) {
        if self.todos.is_empty() {
            return;
        }
        let prev = match self.list_state.selected() {
            Some(i) => i.saturating_sub(1),
            None => 0,
        };
        self.list_state.select(Some(prev));
    }

    fn clamp_selection(&mut self) {
        if self.todos.is_empty() {
            self.list_state.select(None);
        } else {
            let selected = self.list_state.selected().unwrap_or(0);
            self.list_state
                .select(Some(selected.min(self.todos.len() - 1)));
        }
    }

    pub fn open_add_form(&mut self) {
        if !self.signed_in() {
            self.toast("Not signed in.");
            return;
        }
        // Inputs are not cleared here: a previously failed submit left them
        // in place for retry.
        if self.form_target != FormTarget::Create {
            self.clear_form();
            self.form_target = FormTarget::Create;
        }
        self.form_field = FormField::Title;
        self.input_mode = InputMode::Form;
    }

    pub fn open_edit_form(&mut self) {
        let Some(todo) = self.selected_todo() else {
            self.toast("No todo selected.");
            return;
        };
        let todo = todo.clone();
        self.form_target = FormTarget::Edit {
            todo_id: todo.todo_id.clone(),
        };
        self.title_input = todo.title.clone();
        self.due_input = todo
            .due_local()
            .map(|due| due.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        self.form_field = FormField::Title;
        self.input_mode = InputMode::Form;
    }

    pub fn close_form(&mut self) {
        self.input_mode = InputMode::Navigate;
    }

    pub fn clear_form(&mut self) {
        self.title_input.clear();
        self.due_input.clear();
        self.form_target = FormTarget::Create;
        self.form_field = FormField::Title;
        self.input_mode = InputMode::Navigate;
    }

    pub fn form_input(&mut self, ch: char) {
        match self.form_field {
            FormField::Title => self.title_input.push(ch),
            FormField::Due => self.due_input.push(ch),
        }
    }

    pub fn form_backspace(&mut self) {
        match self.form_field {
            FormField::Title => {
                self.title_input.pop();
            }
            FormField::Due => {
                self.due_input.pop();
            }
        }
    }

    pub fn form_next_field(&mut self) {
        self.form_field = match self.form_field {
            FormField::Title => FormField::Due,
            FormField::Due => FormField::Title,
        };
    }

    pub fn toast(&mut self, message: impl Into<String>) {
        self.toast_message = Some(message.into());
        self.toast_expiry = Some(Local::now() + Duration::seconds(3));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::ApiError;
    use base64::Engine as _;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    fn offline_app() -> App {
        // Default config is unconfigured, so startup neither dials out nor
        // opens a login flow.
        let mut config = Config::default();
        config.data.dir = std::env::temp_dir().join(format!(
            "todopad-app-test-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ));
        App::new(config)
    }

    fn sample_todo(id: &str, title: &str) -> Todo {
        Todo {
            todo_id: id.to_string(),
            title: title.to_string(),
            completed: false,
            due_date: None,
            created_at: None,
        }
    }

    #[test]
    fn unconfigured_startup_stays_idle() {
        let app = offline_app();
        assert!(!app.signed_in());
        assert!(!app.in_flight());
        assert!(!app.login_pending());
        assert_eq!(app.phase, LoadPhase::NotLoaded);
        assert!(app.toast_message.is_some());
    }

    #[test]
    fn dispatch_refuses_without_credential() {
        let mut app = offline_app();
        assert!(!app.dispatch(TaskOp::Refresh));
        assert!(!app.in_flight());
    }

    #[test]
    fn selection_moves_and_clamps() {
        let mut app = offline_app();
        app.todos = vec![sample_todo("1", "a"), sample_todo("2", "b")];
        app.select_next();
        assert_eq!(app.list_state.selected(), Some(0));
        app.select_next();
        assert_eq!(app.list_state.selected(), Some(1));
        app.select_next();
        assert_eq!(app.list_state.selected(), Some(1));
        app.select_prev();
        assert_eq!(app.list_state.selected(), Some(0));

        app.todos = vec![sample_todo("1", "a")];
        app.list_state.select(Some(1));
        app.clamp_selection();
        assert_eq!(app.list_state.selected(), Some(0));

        app.todos.clear();
        app.clamp_selection();
        assert_eq!(app.list_state.selected(), None);
    }

    #[test]
    fn edit_form_prefills_from_selection() {
        let mut app = offline_app();
        app.todos = vec![sample_todo("9", "Water plants")];
        app.list_state.select(Some(0));

        app.open_edit_form();
        assert_eq!(app.input_mode, InputMode::Form);
        assert_eq!(app.title_input, "Water plants");
        assert!(app.due_input.is_empty());
        assert_eq!(
            app.form_target,
            FormTarget::Edit {
                todo_id: "9".to_string()
            }
        );
    }

    fn signed_in_app() -> App {
        let mut app = offline_app();
        let encode = |bytes: &[u8]| URL_SAFE_NO_PAD.encode(bytes);
        let token = format!(
            "{}.{}.{}",
            encode(br#"{"alg":"RS256"}"#),
            encode(br#"{"email":"me@example.com"}"#),
            encode(b"sig")
        );
        app.store
            .complete_login(&format!("id_token={token}"))
            .expect("login");
        app.adopt_claims();
        app
    }

    fn create_outcome(app: &App, result: Result<(), ApiError>) -> OpOutcome {
        OpOutcome {
            controller: SyncController::new(&app.config.api),
            op: TaskOp::Create {
                title: "Buy milk".to_string(),
                due: None,
            },
            result,
        }
    }

    #[test]
    fn failed_create_keeps_pending_inputs_for_retry() {
        let mut app = signed_in_app();
        app.title_input = "Buy milk".to_string();
        app.due_input = "+1d".to_string();
        app.input_mode = InputMode::Navigate; // form was submitted

        let outcome = create_outcome(
            &app,
            Err(ApiError::Status {
                context: "Create",
                status: 500,
            }),
        );
        app.adopt_outcome(outcome);

        assert_eq!(app.input_mode, InputMode::Form);
        assert_eq!(app.title_input, "Buy milk");
        assert_eq!(app.due_input, "+1d");
        assert!(app.toast_message.is_some());
    }

    #[test]
    fn successful_create_clears_the_form() {
        let mut app = signed_in_app();
        app.title_input = "Buy milk".to_string();
        app.due_input = "+1d".to_string();
        app.input_mode = InputMode::Navigate;

        let outcome = create_outcome(&app, Ok(()));
        app.adopt_outcome(outcome);

        assert_eq!(app.input_mode, InputMode::Navigate);
        assert!(app.title_input.is_empty());
        assert!(app.due_input.is_empty());
    }

    #[test]
    fn form_editing_targets_active_field() {
        let mut app = offline_app();
        app.input_mode = InputMode::Form;
        app.form_input('h');
        app.form_input('i');
        app.form_next_field();
        app.form_input('+');
        app.form_input('3');
        app.form_input('d');
        assert_eq!(app.title_input, "hi");
        assert_eq!(app.due_input, "+3d");
        app.form_backspace();
        assert_eq!(app.due_input, "+3");
    }
}
