use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::{Backend, CrosstermBackend},
};
use std::{error::Error, io};

mod actions;
mod app;
mod auth;
mod config;
mod date_input;
mod models;
mod runtime;
mod sync;
mod ui;

use crate::config::{Config, KeyBindings, key_match};
use app::App;
use models::InputMode;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let mut app = App::new(Config::load());

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("{:?}", err);
    }

    Ok(())
}

fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    loop {
        runtime::tick(app);

        terminal.draw(|f| ui::ui(f, app))?;

        if event::poll(std::time::Duration::from_millis(250))?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            handle_key_input(app, key);
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn handle_key_input(app: &mut App, key: KeyEvent) {
    let bindings = app.config.keybindings.clone();

    if app.show_help_popup {
        if key_match(&key, &bindings.global.help) || key_match(&key, &bindings.form.cancel) {
            app.show_help_popup = false;
        }
        return;
    }

    match app.input_mode {
        InputMode::Navigate => handle_navigate(app, key, &bindings),
        InputMode::Form => handle_form(app, key, &bindings),
    }
}

fn handle_navigate(app: &mut App, key: KeyEvent, kb: &KeyBindings) {
    if key_match(&key, &kb.global.quit) {
        app.should_quit = true;
        return;
    }
    if key_match(&key, &kb.global.help) {
        app.show_help_popup = true;
        return;
    }
    if key_match(&key, &kb.global.logout) {
        actions::logout(app);
        return;
    }

    // While sign-in is pending, the list is not actionable.
    if app.login_pending() {
        return;
    }

    if key_match(&key, &kb.global.refresh) {
        actions::refresh(app);
    } else if key_match(&key, &kb.global.add) {
        app.open_add_form();
    } else if key_match(&key, &kb.list.up) {
        app.select_prev();
    } else if key_match(&key, &kb.list.down) {
        app.select_next();
    } else if key_match(&key, &kb.list.toggle) {
        actions::toggle_selected(app);
    } else if key_match(&key, &kb.list.delete) {
        actions::delete_selected(app);
    } else if key_match(&key, &kb.list.edit) {
        app.open_edit_form();
    }
}

fn handle_form(app: &mut App, key: KeyEvent, kb: &KeyBindings) {
    if key_match(&key, &kb.form.cancel) {
        app.close_form();
        return;
    }
    if key_match(&key, &kb.form.submit) {
        actions::submit_form(app);
        return;
    }
    if key_match(&key, &kb.form.next_field) {
        app.form_next_field();
        return;
    }

    match key.code {
        KeyCode::Backspace => app.form_backspace(),
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => app.form_input(c),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FormField;

    fn make_app() -> App {
        // Default config is unconfigured, so this never touches the network.
        App::new(Config::default())
    }

    fn send_key(app: &mut App, code: KeyCode, modifiers: KeyModifiers) {
        handle_key_input(app, KeyEvent::new(code, modifiers));
    }

    fn send_char(app: &mut App, ch: char) {
        send_key(app, KeyCode::Char(ch), KeyModifiers::NONE);
    }

    #[test]
    fn quit_key_sets_flag() {
        let mut app = make_app();
        send_char(&mut app, 'q');
        assert!(app.should_quit);
    }

    #[test]
    fn help_opens_and_any_toggle_closes() {
        let mut app = make_app();
        send_char(&mut app, '?');
        assert!(app.show_help_popup);
        send_key(&mut app, KeyCode::Esc, KeyModifiers::NONE);
        assert!(!app.show_help_popup);
    }

    #[test]
    fn form_typing_goes_to_the_active_field() {
        let mut app = make_app();
        app.input_mode = InputMode::Form;

        send_char(&mut app, 'm');
        send_char(&mut app, 'i');
        send_char(&mut app, 'l');
        send_char(&mut app, 'k');
        assert_eq!(app.title_input, "milk");

        send_key(&mut app, KeyCode::Tab, KeyModifiers::NONE);
        assert_eq!(app.form_field, FormField::Due);
        send_char(&mut app, '+');
        send_char(&mut app, '1');
        send_char(&mut app, 'd');
        assert_eq!(app.due_input, "+1d");

        send_key(&mut app, KeyCode::Backspace, KeyModifiers::NONE);
        assert_eq!(app.due_input, "+1");
    }

    #[test]
    fn esc_leaves_the_form_without_clearing_it() {
        let mut app = make_app();
        app.input_mode = InputMode::Form;
        send_char(&mut app, 'x');
        send_key(&mut app, KeyCode::Esc, KeyModifiers::NONE);
        assert_eq!(app.input_mode, InputMode::Navigate);
        assert_eq!(app.title_input, "x");
    }

    #[test]
    fn empty_submit_is_rejected_locally() {
        let mut app = make_app();
        app.input_mode = InputMode::Form;
        send_key(&mut app, KeyCode::Enter, KeyModifiers::NONE);
        assert_eq!(app.input_mode, InputMode::Form);
        assert!(app.toast_message.is_some());
        assert!(!app.in_flight());
    }
}
