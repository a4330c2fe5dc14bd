use chrono::Local;
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
};

use crate::app::App;
use crate::models::{FormField, InputMode, Todo};
use crate::sync::LoadPhase;

pub mod components;
pub mod popups;

use components::truncate_to_width;
use popups::{render_help_popup, render_login_popup};

pub fn ui(f: &mut Frame, app: &mut App) {
    let constraints = if app.input_mode == InputMode::Form {
        vec![
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(4),
            Constraint::Length(1),
        ]
    } else {
        vec![
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(1),
        ]
    };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(f.area());

    render_header(f, app, chunks[0]);
    render_list(f, app, chunks[1]);
    if app.input_mode == InputMode::Form {
        render_form(f, app, chunks[2]);
        render_status(f, app, chunks[3]);
    } else {
        render_status(f, app, chunks[2]);
    }

    if app.login_pending() {
        render_login_popup(f, app);
    }
    if app.show_help_popup {
        render_help_popup(f, app);
    }
}

fn render_header(f: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![Span::styled(
        " todopad ",
        Style::default().add_modifier(Modifier::BOLD),
    )];
    match app.email() {
        Some(email) => spans.push(Span::styled(
            format!("— {email}"),
            Style::default().fg(Color::DarkGray),
        )),
        None if app.signed_in() => spans.push(Span::styled(
            "— signed in",
            Style::default().fg(Color::DarkGray),
        )),
        None => spans.push(Span::styled(
            "— not signed in",
            Style::default().fg(Color::DarkGray),
        )),
    }
    if app
        .claims
        .as_ref()
        .and_then(|claims| claims.expires_at)
        .is_some_and(|exp| exp < Local::now().timestamp())
    {
        spans.push(Span::styled(
            " (session expired)",
            Style::default().fg(Color::Red),
        ));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_list(f: &mut Frame, app: &mut App, area: Rect) {
    let title = match app.phase {
        LoadPhase::NotLoaded if app.in_flight() => " Todos (loading…) ".to_string(),
        LoadPhase::NotLoaded => " Todos ".to_string(),
        LoadPhase::Loaded => format!(" Todos ({}) ", app.todos.len()),
        LoadPhase::Stale => format!(" Todos ({}) — stale ", app.todos.len()),
    };
    let border_style = if app.phase == LoadPhase::Stale {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(border_style);

    let inner_width = block.inner(area).width as usize;
    let items: Vec<ListItem> = app
        .todos
        .iter()
        .map(|todo| todo_item(todo, inner_width))
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_symbol("› ")
        .highlight_style(Style::default().add_modifier(Modifier::BOLD));
    f.render_stateful_widget(list, area, &mut app.list_state);
}

fn todo_item(todo: &Todo, width: usize) -> ListItem<'static> {
    let checkbox = if todo.completed { "[x] " } else { "[ ] " };

    let due = todo.due_local();
    let due_text = due
        .map(|d| format!("  (due {})", d.format("%Y-%m-%d %H:%M")))
        .unwrap_or_default();

    let title_width = width
        .saturating_sub(checkbox.len() + due_text.chars().count())
        .max(8);
    let title = truncate_to_width(&todo.title, title_width);

    let title_style = if todo.completed {
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::CROSSED_OUT)
    } else {
        Style::default()
    };
    let overdue = !todo.completed && due.is_some_and(|d| d < Local::now());
    let due_style = if overdue {
        Style::default().fg(Color::Red)
    } else {
        Style::default().fg(Color::DarkGray)
    };

    ListItem::new(Line::from(vec![
        Span::raw(checkbox),
        Span::styled(title, title_style),
        Span::styled(due_text, due_style),
    ]))
}

fn render_form(f: &mut Frame, app: &App, area: Rect) {
    let title = match app.form_target {
        crate::models::FormTarget::Create => " Add todo ",
        crate::models::FormTarget::Edit { .. } => " Edit todo ",
    };
    let block = Block::default().title(title).borders(Borders::ALL);

    let field_line = |label: &str, value: &str, active: bool| {
        let marker = if active { "› " } else { "  " };
        let style = if active {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default()
        };
        let cursor = if active { "▏" } else { "" };
        Line::from(vec![
            Span::styled(format!("{marker}{label:<7}"), style),
            Span::raw(format!("{value}{cursor}")),
        ])
    };

    let lines = vec![
        field_line(
            "Title:",
            &app.title_input,
            app.form_field == FormField::Title,
        ),
        field_line("Due:", &app.due_input, app.form_field == FormField::Due),
    ];
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_status(f: &mut Frame, app: &App, area: Rect) {
    let line = if let Some(toast) = app.toast_message.as_deref() {
        Line::from(Span::styled(
            format!(" {toast}"),
            Style::default().fg(Color::Yellow),
        ))
    } else if app.in_flight() {
        Line::from(Span::styled(
            " syncing…",
            Style::default().fg(Color::Cyan),
        ))
    } else if app.input_mode == InputMode::Form {
        Line::from(Span::styled(
            " enter save · tab switch field · esc cancel",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Line::from(Span::styled(
            " a add · space toggle · d delete · e edit · r refresh · ? help · q quit",
            Style::default().fg(Color::DarkGray),
        ))
    };
    f.render_widget(Paragraph::new(line), area);
}
