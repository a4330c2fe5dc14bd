use super::components::centered_rect;
use crate::app::App;
use ratatui::{
    Frame,
    layout::Alignment,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};

pub fn render_login_popup(f: &mut Frame, app: &App) {
    let Some(display) = app.login_display.as_ref() else {
        return;
    };

    let area = centered_rect(70, 50, f.area());
    f.render_widget(Clear, area);

    let block = Block::default()
        .title(" Sign in ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let lines = vec![
        Line::from(""),
        Line::from("Waiting for the browser sign-in to finish."),
        Line::from(""),
        Line::from(Span::styled(
            "If no browser window opened, visit:",
            Style::default().fg(Color::DarkGray),
        )),
        Line::from(Span::styled(
            display.login_url.clone(),
            Style::default().fg(Color::Cyan),
        )),
        Line::from(""),
        Line::from(Span::styled(
            format!(
                "Listening on {} until {}.",
                display.listen_addr,
                display.expires_at.format("%H:%M:%S")
            ),
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: true });
    f.render_widget(paragraph, area);
}

pub fn render_help_popup(f: &mut Frame, app: &App) {
    let area = centered_rect(55, 60, f.area());
    f.render_widget(Clear, area);

    let block = Block::default().title(" Help ").borders(Borders::ALL);
    let kb = &app.config.keybindings;

    let entry = |keys: &[String], label: &str| {
        Line::from(vec![
            Span::styled(
                format!("  {:<14}", keys.join(", ")),
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(label.to_string()),
        ])
    };

    let lines = vec![
        Line::from(""),
        entry(&kb.list.up, "move up"),
        entry(&kb.list.down, "move down"),
        entry(&kb.list.toggle, "toggle done"),
        entry(&kb.global.add, "add todo"),
        entry(&kb.list.edit, "edit todo"),
        entry(&kb.list.delete, "delete todo"),
        entry(&kb.global.refresh, "refresh from server"),
        entry(&kb.global.logout, "sign out / sign in"),
        entry(&kb.global.help, "toggle this help"),
        entry(&kb.global.quit, "quit"),
        Line::from(""),
        Line::from(Span::styled(
            "  Due dates: 2026-04-01 09:30, tomorrow, +3d, fri 14:00",
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let paragraph = Paragraph::new(lines)
        .block(block)
        .alignment(Alignment::Left);
    f.render_widget(paragraph, area);
}
