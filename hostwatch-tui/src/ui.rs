use crate::app::{App, Tab};
use hostwatch_core::{Event, Status};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{
        Block, Borders, Cell, List, ListItem, ListState, Paragraph, Row, Table, TableState, Tabs,
    },
    Frame,
};

const HELP: &str = concat!(
    "q: Quit | Tab/1-5: Switch Tabs | ↑↓: Navigate | ",
    "PgUp/PgDn: Scroll | s: Ranking | r: Refresh"
);

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(f.area());

    draw_tabs(f, app, chunks[0]);
    draw_summary(f, app, chunks[1]);
    draw_main_content(f, app, chunks[2]);
    draw_footer(f, app, chunks[3]);
}

fn draw_tabs(f: &mut Frame, app: &App, area: Rect) {
    let titles: Vec<&str> = Tab::ALL.iter().map(|t| t.title()).collect();
    let tabs = Tabs::new(titles)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("hostwatch: {}", app.hostname)),
        )
        .select(app.current_tab.index())
        .style(Style::default().fg(Color::White))
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );

    f.render_widget(tabs, area);
}

fn draw_summary(f: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![Span::raw("Last 24h  ")];
    for status in Status::ALL {
        spans.push(Span::styled(
            format!("{} ", status),
            Style::default()
                .fg(status_color(status))
                .add_modifier(Modifier::BOLD),
        ));
        spans.push(Span::raw(format!("{}   ", app.data.summary.get(status))));
    }
    spans.push(Span::raw(format!("total {}", app.data.summary.total())));

    let summary = Paragraph::new(Line::from(spans))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title("Summary"));
    f.render_widget(summary, area);
}

fn draw_main_content(f: &mut Frame, app: &App, area: Rect) {
    match app.current_tab {
        Tab::Latest => draw_event_table(f, app, area, &app.data.latest, "Latest value per metric"),
        Tab::Events => draw_event_table(
            f,
            app,
            area,
            &app.data.events,
            &format!("Recent events ({})", app.data.events.len()),
        ),
        Tab::Alerts => draw_alerts(f, app, area),
        Tab::Processes => draw_processes(f, app, area),
        Tab::Connections => draw_connections(f, app, area),
    }
}

fn highlighted<'a>(table: Table<'a>) -> Table<'a> {
    table
        .row_highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol(">> ")
}

fn header<'a>(cells: Vec<&'a str>) -> Row<'a> {
    Row::new(cells)
        .style(Style::default().add_modifier(Modifier::BOLD))
        .bottom_margin(1)
}

fn draw_event_table(f: &mut Frame, app: &App, area: Rect, events: &[Event], title: &str) {
    let rows: Vec<Row> = events
        .iter()
        .map(|e| {
            Row::new(vec![
                Cell::from(e.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()),
                Cell::from(e.metric.clone()),
                Cell::from(format!("{:.2}", e.value)),
                Cell::from(e.status.as_str())
                    .style(Style::default().fg(status_color(e.status))),
                Cell::from(e.hostname.clone()),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(20),
            Constraint::Min(24),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(20),
        ],
    )
    .header(header(vec!["Time (UTC)", "Metric", "Value", "Status", "Host"]))
    .block(Block::default().borders(Borders::ALL).title(title.to_string()));

    let mut state = TableState::default();
    state.select((!events.is_empty()).then_some(app.selected));
    f.render_stateful_widget(highlighted(table), area, &mut state);
}

fn draw_alerts(f: &mut Frame, app: &App, area: Rect) {
    let alert_items: Vec<ListItem> = app
        .data
        .alerts
        .iter()
        .map(|alert| {
            let content = vec![
                Line::from(vec![
                    Span::styled(
                        format!("[{}] ", alert.status),
                        Style::default()
                            .fg(status_color(alert.status))
                            .add_modifier(Modifier::BOLD),
                    ),
                    Span::raw(format!(
                        "{} - {} on {}",
                        alert.timestamp.format("%H:%M:%S"),
                        alert.metric,
                        alert.hostname
                    )),
                ]),
                Line::from(vec![Span::raw("  value: "), Span::raw(format!("{:.2}", alert.value))]),
            ];

            ListItem::new(content)
        })
        .collect();

    let alert_list = List::new(alert_items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Critical alerts, last 24h ({})", app.data.alerts.len())),
        )
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    let mut state = ListState::default();
    state.select((!app.data.alerts.is_empty()).then_some(app.selected));
    f.render_stateful_widget(alert_list, area, &mut state);
}

fn draw_processes(f: &mut Frame, app: &App, area: Rect) {
    let rows: Vec<Row> = app
        .data
        .processes
        .iter()
        .map(|p| {
            Row::new(vec![
                Cell::from(p.pid.to_string()),
                Cell::from(p.name.clone()),
                percent_cell(p.cpu_percent),
                percent_cell(p.memory_percent),
            ])
        })
        .collect();

    let title = format!(
        "Top processes by {} - s: switch ranking",
        app.rank_by.as_str()
    );
    let table = Table::new(
        rows,
        [
            Constraint::Length(8),
            Constraint::Min(20),
            Constraint::Length(10),
            Constraint::Length(10),
        ],
    )
    .header(header(vec!["PID", "Name", "CPU %", "Mem %"]))
    .block(Block::default().borders(Borders::ALL).title(title));

    let mut state = TableState::default();
    state.select((!app.data.processes.is_empty()).then_some(app.selected));
    f.render_stateful_widget(highlighted(table), area, &mut state);
}

fn percent_cell(value: Option<f64>) -> Cell<'static> {
    match value {
        Some(v) => Cell::from(format!("{:.1}%", v)).style(Style::default().fg(usage_color(v))),
        None => Cell::from("-").style(Style::default().fg(Color::Gray)),
    }
}

fn draw_connections(f: &mut Frame, app: &App, area: Rect) {
    let rows: Vec<Row> = app
        .data
        .connections
        .iter()
        .map(|c| {
            Row::new(vec![
                Cell::from(c.local_port.to_string()),
                Cell::from(c.remote_ip.map(|ip| ip.to_string()).unwrap_or_else(|| "-".into())),
                Cell::from(c.remote_port.map(|p| p.to_string()).unwrap_or_else(|| "-".into())),
                Cell::from(c.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".into())),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(12),
            Constraint::Min(20),
            Constraint::Length(12),
            Constraint::Length(10),
        ],
    )
    .header(header(vec!["Local port", "Remote address", "Remote port", "PID"]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Established connections ({})", app.data.connections.len())),
    );

    let mut state = TableState::default();
    state.select((!app.data.connections.is_empty()).then_some(app.selected));
    f.render_stateful_widget(highlighted(table), area, &mut state);
}

fn draw_footer(f: &mut Frame, app: &App, area: Rect) {
    let (text, color) = match &app.status_message {
        Some(message) => (message.clone(), Color::Red),
        None => (HELP.to_string(), Color::Gray),
    };
    let footer = Paragraph::new(text)
        .style(Style::default().fg(color))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(footer, area);
}

fn status_color(status: Status) -> Color {
    match status {
        Status::Critical => Color::Red,
        Status::Warn => Color::Yellow,
        Status::Ok => Color::Green,
    }
}

fn usage_color(usage: f64) -> Color {
    if usage > 80.0 {
        Color::Red
    } else if usage > 60.0 {
        Color::Yellow
    } else {
        Color::Green
    }
}
