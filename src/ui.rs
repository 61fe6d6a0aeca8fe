use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::prelude::*;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, List, ListItem, Paragraph, Wrap};

use crate::app::App;
use crate::ledger::{Transaction, TxKind, format_amount};
use crate::sim::{Entropy, MiningStatus, PriceSource};
use crate::store::KeyValueStore;
use crate::timer::format_countdown;

const MIN_PANE_WIDTH: u16 = 10;
const MIN_PANE_HEIGHT: u16 = 3;

pub fn draw<S: KeyValueStore, E: Entropy>(f: &mut Frame<'_>, app: &App<S, E>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(7)])
        .split(f.size());

    let main_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(chunks[0]);

    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(7),
            Constraint::Length(6),
            Constraint::Min(0),
        ])
        .split(main_chunks[0]);

    draw_miner(f, left_chunks[0], app);
    draw_wallet(f, left_chunks[1], app);
    draw_countdown(f, left_chunks[2], app);
    draw_ledger(f, main_chunks[1], app);
    draw_footer(f, chunks[1], app);
}

/// A pane that cannot fit its border and one line of content is skipped.
fn fits(area: Rect) -> bool {
    area.width >= MIN_PANE_WIDTH && area.height >= MIN_PANE_HEIGHT
}

fn draw_miner<S: KeyValueStore, E: Entropy>(f: &mut Frame<'_>, area: Rect, app: &App<S, E>) {
    if !fits(area) {
        return;
    }
    let sim = &app.sim;
    let mining = sim.status() == MiningStatus::Mining;
    let block = pane_block("Miner", mining);
    let (status, status_color) = if mining {
        ("MINING", Color::LightGreen)
    } else {
        ("IDLE", Color::DarkGray)
    };

    let lines = vec![
        Line::from(vec![
            Span::styled("Status ", Style::default().fg(Color::Gray)),
            Span::styled(
                status,
                Style::default()
                    .fg(status_color)
                    .add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(vec![
            Span::styled("Hash rate ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{} H/s", sim.hash_rate()),
                Style::default().fg(Color::Yellow),
            ),
            Span::raw("  |  Miners "),
            Span::styled(
                sim.active_miners().to_string(),
                Style::default().fg(Color::White),
            ),
        ]),
        Line::from(vec![
            Span::styled("Daily est. ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{:.8} BTC", sim.daily_estimate()),
                Style::default().fg(Color::LightCyan),
            ),
        ]),
        Line::from(""),
        Line::from(if mining {
            "[Space] stop mining"
        } else {
            "[Space] start mining"
        }),
    ];

    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: true });
    f.render_widget(paragraph, area);
}

fn draw_wallet<S: KeyValueStore, E: Entropy>(f: &mut Frame<'_>, area: Rect, app: &App<S, E>) {
    if !fits(area) {
        return;
    }
    let sim = &app.sim;
    let source = match sim.price_source() {
        PriceSource::Live => "live",
        PriceSource::Fallback => "fallback",
    };
    let lines = vec![
        Line::from(vec![
            Span::styled("Balance ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{:.8} BTC", sim.balance()),
                Style::default()
                    .fg(Color::LightCyan)
                    .add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(vec![
            Span::styled("Value ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("≈ ${:.2} USD", sim.usd_value()),
                Style::default().fg(Color::LightGreen),
            ),
        ]),
        Line::from(vec![
            Span::styled("BTC ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("${:.2}", sim.price()),
                Style::default().fg(Color::Yellow),
            ),
            Span::styled(format!(" ({source})"), Style::default().fg(Color::DarkGray)),
        ]),
    ];
    let paragraph = Paragraph::new(lines)
        .block(pane_block("Wallet", false))
        .wrap(Wrap { trim: true });
    f.render_widget(paragraph, area);
}

fn draw_countdown<S: KeyValueStore, E: Entropy>(f: &mut Frame<'_>, area: Rect, app: &App<S, E>) {
    if !fits(area) {
        return;
    }
    let countdown = app.sim.countdown();
    let title = format!("Next Reward (every {}s)", countdown.period());
    let gauge = Gauge::default()
        .block(pane_block(&title, false))
        .ratio(app.sim.progress())
        .gauge_style(
            Style::default()
                .fg(Color::Green)
                .bg(Color::Black)
                .add_modifier(Modifier::BOLD),
        )
        .label(format_countdown(countdown.remaining()));
    f.render_widget(gauge, area);
}

fn draw_ledger<S: KeyValueStore, E: Entropy>(f: &mut Frame<'_>, area: Rect, app: &App<S, E>) {
    if !fits(area) {
        return;
    }
    let block = pane_block("Transactions", false);
    let ledger = app.sim.ledger();

    if ledger.is_empty() {
        let paragraph = Paragraph::new("No transactions yet.")
            .block(block)
            .wrap(Wrap { trim: true });
        f.render_widget(paragraph, area);
        return;
    }

    let items: Vec<ListItem> = ledger.visible().iter().map(build_ledger_item).collect();
    let list = List::new(items).block(block);
    f.render_widget(list, area);
}

fn build_ledger_item(tx: &Transaction) -> ListItem<'static> {
    let timestamp = tx.timestamp_local().format("%H:%M:%S");
    let kind_color = match tx.kind {
        TxKind::Bonus => Color::Magenta,
        TxKind::Info => Color::DarkGray,
        TxKind::Reward => Color::LightGreen,
        TxKind::Guaranteed => Color::LightCyan,
    };
    let amount_color = if tx.amount > 0.0 {
        Color::LightGreen
    } else {
        Color::Gray
    };
    let line = Line::from(vec![
        Span::styled(timestamp.to_string(), Style::default().fg(Color::Gray)),
        Span::raw("  "),
        Span::styled(format!("{:<22}", tx.description), Style::default().fg(kind_color)),
        Span::styled(format_amount(tx.amount), Style::default().fg(amount_color)),
    ]);
    ListItem::new(vec![line])
}

fn draw_footer<S: KeyValueStore, E: Entropy>(f: &mut Frame<'_>, area: Rect, app: &App<S, E>) {
    if !fits(area) {
        return;
    }
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Ops & Feed")
        .border_style(Style::default().fg(Color::Gray));
    f.render_widget(block.clone(), area);
    let inner = block.inner(area);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(inner);

    let instruction_lines = vec![
        Line::from("Space/M toggle mining"),
        Line::from("E export ledger"),
        Line::from("R reset data"),
        Line::from("Q quit"),
    ];
    let instruction = Paragraph::new(instruction_lines).wrap(Wrap { trim: true });
    f.render_widget(instruction, columns[0]);

    let mut message_lines: Vec<Line> = Vec::new();
    if app.confirm_reset {
        message_lines.push(Line::from(Span::styled(
            "Confirm reset: Y / any other key cancels",
            Style::default()
                .fg(Color::LightRed)
                .add_modifier(Modifier::BOLD),
        )));
    }
    for msg in app.messages.iter() {
        message_lines.push(Line::from(Span::raw(msg.clone())));
    }
    if message_lines.is_empty() {
        message_lines.push(Line::from(Span::styled(
            "Awaiting signal...",
            Style::default().fg(Color::DarkGray),
        )));
    }
    let feed = Paragraph::new(message_lines)
        .alignment(Alignment::Left)
        .wrap(Wrap { trim: true });
    f.render_widget(feed, columns[1]);
}

fn pane_block<'a>(title: &'a str, highlighted: bool) -> Block<'a> {
    let border_style = if highlighted {
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Gray)
    };
    Block::default()
        .title(Span::styled(title, Style::default().fg(Color::White)))
        .borders(Borders::ALL)
        .border_style(border_style)
}
