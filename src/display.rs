//! Terminal rendering helpers shared by the CLI views.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use console::{StyledObject, style};
use trellis_common::{Board, Comment, Priority, Project, Ticket, TicketHistory, TicketStatus, User};

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// `Mar 4, 2025`. Unparseable input is returned unchanged.
pub fn format_date(raw: &str) -> String {
    parse_timestamp(raw)
        .map(|dt| dt.format("%b %-d, %Y").to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// `Mar 4, 2025 14:05`.
pub fn format_date_time(raw: &str) -> String {
    parse_timestamp(raw)
        .map(|dt| dt.format("%b %-d, %Y %H:%M").to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// Up to two uppercase initials for an avatar badge.
pub fn initials(name: &str) -> String {
    let words: Vec<&str> = name
        .split(|c: char| c.is_whitespace() || c == '_' || c == '-' || c == '.')
        .filter(|w| !w.is_empty())
        .collect();
    let letters: String = match words.as_slice() {
        [] => String::new(),
        [single] => single.chars().take(2).collect(),
        [first, .., last] => first.chars().take(1).chain(last.chars().take(1)).collect(),
    };
    letters.to_uppercase()
}

pub fn styled_priority(priority: Priority) -> StyledObject<&'static str> {
    let s = style(priority.as_str());
    match priority {
        Priority::High => s.red().bold(),
        Priority::Medium => s.yellow(),
        Priority::Low => s.green(),
    }
}

pub fn styled_status(status: TicketStatus) -> StyledObject<&'static str> {
    let s = style(status.as_str());
    match status {
        TicketStatus::Open => s.cyan(),
        TicketStatus::InProgress => s.yellow(),
        TicketStatus::Done => s.green(),
        TicketStatus::Closed => s.dim(),
    }
}

pub fn ticket_line(ticket: &Ticket) -> String {
    format!(
        "#{:<5} {:<12} {:<7} {}",
        ticket.id,
        styled_status(ticket.status),
        styled_priority(ticket.priority),
        ticket.title
    )
}

pub fn print_tickets(tickets: &[Ticket]) {
    if tickets.is_empty() {
        println!("{}", style("No tickets").dim());
        return;
    }
    for ticket in tickets {
        println!("{}", ticket_line(ticket));
    }
}

pub fn print_ticket(ticket: &Ticket) {
    println!("{} {}", style(format!("#{}", ticket.id)).dim(), style(&ticket.title).bold());
    println!(
        "  status: {}  priority: {}  column: {}",
        styled_status(ticket.status),
        styled_priority(ticket.priority),
        ticket.column_id
    );
    if let Some(owner) = ticket.owner_id {
        println!("  owner: {}", owner);
    }
    if let Some(updated) = &ticket.updated_at {
        println!("  updated: {}", format_date_time(updated));
    }
    if let Some(description) = ticket.description.as_deref().filter(|d| !d.is_empty()) {
        println!();
        for line in description.lines() {
            println!("  {}", line);
        }
    }
    if !ticket.comments.is_empty() {
        println!();
        println!("  {} ({})", style("Comments").bold(), ticket.comments.len());
        for comment in &ticket.comments {
            println!("  {}", comment_line(comment));
        }
    }
}

pub fn comment_line(comment: &Comment) -> String {
    let author = comment
        .author
        .as_ref()
        .map(|a| a.username.clone())
        .or_else(|| comment.author_id.map(|id| format!("user {}", id)))
        .unwrap_or_else(|| "unknown".to_string());
    let when = comment
        .created_at
        .as_deref()
        .map(format_date_time)
        .unwrap_or_default();
    format!(
        "[{}] {} {}: {}",
        initials(&author),
        style(author.as_str()).cyan(),
        style(when).dim(),
        comment.content
    )
}

pub fn print_history(entries: &[TicketHistory]) {
    if entries.is_empty() {
        println!("{}", style("No history").dim());
        return;
    }
    for entry in entries {
        println!(
            "{} {}: {} → {}",
            style(format_date_time(&entry.changed_at)).dim(),
            entry.field_changed,
            entry.old_value.as_deref().unwrap_or("-"),
            entry.new_value.as_deref().unwrap_or("-")
        );
    }
}

pub fn print_projects(projects: &[Project]) {
    if projects.is_empty() {
        println!("{}", style("No projects").dim());
        return;
    }
    for project in projects {
        println!(
            "{:<5} {} {}",
            project.id,
            style(&project.name).bold(),
            style(project.description.as_deref().unwrap_or("")).dim()
        );
    }
}

pub fn print_project(project: &Project) {
    println!("{} {}", style(format!("#{}", project.id)).dim(), style(&project.name).bold());
    if let Some(description) = project.description.as_deref().filter(|d| !d.is_empty()) {
        println!("  {}", description);
    }
    if let Some(created) = &project.created_at {
        println!("  created: {}", format_date(created));
    }
    if !project.users.is_empty() {
        let members: Vec<String> = project.users.iter().map(|u| u.username.clone()).collect();
        println!("  members: {}", members.join(", "));
    }
}

pub fn print_board(board: &Board) {
    println!("{} {}", style(&board.name).bold().underlined(), style(format!("(board {})", board.id)).dim());
    for column in &board.columns {
        println!();
        println!("{} ({})", style(&column.name).bold(), column.tickets.len());
        for ticket in &column.tickets {
            println!("  {}", ticket_line(ticket));
        }
    }
}

pub fn print_user(user: &User) {
    println!("{} [{}]", style(&user.username).bold(), initials(&user.username));
    println!("  email: {}", user.email);
    println!("  role:  {}", user.role);
    if let Some(created) = &user.created_at {
        println!("  since: {}", format_date(created));
    }
}
