//! Live board view: `trellis watch <project>`.
//!
//! Renders one board, then re-renders whenever a pushed ticket update
//! touches a ticket already on it. Stops on Ctrl-C or when the session ends
//! (logout elsewhere, or a 401).

use anyhow::{Context, Result};
use console::{Term, style};
use tokio::sync::broadcast::error::RecvError;

use trellis::Trellis;
use trellis::board::BoardView;
use trellis::display::print_board;
use trellis::realtime::ChannelEvent;

use super::{require_login, user_error};

pub async fn cmd_watch(app: &Trellis, project: i64, board_id: Option<i64>) -> Result<()> {
    let mut events = app.realtime().subscribe();
    let mut session = app.session().subscribe();
    let user = require_login(app).await?;

    let boards = app.api().list_boards(project).await.map_err(user_error)?;
    let board = match board_id {
        Some(id) => boards
            .into_iter()
            .find(|b| b.id == id)
            .with_context(|| format!("Board {} not found in project {}", id, project))?,
        None => boards
            .into_iter()
            .next()
            .with_context(|| format!("Project {} has no boards", project))?,
    };
    let mut view = BoardView::new(board);
    let term = Term::stdout();
    let mut status = String::from("connecting");
    render(&term, &view, &user.username, &status);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
            changed = session.changed() => {
                if changed.is_err() || !session.borrow_and_update().is_authenticated() {
                    println!("{}", style("Session ended, stopping.").yellow());
                    break;
                }
            }
            event = events.recv() => match event {
                Ok(ChannelEvent::Push(push)) => {
                    if view.apply(&push) {
                        render(&term, &view, &user.username, &status);
                    }
                }
                Ok(ChannelEvent::Connected) => {
                    status = "live".to_string();
                    render(&term, &view, &user.username, &status);
                }
                Ok(ChannelEvent::Disconnected { reason }) => {
                    status = format!("disconnected: {}", reason);
                    render(&term, &view, &user.username, &status);
                }
                Ok(ChannelEvent::ConnectError { message }) => {
                    status = format!("offline: {}", message);
                    render(&term, &view, &user.username, &status);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "board view fell behind realtime events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
    Ok(())
}

fn render(term: &Term, view: &BoardView, username: &str, status: &str) {
    if term.is_term() {
        let _ = term.clear_screen();
    }
    print_board(&view.board);
    println!();
    println!(
        "{}",
        style(format!("{} · {} · Ctrl-C to quit", username, status)).dim()
    );
}
