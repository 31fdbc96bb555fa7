//! Ticket commands: `trellis tickets` and `trellis comment`.

use anyhow::Result;
use console::style;
use dialoguer::Confirm;

use trellis::Trellis;
use trellis::display::{comment_line, print_history, print_ticket, print_tickets};
use trellis::models::{NewTicket, TicketQuery, TicketUpdate};

use super::{require_login, user_error};
use crate::TicketCommands;

pub async fn cmd_tickets(app: &Trellis, command: TicketCommands) -> Result<()> {
    require_login(app).await?;
    let api = app.api();

    match command {
        TicketCommands::List {
            project,
            limit,
            sort,
            search,
            status,
            priority,
            owner,
        } => {
            let query = TicketQuery {
                project_id: project,
                limit,
                sort,
                search,
                status,
                priority,
                owner_id: owner,
            };
            let tickets = api.list_tickets(&query).await.map_err(user_error)?;
            print_tickets(&tickets);
        }
        TicketCommands::Recent => {
            let tickets = api
                .list_tickets(&TicketQuery::recent())
                .await
                .map_err(user_error)?;
            print_tickets(&tickets);
        }
        TicketCommands::Show { id } => {
            let ticket = api.get_ticket(id).await.map_err(user_error)?;
            print_ticket(&ticket);
        }
        TicketCommands::Create {
            title,
            description,
            column,
        } => {
            let ticket = api
                .create_ticket(&NewTicket {
                    title,
                    description,
                    column_id: column,
                })
                .await
                .map_err(user_error)?;
            println!("{} ticket #{}", style("Created").green(), ticket.id);
        }
        TicketCommands::Update {
            id,
            title,
            description,
            status,
            priority,
            owner,
            column,
        } => {
            let update = TicketUpdate {
                title,
                description,
                status,
                priority,
                owner_id: owner,
                column_id: column,
            };
            let ticket = api.update_ticket(id, &update).await.map_err(user_error)?;
            println!("{} ticket #{}", style("Updated").green(), ticket.id);
            print_ticket(&ticket);
        }
        TicketCommands::Delete { id, yes } => {
            if !yes {
                let confirmed = Confirm::new()
                    .with_prompt(format!("Delete ticket #{}?", id))
                    .default(false)
                    .interact()?;
                if !confirmed {
                    println!("Cancelled");
                    return Ok(());
                }
            }
            api.delete_ticket(id).await.map_err(user_error)?;
            println!("{} ticket #{}", style("Deleted").red(), id);
        }
        TicketCommands::History { id } => {
            let history = api.ticket_history(id).await.map_err(user_error)?;
            print_history(&history);
        }
    }
    Ok(())
}

pub async fn cmd_comment(app: &Trellis, ticket: i64, content: &str) -> Result<()> {
    require_login(app).await?;
    if content.trim().is_empty() {
        anyhow::bail!("Comment cannot be empty");
    }
    let comment = app
        .api()
        .add_comment(ticket, content)
        .await
        .map_err(user_error)?;
    println!("{}", comment_line(&comment));
    Ok(())
}
