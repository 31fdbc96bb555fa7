//! Project commands: `trellis projects`, `boards`, `invite` and `accept`.

use anyhow::Result;
use console::style;

use trellis::Trellis;
use trellis::display::{print_board, print_project, print_projects};
use trellis::models::{NewProject, ProjectUpdate};

use super::{require_login, user_error};
use crate::ProjectCommands;

pub async fn cmd_projects(app: &Trellis, command: Option<ProjectCommands>) -> Result<()> {
    require_login(app).await?;
    let api = app.api();

    match command.unwrap_or(ProjectCommands::List) {
        ProjectCommands::List => {
            let projects = api.list_projects().await.map_err(user_error)?;
            print_projects(&projects);
        }
        ProjectCommands::Show { id } => {
            let project = api.get_project(id).await.map_err(user_error)?;
            print_project(&project);
        }
        ProjectCommands::Create { name, description } => {
            let project = api
                .create_project(&NewProject { name, description })
                .await
                .map_err(user_error)?;
            println!("{} project #{}", style("Created").green(), project.id);
            print_project(&project);
        }
        ProjectCommands::Settings { id } => {
            let project = api.project_settings(id).await.map_err(user_error)?;
            print_project(&project);
        }
        ProjectCommands::Update {
            id,
            name,
            description,
        } => {
            if name.is_none() && description.is_none() {
                anyhow::bail!("Nothing to update. Pass --name and/or --description.");
            }
            let project = api
                .update_project_settings(id, &ProjectUpdate { name, description })
                .await
                .map_err(user_error)?;
            println!("{}", style("Project settings updated").green());
            print_project(&project);
        }
    }
    Ok(())
}

pub async fn cmd_boards(app: &Trellis, project: i64) -> Result<()> {
    require_login(app).await?;
    let boards = app.api().list_boards(project).await.map_err(user_error)?;
    if boards.is_empty() {
        println!("{}", style("No boards").dim());
    }
    for (i, board) in boards.iter().enumerate() {
        if i > 0 {
            println!();
        }
        print_board(board);
    }
    Ok(())
}

pub async fn cmd_invite(app: &Trellis, project: i64, email: &str) -> Result<()> {
    require_login(app).await?;
    let response = app
        .api()
        .invite_member(email, project)
        .await
        .map_err(user_error)?;
    println!("{}", response.message);
    Ok(())
}

pub async fn cmd_accept(app: &Trellis, token: &str) -> Result<()> {
    require_login(app).await?;
    let response = app
        .api()
        .accept_invitation(token)
        .await
        .map_err(user_error)?;
    println!("{}", response.message);
    Ok(())
}
