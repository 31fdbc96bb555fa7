//! Authentication and profile commands: `trellis login`, `register`,
//! `logout`, `whoami`, `profile` and `reset-password`.

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Input, Password};

use trellis::Trellis;
use trellis::display::print_user;
use trellis::models::UserUpdate;

use super::{require_login, user_error};
use crate::{ProfileCommands, ResetCommands};

fn prompt(label: &str, value: Option<String>) -> Result<String> {
    match value {
        Some(v) => Ok(v),
        None => Input::new()
            .with_prompt(label)
            .interact_text()
            .with_context(|| format!("Failed to read {}", label.to_lowercase())),
    }
}

fn prompt_password(value: Option<String>, confirm: bool) -> Result<String> {
    if let Some(v) = value {
        return Ok(v);
    }
    let mut password = Password::new().with_prompt("Password");
    if confirm {
        password = password.with_confirmation("Confirm password", "Passwords do not match");
    }
    password.interact().context("Failed to read password")
}

pub async fn cmd_login(app: &Trellis, email: Option<String>, password: Option<String>) -> Result<()> {
    let email = prompt("Email", email)?;
    let password = prompt_password(password, false)?;

    let user = app
        .session()
        .login(&email, &password)
        .await
        .map_err(user_error)?;
    println!("Logged in as {}", style(&user.username).bold());
    Ok(())
}

pub async fn cmd_register(
    app: &Trellis,
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let username = prompt("Username", username)?;
    let email = prompt("Email", email)?;
    let password = prompt_password(password, true)?;

    let user = app
        .session()
        .register(&username, &email, &password)
        .await
        .map_err(user_error)?;
    println!("Registered and logged in as {}", style(&user.username).bold());
    Ok(())
}

pub fn cmd_logout(app: &Trellis) -> Result<()> {
    app.session().logout();
    println!("Logged out");
    Ok(())
}

pub async fn cmd_whoami(app: &Trellis) -> Result<()> {
    let user = require_login(app).await?;
    print_user(&user);
    Ok(())
}

pub async fn cmd_profile(app: &Trellis, command: Option<ProfileCommands>) -> Result<()> {
    require_login(app).await?;

    match command.unwrap_or(ProfileCommands::Show) {
        ProfileCommands::Show => {
            let user = app.session().refresh_profile().await.map_err(user_error)?;
            print_user(&user);
        }
        ProfileCommands::Update { username, email } => {
            if username.is_none() && email.is_none() {
                anyhow::bail!("Nothing to update. Pass --username and/or --email.");
            }
            let update = UserUpdate {
                username,
                email,
                ..UserUpdate::default()
            };
            let user = app
                .session()
                .update_profile(&update)
                .await
                .map_err(user_error)?;
            println!("{}", style("Profile updated").green());
            print_user(&user);
        }
    }
    Ok(())
}

pub async fn cmd_reset_password(app: &Trellis, command: ResetCommands) -> Result<()> {
    match command {
        ResetCommands::Request { email } => {
            let response = app
                .api()
                .request_password_reset(&email)
                .await
                .map_err(user_error)?;
            println!("Reset token: {}", style(&response.reset_token).bold());
            println!(
                "Run 'trellis reset-password confirm {}' to choose a new password.",
                response.reset_token
            );
        }
        ResetCommands::Confirm { token, password } => {
            let password = prompt_password(password, true)?;
            let response = app
                .api()
                .reset_password(&token, &password)
                .await
                .map_err(user_error)?;
            println!("{}", response.message);
        }
    }
    Ok(())
}
