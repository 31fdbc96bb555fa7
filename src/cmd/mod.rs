//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module     | Commands handled                                              |
//! |------------|---------------------------------------------------------------|
//! | `auth`     | `Login`, `Register`, `Logout`, `Whoami`, `Profile`, `ResetPassword` |
//! | `projects` | `Projects`, `Boards`, `Invite`, `Accept`                      |
//! | `tickets`  | `Tickets`, `Comment`                                          |
//! | `watch`    | `Watch`                                                       |
//! | `config`   | `Config`                                                      |

pub mod auth;
pub mod config;
pub mod projects;
pub mod tickets;
pub mod watch;

pub use auth::{cmd_login, cmd_logout, cmd_profile, cmd_register, cmd_reset_password, cmd_whoami};
pub use config::cmd_config;
pub use projects::{cmd_accept, cmd_boards, cmd_invite, cmd_projects};
pub use tickets::{cmd_comment, cmd_tickets};
pub use watch::cmd_watch;

use anyhow::Result;
use trellis::Trellis;
use trellis::errors::ClientError;
use trellis::models::User;

/// Resolve the stored credential, failing when nobody is logged in.
pub async fn require_login(app: &Trellis) -> Result<User> {
    let state = app.session().bootstrap().await;
    match state.user() {
        Some(user) => Ok(user.clone()),
        None => anyhow::bail!("Not logged in. Run 'trellis login' first."),
    }
}

/// Turn a client error into the message a user should see.
///
/// Backend details pass through verbatim; a 401 additionally tells the user
/// their session is gone.
pub fn user_error(err: ClientError) -> anyhow::Error {
    match &err {
        ClientError::Unauthorized { detail } => {
            anyhow::anyhow!("{} (session expired, run 'trellis login')", detail)
        }
        _ => anyhow::anyhow!(err.user_message()),
    }
}
