//! Typed wrappers for the tracker REST endpoints.
//!
//! Each submodule adds an `impl ApiClient` block for one resource:
//!
//! | Module        | Endpoints                                                |
//! |---------------|----------------------------------------------------------|
//! | `auth`        | `/api/login`, `/api/register`, password reset            |
//! | `profile`     | `/api/profile`                                           |
//! | `projects`    | `/api/projects`, settings, boards                        |
//! | `invitations` | `/api/invitations`                                       |
//! | `tickets`     | `/api/tickets`, comments, history                        |

mod auth;
mod invitations;
mod profile;
mod projects;
mod tickets;

pub use invitations::InviteResponse;
