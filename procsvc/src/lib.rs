//! procsvc – process lifecycle and service control for a command host
//! ====================================================================
//!
//! ## Process control
//! - **Tiered kill** – [`kill`] terminates the processes matching a pid or an
//!   executable name, optionally together with their direct children
//!   ([`AncestryLevel::Children`]) or their whole descendant tree
//!   ([`AncestryLevel::Descendants`]).
//! - **Suspended launch** – [`launch_suspended`] starts a command whose primary
//!   thread does not run until [`resume`] is called on the returned thread handle.
//! - **Wait / close** – [`wait`], [`wait_any`], [`close`] and [`close_all`]
//!   operate on the caller-owned [`HandleRef`]s produced by a launch.
//!
//! ## Service control
//! - **Serve** – [`serve`] registers the running program as an OS service on a
//!   dedicated dispatcher thread and forwards every control event to the
//!   thread that owns the command interpreter.
//! - **Acknowledged hand-off** – a control event is delivered as a
//!   [`ControlRequest`]; the service status changes only after the
//!   interpreter completed the request.
//! - **Registry** – [`ServiceRegistry`] creates and deletes service definitions.
//!
//! ## Command host
//! [`Interp`] exposes all of the above as string commands (`kill`, `wait`,
//! `serve`, …) and is what the `procsvc-cli` binary drives.
//!
//! ---
//!
//! ```rust,no_run
//! use procsvc::*;
//!
//! fn main() -> ProcsvcResult<()> {
//!     let launched = launch_suspended("sleep 5").map_err(ProcessError::from)?;
//!     resume(launched.thread).map_err(ProcessError::from)?;
//!     wait(launched.process).map_err(ProcessError::from)?;
//!     close_all(&[launched.process, launched.thread]);
//!
//!     let killed = kill(&Selector::parse("notepad.exe"), AncestryLevel::Descendants);
//!     println!("killed {killed} processes");
//!     Ok(())
//! }
//! ```
//!
//! ---
//!
//! ## How It Works
//!
//! ```text
//!  OS control thread                      interpreter thread
//!  ─────────────────                      ──────────────────
//!  ControlHandler::handle_control(code)
//!        │  ControlRequest ──── mark ───→  ControlRequest::complete(interp)
//!        │                                   └─ eval "<template> <code>"
//!        │  ←──────────── ack ─────────────┘
//!        └─ StatusReporter::report(Running | Paused | Stopped)
//! ```
//!
//! ---
//! ## Supported Platforms
//! | Platform | Handles          | Suspended launch       | Service manager          |
//! |----------|------------------|------------------------|--------------------------|
//! | Windows  | kernel `HANDLE`  | `CREATE_SUSPENDED`     | Service Control Manager  |
//! | Unix     | handle table     | `SIGSTOP` / `SIGCONT`  | `SIGINT`/`SIGTERM` → stop |

#[allow(unused_imports)]
use tracing::{Level, debug, error, info, span, trace, warn};

pub mod binding;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod process;
pub mod service;

pub use binding::*;
pub use config::ProcsvcConfig;
pub use error::{ProcsvcError, ProcsvcResult};
pub use logging::{LoggingConfig, LoggingConfigTrait};
pub use process::*;
pub use service::*;

/// Version string reported by the `version` command.
pub const PROCSVC_VERSION: &str = "1.1";
