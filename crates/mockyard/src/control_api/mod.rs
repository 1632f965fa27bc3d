//! Control API: drives the engine over HTTP.
//!
//! - `POST /commands` executes one engine command and returns its reply
//! - `GET /init` returns the state snapshot a newly attached client needs
//! - `GET /servers` lists server states of the active project
//! - `GET|DELETE /projects/:name/logs` reads or clears a project's log buffer
//! - `GET /health` and `GET /metrics`
//!
//! The API listens on a configurable port (default: 4040).

mod handlers;
mod router;
mod server;
mod types;

pub use server::ControlApiServer;
