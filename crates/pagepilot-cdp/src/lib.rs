//! Chrome DevTools Protocol driver for pagepilot.
//!
//! Attaches to a browser that is already running with remote debugging
//! enabled, so the user's logged-in sessions are reused as-is.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐    WebSocket     ┌──────────────────┐
//! │  pagepilot      │ ◄──────────────► │   Chrome/Edge    │
//! │  (this crate)   │       CDP        │  (user's browser)│
//! └─────────────────┘                  └──────────────────┘
//! ```
//!
//! ## Setup
//!
//! ```bash
//! google-chrome --remote-debugging-port=9222
//! ```
//!
//! [`CdpConnector`] implements the engine-facing
//! [`BrowserConnector`](pagepilot_protocols::BrowserConnector) trait; the
//! lower-level [`CdpClient`] and [`PageSession`] are exposed for direct use.

pub mod cdp;
mod driver;

pub use cdp::{CdpClient, CdpError, CdpEvent, PageSession};
pub use driver::{CdpConnection, CdpConnector, CdpPage};
