//! # PagePilot Protocols
//!
//! Interface definitions shared between the automation engine and the
//! browser drivers. Contains only traits and plain data types - no
//! implementations.
//!
//! ## Core Traits
//!
//! - [`BrowserConnector`] - Connect to a remote browser by endpoint URL
//! - [`BrowserConnection`] - A live connection: contexts and pages
//! - [`BrowserPage`] - The page operations the engine needs
//!
//! ## Data Types
//!
//! - [`Selector`] / [`SelectorSet`] - Prioritized element queries
//! - [`ElementHandle`] / [`ElementState`] - Located elements and their visibility
//! - [`DownloadEvent`] - A browser-emitted download

pub mod error;
pub mod page;
pub mod selector;

pub use error::{is_disconnect_message, PageError, DISCONNECT_SIGNATURES};
pub use page::{
    BoundingBox, BrowserConnection, BrowserConnector, BrowserPage, DownloadEvent, ElementHandle,
    ElementState, DEFAULT_CONTEXT,
};
pub use selector::{Selector, SelectorSet};
