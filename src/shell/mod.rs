//! The USB shell protocol engine.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     Shell stack                          │
//! │                                                          │
//! │  ┌─────────┐   ┌───────────────────┐   ┌─────────────┐  │
//! │  │ UsbCmd  │──▶│ SequenceTransfer  │──▶│ dispatcher  │  │
//! │  │ (trait) │   │ (seq envelope)    │   │ → caps      │  │
//! │  └─────────┘   └───────────────────┘   └─────────────┘  │
//! │       ▲                  ▲                    │          │
//! │       │                  │                    ▼          │
//! │       │           ┌────────────────────────────────┐     │
//! │       └───────────│ streaming sub-protocols        │     │
//! │                   │ (pipe / fd / buffer transfers) │     │
//! │                   └────────────────────────────────┘     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The host is the master: every exchange starts with a host frame, and
//! at most one command (and within it one stream) is in flight at a time.

pub mod dispatch;
pub mod stream;
pub mod transfer;
pub mod wire;

pub use dispatch::run_command_loop;
pub use transfer::{SequenceTransfer, UsbCmd, USB_FEATURE_SHELL};
