// SPDX-License-Identifier: MIT
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]

//! Host-side protocol core for the TCG Storage Security Subsystem
//! Classes (Opal 2.0, Enterprise, Pyrite).
//!
//! The stack, leaves first:
//!
//! - [`uid`] — 8-byte identifiers and the well-known UID tables.
//! - [`token`] — the TCG atom codec (encode, decode, cursor reader).
//! - [`packet`] — ComPacket / Packet / SubPacket framing.
//! - [`discovery`] — the Level 0 Discovery parser and SSC election.
//! - [`method`] — method-call composition and response parsing.
//! - [`transport`] — the IF-SEND / IF-RECV abstraction backends
//!   implement.
//! - [`session`] — the session state machine with polling receive.
//! - [`session_manager`] — Properties exchange and session opening.
//! - [`debug`] — the process-wide fault-injection and trace context
//!   observing every layer.
//!
//! Nothing here opens device nodes or dispatches ioctls; transports are
//! external collaborators behind [`transport::Transport`]. The core is
//! stateless across process runs — all durable state lives on the drive.

pub mod debug;
pub mod discovery;
pub mod error;
pub mod method;
pub mod packet;
pub mod session;
pub mod session_manager;
pub mod token;
pub mod transport;
pub mod uid;

pub use error::{Result, SedError};
pub use uid::Uid;
