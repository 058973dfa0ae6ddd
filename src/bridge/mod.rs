// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Session/Token Bridge
//!
//! Drives the client app page from "who is signed in" to "what does the
//! protected resource say about them".
//!
//! ```text
//! Idle → CheckingSession → Authenticated | Unauthenticated
//! Authenticated → FetchingToken → TokenReady | TokenError
//! TokenReady → FetchingUserInfo → UserInfoReady | UserInfoError
//! ```
//!
//! [`machine::transition`] is pure: it returns the next state and a list of
//! [`Effect`]s. [`BridgeRunner`] owns a FIFO event queue, executes effects
//! through a [`BridgeTransport`], and feeds their results back as events.
//! Events are processed one at a time, so the resource is never called
//! before a JWT fetch has succeeded. Failures land in an error state and are
//! not retried.

pub mod machine;
pub mod runner;

pub use machine::{transition, Bridge, BridgeState, Effect, Event, SessionInfo};
pub use runner::{BridgeError, BridgeRunner, BridgeTransport, PageEffects};
