// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules. Each takes a `&Database` and runs on the writer thread.

pub mod events;
pub mod queue;
pub mod tasks;
pub mod threads;
