// Copyright 2026 Fuzzscout Contributors
// SPDX-License-Identifier: Apache-2.0

//! Fuzzscout runtime library: browser-driven input discovery, the staged
//! payload pipeline and the gated execution harness.
//!
//! This library crate exposes the core modules for integration testing.

#![allow(clippy::new_without_default)]

pub mod cli;
pub mod client;
pub mod config;
pub mod discovery;
pub mod harness;
pub mod ledger;
pub mod navigator;
pub mod pipeline;
pub mod renderer;
pub mod rest;
pub mod signals;
