// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Streaming module - MQTT transport and command dispatch

mod dispatcher;
mod mqtt;

pub use dispatcher::*;
pub use mqtt::*;
