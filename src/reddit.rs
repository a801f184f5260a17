// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2025 Keith Harrigian <kharrigian@jhu.edu>

//! Reddit clients and services for retrieving Reddit data over HTTP.

pub mod client;
pub mod pushshift;
pub mod service;
pub mod thing;

pub use client::{Options, Query, Reddit};
