// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

//! # Configuration.
//!
//! Settings are read from an optional file and from `CARGOVERA_*` environment variables.
//!

mod build;
mod params;

pub use build::{build_config, ENV_PREFIX};
pub use params::Params;
