// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

pub mod api;
pub mod carriers;
pub mod config;
mod database;
pub mod error;
pub mod http;
pub mod mail;
pub mod model;
mod prometheus;
pub mod security;
pub mod server;
mod settings;
mod storage;
pub mod stripe;
mod utils;
pub use clap;

pub use api::CargoveraApi;
pub use http::app;
pub use server::{shutdown_signal, CargoveraServer};
pub use settings::CargoveraSettings;
