// SPDX-License-Identifier: MIT

pub mod config;
pub mod engine;
pub mod error;
pub mod router;
pub mod state;
pub mod step;
pub mod steps;
pub mod validator;
