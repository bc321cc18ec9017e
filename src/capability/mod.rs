// SPDX-License-Identifier: MIT

//! External collaborator contracts: stores, language model invoker, tool
//! services, plus the thin implementations the binary wires together.

pub mod chat;
pub mod fixture;
pub mod invoker;
pub mod store;
pub mod tools;
