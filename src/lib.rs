// SPDX-License-Identifier: MIT

//! queryflow turns a natural-language request into a validated, executed
//! data-retrieval plan and renders a natural-language answer.
//!
//! The core is a workflow state machine: a closed set of steps, a pure
//! router mapping post-step state to the next step, and an engine that
//! drives the loop under a shared attempt ceiling. External collaborators
//! (language model, query executor, schema provider, tool registry) are
//! trait objects in [`capability`].

pub mod capability;
pub mod workflow;
