//! Types shared between the chat client core and its consumers: domain
//! identifiers, wire/REST payloads, and the REST error body.

pub mod domain;
pub mod error;
pub mod protocol;
