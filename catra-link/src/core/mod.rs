//! Core types shared by the protocol, store, and link layers

pub mod types;
