// src/lib.rs — Library root for genbot

pub mod backend;
pub mod cli;
pub mod dispatch;
pub mod infra;
pub mod security;
pub mod session;
pub mod stats;
pub mod transport;
