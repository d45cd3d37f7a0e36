#![allow(unused_assignments)] // thiserror/miette proc macros trigger false positives

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod reporter;
pub mod workflow;
