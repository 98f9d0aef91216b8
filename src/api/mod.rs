//! API module
//!
//! Contains HTTP request handlers for the record store endpoints

pub mod records;
