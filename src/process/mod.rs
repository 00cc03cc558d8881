// src/process/mod.rs
pub mod date_parser;
pub mod feed;
