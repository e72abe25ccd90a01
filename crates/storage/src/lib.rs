#![forbid(unsafe_code)]

pub mod json_bank;
pub mod repository;
pub mod sqlite;
