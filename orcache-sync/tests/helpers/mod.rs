//! Shared integration test utilities

#![allow(dead_code)]

pub mod db_utils;
pub mod registry_stub;
