#![allow(clippy::new_without_default)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate anyhow;

pub mod export_data;
pub mod gps_processor;
pub mod import_data;
pub mod logs;
pub mod registry;
pub mod utils;
