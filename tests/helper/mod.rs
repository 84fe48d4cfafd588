#![allow(dead_code)]

mod forge;
mod server;

pub use forge::*;
pub use server::*;
