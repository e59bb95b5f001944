pub mod archive;
pub mod cli;
pub mod compression;
pub mod config;
pub mod create;
pub mod crypto;
pub mod entry;
pub mod error;
pub mod extract;
pub mod flow;
pub mod format;
pub mod keygen;
pub mod keys;
pub mod open;
pub mod seal;
pub mod unpack;
pub mod utils;
