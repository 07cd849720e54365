pub mod mrc_loader;

pub use mrc_loader::{decode_mrc, encode_mrc, read_mrc};
