//! Read and write tasks of a WebSocket connection.

mod read;
mod write;

pub(crate) use read::read_pump;
pub(crate) use write::write_pump;
