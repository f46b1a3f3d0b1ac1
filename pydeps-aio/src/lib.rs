// pydeps-aio/src/lib.rs
//! Blocking-safe IO for pydeps: archive metadata, subprocesses and JSON output.

pub mod extract;
pub mod json_io;
pub mod process;

pub use extract::{
    read_sdist_manifest, read_sdist_manifest_async, read_wheel_metadata,
    read_wheel_metadata_async, SdistManifest,
};
pub use json_io::{read_json_async, write_json_async, write_json_stdout};
pub use process::run_command_async;
