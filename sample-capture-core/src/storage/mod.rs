pub mod naming;
pub mod sidecar;
pub mod sink_writer;
