pub mod controller;
pub mod orchestrator;
