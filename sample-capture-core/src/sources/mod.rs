pub mod manual;

pub use manual::{ManualFeed, ManualSource};
