pub mod convert;
pub mod decode;
pub mod pipeline;
pub mod promote;
