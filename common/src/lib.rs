pub mod cancel;
pub mod text;

pub use cancel::*;
pub use text::*;
