pub mod body;
pub mod caller;

pub use body::OptionalJson;
pub use caller::CallerContext;
