pub mod diagnostics;
pub mod error;
pub mod form;
pub mod health;
pub mod messages;
pub mod response;

pub use diagnostics::*;
pub use error::*;
pub use form::*;
pub use health::*;
pub use messages::*;
pub use response::*;
