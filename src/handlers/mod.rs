pub mod health;
pub mod form_create;
pub mod form_get;
pub mod diagnostics;

pub use health::*;
pub use form_create::*;
pub use form_get::*;
pub use diagnostics::*;
