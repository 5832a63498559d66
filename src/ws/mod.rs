pub mod collab;
pub mod handler;
pub mod lease;
pub mod room;
pub mod session;
pub mod userctx;
