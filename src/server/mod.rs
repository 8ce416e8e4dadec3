mod admin;
pub mod dto;
pub mod response;
mod router;
pub mod sanitize;
mod session;
mod student;
pub mod validation;

pub use admin::admin_router;
pub use router::{AppState, create_router};
pub use session::session_router;
pub use student::student_router;
