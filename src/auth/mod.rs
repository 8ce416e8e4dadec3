mod csrf;
mod middleware;
mod rate_limit;
mod token;

pub use csrf::{CSRF_HEADER, CSRF_META_KEY, generate_csrf_key, issue_csrf_token, verify_csrf_token};
pub use middleware::{
    AuthError, CsrfAdmin, CsrfAuth, CsrfStudent, RequireAdmin, RequireAuth, RequireStudent,
    Session,
};
pub use rate_limit::{RateLimitPolicy, RateLimiter, rate_limit};
pub use token::{TokenGenerator, parse_token};
