pub mod bearer;
pub mod extractors;
pub mod rate_limit;

pub use bearer::BearerAuth;
pub use extractors::SanitizedJson;
pub use rate_limit::{RateLimit, RateLimiter};

use actix_web::middleware::DefaultHeaders;

/// Response headers added to every response.
pub fn security_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("X-Frame-Options", "DENY"))
        .add(("Referrer-Policy", "no-referrer"))
        .add(("Content-Security-Policy", "default-src 'none'; frame-ancestors 'none'"))
        .add(("Cross-Origin-Resource-Policy", "same-origin"))
        .add(("Strict-Transport-Security", "max-age=15552000; includeSubDomains"))
}
