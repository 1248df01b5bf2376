pub mod http;

pub use self::http::HttpEntitlementService;
