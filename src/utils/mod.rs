pub mod merge;
pub mod paths;
pub mod redact;
pub mod request_url;
