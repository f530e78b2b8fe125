pub mod network {
    pub const TIMEOUT_REQUEST_MS: u64 = 30_000;
    pub const MAX_REDIRECTS: usize = 21;
    pub const DEFAULT_PROXY_PROTOCOL: &str = "http";
}

pub mod http {
    /// Method value meaning "take the method from the caller".
    pub const METHOD_CALLER_CHOICE: &str = "use";
    pub const DEFAULT_METHOD: &str = "GET";
    pub const USER_AGENT: &str = concat!("qurl/", env!("CARGO_PKG_VERSION"));
    pub const ACCEPT: &str = "application/json, text/plain, */*";
}

pub mod message {
    pub const METHOD: &str = "method";
    pub const URL: &str = "url";
    pub const PARAMS: &str = "params";
    pub const HEADERS: &str = "headers";
    pub const DATA: &str = "data";
    pub const PAYLOAD: &str = "payload";
    pub const STATUS_CODE: &str = "statusCode";
    pub const RESPONSE_URL: &str = "responseUrl";
    pub const REDIRECT_LIST: &str = "redirectList";
}

pub mod env {
    pub const CONFIG_PATH: &str = "QURL_CONFIG_PATH";
    pub const CONFIG_DIR: &str = "QURL_CONFIG_DIR";
}
