pub mod deferred;
pub mod request_node;
