mod qurl_error;

pub use qurl_error::{QurlError, QurlErrorKind};
