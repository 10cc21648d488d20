mod dispatcher;

pub use dispatcher::{NotificationDispatcher, RetryPolicy};
