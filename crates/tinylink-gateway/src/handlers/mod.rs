mod health;
mod stats;
mod url;

pub use health::ping_handler;
pub use stats::stats_handler;
pub use url::{
    create_batch_handler, create_json_handler, create_plain_handler, delete_urls_handler,
    list_urls_handler, redirect_handler,
};
