mod url;

pub use url::{
    BatchRequestItem, BatchResponseItem, ShortenRequest, ShortenResponse, StatsResponse, UserUrl,
};
