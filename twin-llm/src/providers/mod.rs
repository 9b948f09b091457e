pub mod http;
pub mod trait_impl;

pub use http::HttpReplyProvider;
pub use trait_impl::ReplyProvider;
