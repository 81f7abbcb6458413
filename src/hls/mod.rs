pub mod classify;
pub mod proxy_url;
pub mod rewriter;
