// Chat gateway: rate limit → parse → validate → dispatch upstream → relay the stream.
// All upstream calls go through llm_client; nothing here knows the provider's wire format.

pub mod handlers;
pub mod models;
pub mod prompts;
pub mod rate_limit;
pub mod relay;
pub mod validation;
