//! Configuration module

mod site;

pub use site::ApiConfig;
pub use site::CacheConfig;
pub use site::HighlightConfig;
pub use site::MarkdownConfig;
pub use site::NewsletterConfig;
pub use site::PaginationConfig;
pub use site::RevalidationConfig;
pub use site::ServerConfig;
pub use site::SiteConfig;
pub use site::SubscriptionConfig;
