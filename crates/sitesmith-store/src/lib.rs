pub mod metadata;
pub mod registry;
pub mod request;
pub mod store;
pub mod tool;

pub use metadata::SiteMetadata;
pub use registry::ToolRegistry;
pub use request::{FileOperation, FileRequest};
pub use store::{FileOutcome, SiteStore, INDEX_FILE};
pub use tool::ManageSiteFilesTool;
