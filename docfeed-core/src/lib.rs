mod agent;
mod atom;
mod feed;

pub use agent::{Agent, AgentError, Body, ReqwestAgent, escape};
pub use atom::{Entry, EntryError, METADATA_CONTENT_TYPE, check_well_formed, metadata_document};
pub use feed::{DEFAULT_FEED_BASE, DEFAULT_ROOT_CREATE, FeedUris, ROOT_FOLDER_ID};
pub use reqwest::header;
