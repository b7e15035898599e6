//! Configuration, bootstrap, session bookkeeping and the repository service
//! that ties indexing and question answering together.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod service;
pub mod session;

pub use config::Config;
pub use error::{Result, ServiceError};
pub use service::{IndexingTask, RepoService, ServiceConfig};
pub use session::{Session, SessionProgress, SessionRegistry, SessionStatus};
