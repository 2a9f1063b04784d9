//! rxmeta Common Library
//!
//! Shared functionality used across the rxmeta workspace members:
//!
//! - **Types**: RxNorm/NDC identifier types and terminology enums
//! - **Logging**: tracing subscriber setup shared by the CLI and tests
//! - **Error Handling**: common error type for shared utilities

pub mod error;
pub mod logging;
pub mod types;

pub use error::{CommonError, Result};
pub use types::{ConceptStatus, Ndc, RxCui, Tty};
