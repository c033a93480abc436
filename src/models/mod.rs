pub mod outcome;
pub mod report;
pub mod site;

// Re-exports for convenience
pub use outcome::*;
pub use report::*;
pub use site::*;
