pub mod cache;
pub mod codegen;
pub mod config;
pub mod driver;
pub mod error;
pub mod parser;
pub mod scanner;
pub mod session;
pub mod analyzer {
    pub mod extract;
    pub mod metadata;
}

// Re-export selected API for consumers
pub use analyzer::extract::{extract_entities, EntityExtractor};
pub use analyzer::metadata::{FileEntities, Registration};
pub use config::GeneratorConfig;
pub use driver::{Driver, GenerationOutcome, GenerationReport};
pub use error::{DriverError, DriverResult};
pub use parser::{traverse, SourceParser, SyntaxNode, TreeSitterParser};
