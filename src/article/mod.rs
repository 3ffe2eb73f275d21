//! Article production: the generation context, the conversation that turns
//! it into a document plus structured record, and on-disk persistence.

pub mod context;
pub mod schema;
pub mod session;
pub mod split;
pub mod store;

pub use context::{CompetitorSummary, GenerationContext, RelatedArticle};
pub use schema::StructuredRecord;
pub use session::{ArticleSession, ConversationState, Draft, RepairOutcome};
pub use store::ArticleStore;
