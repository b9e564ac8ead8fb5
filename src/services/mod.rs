//! External collaborators consumed by analysis units.
//!
//! Each collaborator is a narrow async trait with one production
//! implementation. Everything except the fetcher is optional.

pub mod cache;
pub mod fetcher;
pub mod html;
pub mod llm;
pub mod places;
pub mod search;

pub use cache::SnapshotCache;
pub use fetcher::{Fetcher, FetcherConfig, HttpFetcher};
pub use llm::{CompletionOptions, InferenceClient, OllamaClient, OllamaConfig};
pub use places::{GooglePlacesClient, Place, PlacesClient};
pub use search::{SearchClient, SearchResults, SerpApiClient};
