// Findoc Infrastructure - HTTP Adapters
// Implements: DocumentFetcher (object store), StatusReporter (GraphQL record store)

pub mod object_store;
pub mod record_store;

pub use object_store::{ObjectStoreFetcher, ObjectStoreSettings};
pub use record_store::{GraphQlStatusReporter, RecordStoreSettings, UPDATE_CHAT_MUTATION};

/// Header carrying the admin credential, unless configured otherwise
pub const DEFAULT_SECRET_HEADER: &str = "x-hasura-admin-secret";
