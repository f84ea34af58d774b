//! Record store capability

use crate::error::Result;
use crate::request::{DeleteRequest, QueryRequest, QueryResponse, StoreRequest, StoreResponse};
use async_trait::async_trait;

/// The remote record store the grid talks to.
///
/// Permission checks are the store's concern; callers pass any scoping
/// predicates as ordinary filters.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Run a query and return its rows plus the unlimited match count
    async fn query(&self, request: QueryRequest) -> Result<QueryResponse>;

    /// Create or replace a record, returning it as stored
    async fn store(&self, request: StoreRequest) -> Result<StoreResponse>;

    /// Delete a record by id
    async fn delete(&self, request: DeleteRequest) -> Result<()>;
}
