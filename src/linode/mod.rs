//! Linode API seam used by the orchestrators.
//!
//! The orchestrators only see [`LinodeApi`]; [`HttpLinodeApi`] is the real
//! client and `test_support::ScriptedApi` stands in for it in tests.

mod client;
mod types;

use std::future::Future;
use std::pin::Pin;

use crate::failure::ApiFailure;

pub use client::{DEFAULT_API_BASE_URL, HttpLinodeApi};
pub use types::{
    CatalogueEntry, CatalogueKind, CreateInstanceRequest, Instance, Page, STATUS_RUNNING,
};

/// Future returned by provider operations.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiFailure>> + Send + 'a>>;

/// Provider operations required to create and destroy instances.
pub trait LinodeApi {
    /// Lists every instance on the account, following pagination.
    fn list_instances(&self) -> ApiFuture<'_, Vec<Instance>>;

    /// Submits a create request.
    fn create_instance<'a>(&'a self, request: &'a CreateInstanceRequest)
    -> ApiFuture<'a, Instance>;

    /// Fetches one instance by id.
    fn get_instance(&self, id: u64) -> ApiFuture<'_, Instance>;

    /// Deletes one instance by id.
    fn delete_instance(&self, id: u64) -> ApiFuture<'_, ()>;

    /// Lists a lookup catalogue.
    fn list_catalogue(&self, kind: CatalogueKind) -> ApiFuture<'_, Vec<CatalogueEntry>>;
}
