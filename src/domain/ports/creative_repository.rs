//! Port for the externally-owned creative catalog plus the generation
//! request hand-off back to the pipeline.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Creative, GenerationRequest};

#[async_trait]
pub trait CreativeRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> DomainResult<Option<Creative>>;

    /// All distinct brands with at least one creative.
    async fn list_brands(&self) -> DomainResult<Vec<Uuid>>;

    async fn list_by_brand(&self, brand_id: Uuid) -> DomainResult<Vec<Creative>>;

    /// Hand a new generation request to the external pipeline. The request
    /// id becomes the child creative's id once generated.
    async fn submit_generation_request(&self, request: &GenerationRequest) -> DomainResult<()>;
}
