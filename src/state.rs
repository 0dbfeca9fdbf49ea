//! Shared state handed to every handler.

use crate::services::{
    ingest::IngestService, metadata_store::MetadataStore, remote::Messenger,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: MetadataStore,
    pub ingest: IngestService,
    pub messenger: Arc<dyn Messenger>,
}
