//! Application state shared across handlers

use std::sync::Arc;

use crate::repositories::{SnippetModel, UserModel};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub snippets: Arc<dyn SnippetModel>,
    pub users: Arc<dyn UserModel>,
}

impl AppState {
    pub fn new(snippets: Arc<dyn SnippetModel>, users: Arc<dyn UserModel>) -> Self {
        Self { snippets, users }
    }
}
