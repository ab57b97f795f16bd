//! Named-resource data client.
//!
//! Thin wrappers that turn CRUD, import, and export calls against named
//! resources into request descriptors and run them through the gated
//! request path, so every data operation transparently participates in
//! step-up interception.

use serde_json::{Value, json};

use crate::descriptor::RequestDescriptor;
use crate::errors::ClientError;
use crate::gated::GatedClient;

/// Pagination, sorting, and filtering for list/export calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    pub page: u32,
    pub per_page: u32,
    pub sort: Option<String>,
    pub descending: bool,
    pub search: Option<String>,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 25,
            sort: None,
            descending: false,
            search: None,
        }
    }
}

impl ListParams {
    fn query(&self) -> String {
        let mut pairs = vec![
            format!("page={}", self.page),
            format!("per_page={}", self.per_page),
        ];
        if let Some(sort) = &self.sort {
            pairs.push(format!("sort={sort}"));
            pairs.push(format!(
                "order={}",
                if self.descending { "desc" } else { "asc" }
            ));
        }
        if let Some(search) = &self.search {
            let encoded: String = url::form_urlencoded::byte_serialize(search.as_bytes()).collect();
            pairs.push(format!("q={encoded}"));
        }
        pairs.join("&")
    }
}

/// CRUD/import/export client over the gated request path.
#[derive(Debug, Clone)]
pub struct ResourceClient {
    client: GatedClient,
}

impl ResourceClient {
    #[must_use]
    pub fn new(client: GatedClient) -> Self {
        Self { client }
    }

    /// # Errors
    /// Propagates request errors; rejects resource names that are not
    /// lowercase URL-safe slugs.
    pub async fn list(&self, resource: &str, params: &ListParams) -> Result<Value, ClientError> {
        let base = resource_path(resource)?;
        let descriptor = RequestDescriptor::get(format!("{base}?{}", params.query()));
        self.client.execute(descriptor).await
    }

    /// # Errors
    /// Propagates request errors; rejects invalid resource names.
    pub async fn get_one(&self, resource: &str, id: &str) -> Result<Value, ClientError> {
        let base = resource_path(resource)?;
        self.client
            .execute(RequestDescriptor::get(format!("{base}/{id}")))
            .await
    }

    /// # Errors
    /// Propagates request errors; rejects invalid resource names.
    pub async fn create(&self, resource: &str, body: Value) -> Result<Value, ClientError> {
        let base = resource_path(resource)?;
        self.client
            .execute(RequestDescriptor::post(base, body))
            .await
    }

    /// # Errors
    /// Propagates request errors; rejects invalid resource names.
    pub async fn update(&self, resource: &str, id: &str, body: Value) -> Result<Value, ClientError> {
        let base = resource_path(resource)?;
        self.client
            .execute(RequestDescriptor::put(format!("{base}/{id}"), body))
            .await
    }

    /// # Errors
    /// Propagates request errors; rejects invalid resource names.
    pub async fn delete(&self, resource: &str, id: &str) -> Result<Value, ClientError> {
        let base = resource_path(resource)?;
        self.client
            .execute(RequestDescriptor::delete(format!("{base}/{id}")))
            .await
    }

    /// Export matching rows; the server streams back a JSON array.
    ///
    /// # Errors
    /// Propagates request errors; rejects invalid resource names.
    pub async fn export(&self, resource: &str, params: &ListParams) -> Result<Value, ClientError> {
        let base = resource_path(resource)?;
        let descriptor = RequestDescriptor::get(format!("{base}/export?{}", params.query()));
        self.client.execute(descriptor).await
    }

    /// Import rows in one batch.
    ///
    /// # Errors
    /// Propagates request errors; rejects invalid resource names.
    pub async fn import(&self, resource: &str, rows: Vec<Value>) -> Result<Value, ClientError> {
        let base = resource_path(resource)?;
        let descriptor = RequestDescriptor::post(format!("{base}/import"), json!({"rows": rows}));
        self.client.execute(descriptor).await
    }
}

/// Resource names are normalized slugs: lowercase `[a-z0-9-]`, non-empty.
fn resource_path(resource: &str) -> Result<String, ClientError> {
    if resource.is_empty()
        || !resource
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(ClientError::Config(format!(
            "invalid resource name: {resource}"
        )));
    }
    Ok(format!("/v1/{resource}"))
}
