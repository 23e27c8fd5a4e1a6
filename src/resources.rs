//! Thin per-endpoint facades over the dispatcher.
//!
//! Each facade is an explicit accessor on [`Client`]; it builds the
//! versioned resource path, forwards free-form options to the dispatcher
//! and decodes the JSON:API envelope where the endpoint returns typed
//! resources.

use crate::{
    client::{Client, CONTENT_TYPE_JSON},
    jsonapi::{Document, Resource},
    options::Options,
    Result,
};
use serde_json::{json, Value};

/// Addons resource.
pub struct Addons<'a> {
    client: &'a Client,
}

impl<'a> Addons<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Gets an access token for an Addon installed in an Organization.
    ///
    /// This is not a JSON:API request; the body goes out as plain JSON
    /// and the whole envelope comes back.
    pub async fn access_token(
        &self,
        org_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Value> {
        let url = self.client.endpoint("addon-token");

        let mut data = Options::new();
        data.insert("client_id".into(), Value::from(client_id));
        data.insert("client_secret".into(), Value::from(client_secret));
        data.insert("organization_id".into(), Value::from(org_id));

        let mut options = Options::new();
        options.insert("headers".into(), json!({ "Content-Type": CONTENT_TYPE_JSON }));
        options.insert("full_response".into(), Value::from(true));

        self.client.post(&url, data, options).await
    }
}

/// Addon flow documents resource.
pub struct FlowDocuments<'a> {
    client: &'a Client,
}

impl<'a> FlowDocuments<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Gets supported documents for the given flow.
    pub async fn collection(&self, flow_id: &str, options: Options) -> Result<Value> {
        let url = self
            .client
            .endpoint(&format!("addons/slates/{flow_id}/documents"));
        self.client.get(&url, Options::new(), options).await
    }
}

/// Tags resource.
pub struct Tags<'a> {
    client: &'a Client,
}

impl<'a> Tags<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Gets tags for the given flow.
    pub async fn collection(&self, flow_id: &str, options: Options) -> Result<Vec<Resource>> {
        let url = self.client.endpoint(&format!("flows/{flow_id}/packets/tags"));

        let document = self
            .client
            .get_document(&url, Options::new(), options)
            .await?;
        document.collection_of("flow_tags")
    }

    /// Assigns tags to the given flow packet.
    pub async fn assign(
        &self,
        flow_id: &str,
        packet_id: &str,
        names: &[&str],
    ) -> Result<Vec<Resource>> {
        let url = self
            .client
            .endpoint(&format!("flows/{flow_id}/packets/{packet_id}/tags"));

        let mut data = Options::new();
        data.insert(
            "data".into(),
            json!({ "type": "flow_tags", "attributes": { "names": names } }),
        );

        let mut options = Options::new();
        options.insert("full_response".into(), Value::from(true));

        let envelope = self.client.post(&url, data, options).await?;
        Document::from_value(envelope)?.collection_of("flow_tags")
    }
}

/// Organizations resource.
pub struct Organizations<'a> {
    client: &'a Client,
}

impl<'a> Organizations<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Gets all Organizations the current user belongs to.
    pub async fn collection(&self, options: Options) -> Result<Vec<Resource>> {
        let url = self.client.endpoint("organizations");

        let document = self
            .client
            .get_document(&url, Options::new(), options)
            .await?;
        document.collection_of("organizations")
    }

    /// Retrieves the settings of an Organization.
    pub async fn settings(&self, org_id: &str, options: Options) -> Result<Value> {
        let url = self.client.endpoint(&format!("organizations/{org_id}/settings"));
        self.client.get(&url, Options::new(), options).await
    }
}
