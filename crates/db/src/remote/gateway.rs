use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde_json::Value;
use url::Url;

use super::{RemoteClient, error_message};
use crate::gateway::{Filter, Gateway, GatewayError, Table};

const RETURN_REPRESENTATION: (&str, &str) = ("Prefer", "return=representation");

/// `Gateway` over the service's REST table API.
#[derive(Debug, Clone)]
pub struct RestGateway {
    client: Arc<RemoteClient>,
}

impl RestGateway {
    pub fn new(client: Arc<RemoteClient>) -> Self {
        Self { client }
    }

    fn table_url(&self, table: Table) -> Result<Url, GatewayError> {
        Ok(self.client.endpoint(&format!("rest/v1/{table}"))?)
    }

    fn row_url(&self, table: Table, id: &str) -> Result<Url, GatewayError> {
        let mut url = self.table_url(table)?;
        url.query_pairs_mut().append_pair("id", &format!("eq.{id}"));
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<String, GatewayError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        Ok(body)
    }

    async fn send_rows(&self, request: RequestBuilder) -> Result<Vec<Value>, GatewayError> {
        let body = self.send(request).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl Gateway for RestGateway {
    async fn select(
        &self,
        table: Table,
        filter: Option<&Filter>,
    ) -> Result<Vec<Value>, GatewayError> {
        let mut url = self.table_url(table)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("select", "*")
                .append_pair("order", "created_at.asc");
            if let Some(filter) = filter {
                query.append_pair(filter.column, &format!("eq.{}", filter.value));
            }
        }
        tracing::debug!(%table, "selecting rows");
        self.send_rows(self.client.request(Method::GET, url)).await
    }

    async fn insert(&self, table: Table, row: Value) -> Result<Value, GatewayError> {
        let url = self.table_url(table)?;
        let (header, value) = RETURN_REPRESENTATION;
        let request = self
            .client
            .request(Method::POST, url)
            .header(header, value)
            .json(&row);
        tracing::debug!(%table, "inserting row");
        self.send_rows(request)
            .await?
            .into_iter()
            .next()
            .ok_or(GatewayError::EmptyResult(table))
    }

    async fn update(&self, table: Table, id: &str, fields: Value) -> Result<(), GatewayError> {
        let url = self.row_url(table, id)?;
        let (header, value) = RETURN_REPRESENTATION;
        let request = self
            .client
            .request(Method::PATCH, url)
            .header(header, value)
            .json(&fields);
        tracing::debug!(%table, id, "updating row");
        let rows = self.send_rows(request).await?;
        if rows.is_empty() {
            return Err(GatewayError::NotFound {
                table,
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete(&self, table: Table, id: &str) -> Result<(), GatewayError> {
        let url = self.row_url(table, id)?;
        tracing::debug!(%table, id, "deleting row");
        self.send(self.client.request(Method::DELETE, url)).await?;
        Ok(())
    }
}
