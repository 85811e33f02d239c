use anyhow::Result;
use clap::ValueEnum;
use futures_util::future::BoxFuture;
use reqwest::Response;
use serde::{Deserialize, Serialize};
use urlencoding::encode;

use crate::http::{body_stream, ApiClient, ByteStream};

pub const STREAM_PATH: &str = "/products/devices/stream/";
pub const TOTAL_COUNT_HEADER: &str = "X-Total-Count";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub sku: String,
    #[serde(default)]
    pub description: String,
    pub active: bool,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ActiveFilter {
    #[default]
    All,
    #[value(name = "true")]
    Active,
    #[value(name = "false")]
    Inactive,
}

impl ActiveFilter {
    /// Query value, or `None` when the parameter is omitted.
    pub fn as_param(self) -> Option<&'static str> {
        match self {
            ActiveFilter::All => None,
            ActiveFilter::Active => Some("true"),
            ActiveFilter::Inactive => Some("false"),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ActiveFilter::All => "All",
            ActiveFilter::Active => "Active",
            ActiveFilter::Inactive => "Inactive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub page: u32,
    pub limit: u32,
    pub sku: Option<String>,
    pub active: ActiveFilter,
}

impl PageQuery {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.max(1),
            sku: None,
            active: ActiveFilter::All,
        }
    }

    pub fn with_sku(mut self, sku: Option<String>) -> Self {
        self.sku = sku
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self
    }

    pub fn with_active(mut self, active: ActiveFilter) -> Self {
        self.active = active;
        self
    }

    pub fn with_page(&self, page: u32) -> Self {
        Self {
            page: page.max(1),
            ..self.clone()
        }
    }

    /// A new page size or filter starts from the first page again.
    pub fn with_limit(&self, limit: u32) -> Self {
        Self {
            page: 1,
            limit: limit.max(1),
            ..self.clone()
        }
    }

    pub fn with_filters(&self, sku: Option<String>, active: ActiveFilter) -> Self {
        Self {
            page: 1,
            ..self.clone()
        }
        .with_sku(sku)
        .with_active(active)
    }

    pub fn path(&self) -> String {
        let mut params = vec![
            format!("page={}", self.page),
            format!("limit={}", self.limit),
        ];
        if let Some(sku) = &self.sku {
            params.push(format!("sku={}", encode(sku)));
        }
        if let Some(active) = self.active.as_param() {
            params.push(format!("active={active}"));
        }
        format!("{STREAM_PATH}?{}", params.join("&"))
    }
}

/// An opened page: the count header plus the still-unread body.
pub struct PageResponse {
    pub total: Option<u64>,
    pub body: ByteStream,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusChange {
    pub id: i64,
    pub active: bool,
}

pub fn status_path(id: i64) -> String {
    format!("/products/device/{id}/update-status/")
}

pub fn total_count(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(TOTAL_COUNT_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// Where pages and status changes come from.
pub trait ProductSource: Send + Sync {
    fn open_page(&self, query: &PageQuery) -> BoxFuture<'static, Result<PageResponse>>;

    fn update_status(&self, id: i64, active: bool) -> BoxFuture<'static, Result<StatusChange>>;
}

impl ProductSource for ApiClient {
    fn open_page(&self, query: &PageQuery) -> BoxFuture<'static, Result<PageResponse>> {
        let client = self.clone();
        let path = query.path();
        Box::pin(async move {
            let response = client
                .get_stream(&path, "application/x-ndjson, application/json")
                .await?;
            let total = total_count(&response);
            Ok(PageResponse {
                total,
                body: body_stream(response),
            })
        })
    }

    fn update_status(&self, id: i64, active: bool) -> BoxFuture<'static, Result<StatusChange>> {
        let client = self.clone();
        Box::pin(async move {
            client
                .post(&status_path(id), &serde_json::json!({ "active": active }))
                .await
        })
    }
}
