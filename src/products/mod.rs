use anyhow::Result;
use clap::{ArgAction, Args, Subcommand};

use crate::{args::BaseArgs, config, http::ApiClient};

mod api;
mod browse;
mod feed;
mod list;
mod ndjson;
mod page;
mod status;

use api::{ActiveFilter, PageQuery};

#[derive(Debug, Clone, Args)]
pub struct ProductsArgs {
    #[command(subcommand)]
    command: Option<ProductsCommands>,
}

#[derive(Debug, Clone, Subcommand)]
enum ProductsCommands {
    /// Stream one page of products
    List(QueryArgs),
    /// Page through products interactively
    Browse(QueryArgs),
    /// Activate or deactivate one product
    SetActive(SetActiveArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct QueryArgs {
    /// Page number, starting at 1
    #[arg(long, default_value_t = 1)]
    page: u32,

    /// Products per page (defaults to `page_size` from config, then 10)
    #[arg(long)]
    limit: Option<u32>,

    /// Only products whose SKU matches
    #[arg(long)]
    sku: Option<String>,

    /// Filter by active flag
    #[arg(long, value_enum, default_value_t = ActiveFilter::All)]
    active: ActiveFilter,
}

impl QueryArgs {
    fn query(&self, default_limit: u32) -> PageQuery {
        PageQuery::new(self.page, self.limit.unwrap_or(default_limit))
            .with_sku(self.sku.clone())
            .with_active(self.active)
    }
}

#[derive(Debug, Clone, Args)]
pub struct SetActiveArgs {
    /// Product id
    #[arg(value_name = "ID")]
    id: i64,

    /// New state of the active flag
    #[arg(value_name = "true|false", action = ArgAction::Set)]
    active: bool,
}

pub async fn run(base: BaseArgs, args: ProductsArgs) -> Result<()> {
    let settings = config::resolve(&base, &config::load_global());
    let client = ApiClient::new(&settings.api_url)?;

    match args.command {
        None => list::run(client, QueryArgs::default().query(settings.page_size), base.json).await,
        Some(ProductsCommands::List(q)) => {
            list::run(client, q.query(settings.page_size), base.json).await
        }
        Some(ProductsCommands::Browse(q)) => {
            browse::run(client, q.query(settings.page_size)).await
        }
        Some(ProductsCommands::SetActive(s)) => {
            status::run(&client, s.id, s.active, base.json).await
        }
    }
}
